/// Scene heading prefixes, checked against the uppercased line.
const HEADING_PREFIXES: &[&str] = &["INT/EXT.", "INT.-EXT.", "INT-EXT.", "I/E.", "INT.", "EXT."];

/// Transition markers that are never character names.
const TRANSITION_MARKERS: &[&str] = &["CUT TO", "FADE", "DISSOLVE"];

const MIN_HEADING_CHARS: usize = 5;
const MIN_CUE_CHARS: usize = 2;
const MAX_CUE_CHARS: usize = 30;

/// Scene headings in US screenplays start with INT./EXT./INT-EXT./I/E.
pub fn is_scene_heading(line: &str) -> bool {
    let s = line.trim();
    if s.chars().count() < MIN_HEADING_CHARS {
        return false;
    }
    let upper = s.to_uppercase();
    HEADING_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Character cues: already ALL CAPS, short, not a transition, not a heading.
pub fn looks_like_character_cue(line: &str) -> bool {
    let s = line.trim();
    let len = s.chars().count();
    if !(MIN_CUE_CHARS..=MAX_CUE_CHARS).contains(&len) {
        return false;
    }

    let upper = s.to_uppercase();
    if upper != s {
        return false;
    }

    if TRANSITION_MARKERS.iter().any(|m| upper.contains(m)) {
        return false;
    }

    if is_scene_heading(s) {
        return false;
    }

    upper != "CONTINUED"
}
