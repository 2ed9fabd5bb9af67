use std::collections::HashSet;

use tracing::debug;

use super::heuristics::{is_scene_heading, looks_like_character_cue};
use crate::model::{Character, PageText, ParseResult, Scene};

/// Build the scene outline and the character list in one pass over the pages.
///
/// Pages and lines are visited in document order; scene numbering,
/// first appearances and end pages all depend on it.
pub fn index(pages: &[PageText]) -> ParseResult {
    let mut scenes: Vec<Scene> = Vec::new();
    let mut characters: Vec<Character> = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for page in pages {
        for line in page.text.lines() {
            if is_scene_heading(line) {
                scenes.push(Scene {
                    index: scenes.len() + 1,
                    heading: line.trim().to_string(),
                    start_page: page.page_index,
                    end_page: None,
                });
            } else if looks_like_character_cue(line) {
                let name = line.trim();
                if seen_names.insert(name.to_string()) {
                    characters.push(Character {
                        name: name.to_string(),
                        first_page: Some(page.page_index),
                    });
                }
            }
        }
    }

    fill_end_pages(&mut scenes);
    characters.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(
        pages = pages.len(),
        scenes = scenes.len(),
        characters = characters.len(),
        "indexed script"
    );

    ParseResult { scenes, characters }
}

/// Each scene ends the page before the next one starts, never before its own start.
/// The last scene stays open.
fn fill_end_pages(scenes: &mut [Scene]) {
    for i in 1..scenes.len() {
        let next_start = scenes[i].start_page;
        let prev = &mut scenes[i - 1];
        prev.end_page = Some(next_start.saturating_sub(1).max(prev.start_page));
    }
}
