pub mod heuristics;
pub mod index;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::extract;
use crate::model::ParseResult;

/// Two-step pipeline: file → page text → scenes + characters.
pub fn parse_file(path: &Path, max_pages: usize) -> Result<ParseResult> {
    let pages = extract::text_by_page(path, max_pages)?;
    Ok(index::index(&pages))
}

/// Runs the pipeline off the async runtime. Each call is independent;
/// nothing is shared between parses.
#[derive(Debug, Clone, Copy)]
pub struct ScriptParser {
    max_pages: usize,
}

impl Default for ScriptParser {
    fn default() -> Self {
        ScriptParser::new(extract::DEFAULT_MAX_PAGES)
    }
}

impl ScriptParser {
    pub fn new(max_pages: usize) -> Self {
        ScriptParser { max_pages }
    }

    pub async fn parse(&self, path: impl Into<PathBuf>) -> Result<ParseResult> {
        let path = path.into();
        let max_pages = self.max_pages;
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || parse_file(&path, max_pages))
            .await
            .with_context(|| format!("Parse task for {} did not complete", display))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;

    #[tokio::test]
    async fn parses_fixture() {
        let result = ScriptParser::default()
            .parse("tests/fixtures/short_film.txt")
            .await
            .unwrap();
        assert_eq!(result.scenes.len(), 4);
        assert_eq!(result.characters.len(), 5);
    }

    #[tokio::test]
    async fn page_cap_limits_scenes() {
        let result = ScriptParser::new(1)
            .parse("tests/fixtures/short_film.txt")
            .await
            .unwrap();
        assert_eq!(result.scenes.len(), 1);
        assert_eq!(result.scenes[0].end_page, None);
    }

    #[tokio::test]
    async fn extraction_error_propagates() {
        let err = ScriptParser::default()
            .parse("tests/fixtures/missing.txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn empty_document_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, "").unwrap();
        let result = ScriptParser::default().parse(path).await.unwrap();
        assert_eq!(result, ParseResult::default());
    }

    #[test]
    fn prose_has_no_structure() {
        let result = parse_file(Path::new("tests/fixtures/prose.txt"), 10).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn concurrent_parses_agree() {
        use rayon::prelude::*;

        let path = Path::new("tests/fixtures/short_film.txt");
        let expected = parse_file(path, 400).unwrap();
        let results: Vec<_> = (0..8)
            .into_par_iter()
            .map(|_| parse_file(path, 400).unwrap())
            .collect();
        assert!(results.iter().all(|r| *r == expected));
    }
}
