use serde::{Deserialize, Serialize};

/// Plain text of one page, as handed over by the extraction layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_index: usize,
    pub text: String,
}

impl PageText {
    pub fn new(page_index: usize, text: impl Into<String>) -> Self {
        PageText {
            page_index,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub heading: String,
    pub start_page: usize,
    /// `None` for the last scene: the document end is not tracked.
    pub end_page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub first_page: Option<usize>,
}

/// Scenes in discovery order, characters sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub scenes: Vec<Scene>,
    pub characters: Vec<Character>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty() && self.characters.is_empty()
    }
}
