use std::ops::Range;

/// Upper bound on the number of oral questions a session scores.
pub const MAX_QUESTIONS: usize = 15;
/// Prompts rendered per page.
pub const PAGE_SIZE: usize = 4;

/// Supplies the ordered oral prompts. Truncation happens in [`QuestionSet`].
pub trait QuestionSource: Send + Sync {
    fn questions(&self) -> Vec<String>;
}

/// Fixed prompt list, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestions(pub Vec<String>);

impl QuestionSource for StaticQuestions {
    fn questions(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl StaticQuestions {
    /// Prompts used when no question file is configured.
    pub fn standard() -> Self {
        Self(
            [
                "Introduce your character",
                "Walk through the character background",
                "Summarize the server rules",
                "Define FreeKill",
                "Define MetaGaming",
                "Define PowerGaming",
                "Explain NoFear and NoPain",
                "React to a hostage situation",
                "Handle an out-of-character dispute",
                "Respect safe zones",
                "Proper use of out-of-character chat",
                "Improvised scenario",
                "Long-term character goals",
                "Previous roleplay experience",
                "Overall attitude",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        )
    }
}

/// Ordered prompt list capped at [`MAX_QUESTIONS`], with page arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    prompts: Vec<String>,
}

impl QuestionSet {
    pub fn new(mut prompts: Vec<String>) -> Self {
        prompts.truncate(MAX_QUESTIONS);
        Self { prompts }
    }

    pub fn from_source(source: &dyn QuestionSource) -> Self {
        Self::new(source.questions())
    }

    /// Score denominator: `min(15, configured prompts)`.
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn prompt(&self, index: usize) -> Option<&str> {
        self.prompts.get(index).map(String::as_str)
    }

    pub fn max_page(&self) -> usize {
        self.prompts.len().div_ceil(PAGE_SIZE).saturating_sub(1)
    }

    /// Index range shown on `page`: `[page*4, min(page*4+4, len))`.
    pub fn page_bounds(&self, page: usize) -> Range<usize> {
        let start = page.saturating_mul(PAGE_SIZE).min(self.prompts.len());
        let end = start.saturating_add(PAGE_SIZE).min(self.prompts.len());
        start..end
    }
}
