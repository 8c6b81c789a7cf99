use serde::Serialize;

/// Which part of a recorded candidate produced a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorSource {
    Id,
    Selector,
    TestId,
    Role,
    NameAttribute,
    Text,
    Css,
    Class,
    Xpath,
    Raw,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLocator {
    pub locator: String,
    pub score: i32,
    pub source: LocatorSource,
    /// Recorder confidence of the originating candidate, 0 when absent.
    pub confidence: f64,
}

/// Ranked locators for one step: `primary` is tried first, then `fallbacks` in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocators {
    pub primary: String,
    pub fallbacks: Vec<String>,
    pub ranked: Vec<ScoredLocator>,
    /// True when no candidate produced a locator and the step-id marker was used.
    pub synthetic: bool,
}

impl ResolvedLocators {
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
