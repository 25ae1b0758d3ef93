use std::collections::HashSet;
use std::path::Path;

use crate::core::error::Result;

/// Terms dropped by the indexing pipeline. The list is matched after case
/// and diacritic folding, so entries should be lowercase.
#[derive(Debug, Clone, Default)]
pub struct StopList {
    words: HashSet<String>,
}

impl StopList {
    pub fn new(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        StopList { words: words.into_iter().map(Into::into).collect() }
    }

    pub fn english() -> Self {
        StopList::new([
            "a", "an", "and", "are", "as", "at", "be", "by", "for",
            "from", "has", "he", "in", "is", "it", "its", "of", "on",
            "that", "the", "to", "was", "will", "with",
        ])
    }

    /// One word per line, '#' comments allowed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(StopList::new(
            text.lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| l.to_string()),
        ))
    }

    pub fn is_stop(&self, term: &str) -> bool {
        !self.words.is_empty() && self.words.contains(term)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop() {
        let sl = StopList::english();
        assert!(sl.is_stop("and"));
        assert!(!sl.is_stop("prejudice"));
        assert!(!StopList::default().is_stop("and"));
    }
}
