use std::collections::HashMap;

/// Kind of a highlight term group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Term,
    Phrase,
    Near,
}

/// One phrase/proximity group for the snippet builder: one entry per phrase
/// position, each holding the alternative index terms produced by expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct TermGroup {
    pub kind: GroupKind,
    pub slack: u32,
    pub alternatives: Vec<Vec<String>>,
    /// The words the user actually typed, for display.
    pub user_words: Vec<String>,
}

/// What to mark up in result snippets for a given compiled query.
#[derive(Debug, Clone, Default)]
pub struct HighlightData {
    /// User-entered terms, unexpanded, for display.
    pub uterms: Vec<String>,
    /// Expanded index term (unprefixed form) to the user term it came from.
    pub terms: HashMap<String, String>,
    /// Phrase/near groups over expanded terms.
    pub index_term_groups: Vec<TermGroup>,
    /// Terms added through spelling correction.
    pub spellexpands: Vec<String>,
}

impl HighlightData {
    pub fn new() -> Self {
        HighlightData::default()
    }

    pub fn add_user_term(&mut self, term: &str) {
        if !self.uterms.iter().any(|t| t == term) {
            self.uterms.push(term.to_string());
        }
    }

    pub fn add_expanded(&mut self, expanded: &str, user: &str) {
        self.terms.insert(expanded.to_string(), user.to_string());
    }

    pub fn add_group(&mut self, group: TermGroup) {
        self.index_term_groups.push(group);
    }

    pub fn append(&mut self, other: HighlightData) {
        for t in other.uterms {
            self.add_user_term(&t);
        }
        self.terms.extend(other.terms);
        self.index_term_groups.extend(other.index_term_groups);
        self.spellexpands.extend(other.spellexpands);
    }
}
