use std::collections::{BTreeMap, BTreeSet};

/// A store document under construction: the indexer accumulates postings,
/// boolean terms, value slots and the data record here, then hands the whole
/// thing to `Store::replace_document` in one step.
#[derive(Debug, Clone, Default)]
pub struct StoreDocument {
    postings: BTreeMap<String, TermPostings>,
    boolean_terms: BTreeSet<String>,
    values: BTreeMap<u32, String>,
    data: String,
}

#[derive(Debug, Clone, Default)]
pub struct TermPostings {
    pub wdf: u32,
    pub positions: Vec<u32>,
}

impl StoreDocument {
    pub fn new() -> Self {
        StoreDocument::default()
    }

    /// Add one positional posting. Positions may repeat when a word and its
    /// span coincide; they are deduplicated and sorted at store time.
    pub fn add_posting(&mut self, term: &str, pos: u32, wdfinc: u32) {
        let tp = self.postings.entry(term.to_string()).or_default();
        tp.positions.push(pos);
        tp.wdf = tp.wdf.saturating_add(wdfinc);
    }

    /// Add a term without position or weight (uniterm, mimetype, ...).
    pub fn add_boolean_term(&mut self, term: &str) {
        if !self.postings.contains_key(term) {
            self.boolean_terms.insert(term.to_string());
        }
    }

    pub fn add_value(&mut self, slot: u32, value: impl Into<String>) {
        self.values.insert(slot, value.into());
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn value(&self, slot: u32) -> Option<&str> {
        self.values.get(&slot).map(|s| s.as_str())
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.postings.contains_key(term) || self.boolean_terms.contains(term)
    }

    /// Remove all postings of terms selected by the predicate. Used by
    /// metadata-only updates to clear one field's prefixed terms before
    /// re-indexing it.
    pub fn clear_terms_if(&mut self, mut pred: impl FnMut(&str) -> bool) {
        self.postings.retain(|t, _| !pred(t));
        self.boolean_terms.retain(|t| !pred(t));
    }

    /// Install exact postings for a term, used when rebuilding a document
    /// from its stored form (metadata-only updates, shard compaction).
    pub fn set_term_postings(&mut self, term: &str, wdf: u32, positions: Vec<u32>) {
        if positions.is_empty() && wdf == 0 {
            self.boolean_terms.insert(term.to_string());
        } else {
            self.postings.insert(term.to_string(), TermPostings { wdf, positions });
        }
    }

    /// Sum of wdf over positional terms, the document length for scoring.
    pub fn doc_length(&self) -> u32 {
        self.postings.values().map(|tp| tp.wdf).sum()
    }

    pub fn postings(&self) -> impl Iterator<Item = (&str, &TermPostings)> {
        self.postings.iter().map(|(t, tp)| (t.as_str(), tp))
    }

    pub fn boolean_terms(&self) -> impl Iterator<Item = &str> {
        self.boolean_terms.iter().map(|t| t.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = (u32, &str)> {
        self.values.iter().map(|(s, v)| (*s, v.as_str()))
    }

    /// All terms, positional and boolean.
    pub fn terms(&self) -> Vec<String> {
        self.postings
            .keys()
            .chain(self.boolean_terms.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_wdf() {
        let mut doc = StoreDocument::new();
        doc.add_posting("caption_term", 1, 10);
        doc.add_posting("caption_term", 5, 10);
        doc.add_posting("body", 100000, 1);
        let tp: Vec<_> = doc.postings().collect();
        assert_eq!(tp.len(), 2);
        assert_eq!(doc.doc_length(), 21);
    }

    #[test]
    fn test_boolean_terms_dont_score() {
        let mut doc = StoreDocument::new();
        doc.add_boolean_term("Qudi1");
        assert_eq!(doc.doc_length(), 0);
        assert!(doc.has_term("Qudi1"));
    }

    #[test]
    fn test_clear_terms_if() {
        let mut doc = StoreDocument::new();
        doc.add_posting("Sterm", 1, 10);
        doc.add_posting("body", 100000, 1);
        doc.clear_terms_if(|t| t.starts_with('S'));
        assert!(!doc.has_term("Sterm"));
        assert!(doc.has_term("body"));
    }
}
