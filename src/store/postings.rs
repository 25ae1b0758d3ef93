use crate::core::error::{Error, ErrorKind, Result};

/// One (doc, positions, wdf) entry. Boolean terms have no positions and a
/// zero wdf.
#[derive(Debug, Clone, Default)]
pub struct PostingEntry {
    pub docid: u32,
    pub wdf: u32,
    /// Strictly increasing within the document.
    pub positions: Vec<u32>,
}

/// Posting list for one term, kept sorted by docid for merge operations.
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    entries: Vec<PostingEntry>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList { entries: Vec::new() }
    }

    /// Insert or replace the entry for a document. Positions must be sorted
    /// strictly increasing; duplicates are rejected rather than silently
    /// collapsed so the position invariant cannot rot.
    pub fn upsert(&mut self, docid: u32, wdf: u32, positions: Vec<u32>) -> Result<()> {
        if positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "positions not strictly increasing",
            ));
        }
        let entry = PostingEntry { docid, wdf, positions };
        match self.entries.binary_search_by_key(&docid, |e| e.docid) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
        Ok(())
    }

    pub fn remove(&mut self, docid: u32) {
        if let Ok(i) = self.entries.binary_search_by_key(&docid, |e| e.docid) {
            self.entries.remove(i);
        }
    }

    pub fn get(&self, docid: u32) -> Option<&PostingEntry> {
        self.entries
            .binary_search_by_key(&docid, |e| e.docid)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingEntry> {
        self.entries.iter()
    }

    pub fn docids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.docid)
    }

    /// Number of documents containing the term.
    pub fn doc_freq(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Total wdf over the collection.
    pub fn coll_freq(&self) -> u64 {
        self.entries.iter().map(|e| e.wdf as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
