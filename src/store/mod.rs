pub mod dict;
pub mod document;
pub mod executor;
pub mod postings;
pub mod query;
pub mod storage;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::store::dict::Dictionary;
use crate::store::document::StoreDocument;
use crate::store::postings::PostingList;

/// What the store keeps per document besides postings: the data record,
/// value slots, the scoring length and the term list needed to undo the
/// postings on replace or delete.
#[derive(Debug, Clone, Default)]
pub struct StoredDoc {
    pub data: String,
    pub values: BTreeMap<u32, String>,
    pub doc_length: u32,
    pub terms: Vec<String>,
}

/// The inverted index proper: term postings with positions, per-document
/// records and value slots, and an index-wide key/value metadata table.
/// Writes happen in memory; `commit` persists a snapshot and rebuilds the
/// term dictionary used by expansion.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    postings: BTreeMap<String, PostingList>,
    docs: BTreeMap<u32, StoredDoc>,
    metadata: BTreeMap<String, Vec<u8>>,
    next_docid: u32,
    total_doc_length: u64,
    dict: Option<Dictionary>,
    folded_dict: bool,
    dirty: bool,
}

impl Store {
    /// Initialize a fresh store under `dir`. Nothing is written until the
    /// first commit.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        Ok(Store {
            dir,
            postings: BTreeMap::new(),
            docs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            next_docid: 1,
            total_doc_length: 0,
            dict: None,
            folded_dict: false,
            dirty: false,
        })
    }

    pub fn exists(dir: &Path) -> bool {
        storage::exists(dir)
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let image = storage::load(&dir)?;
        debug!("store open: {} docs, {} terms", image.docs.len(), image.postings.len());
        Ok(Store {
            dir,
            postings: image.postings,
            docs: image.docs,
            metadata: image.metadata,
            next_docid: image.next_docid,
            total_doc_length: image.total_doc_length,
            dict: None,
            folded_dict: false,
            dirty: false,
        })
    }

    /// Raw (non-stripping) indexes also maintain a folded-form dictionary
    /// for case/diacritic-insensitive expansion.
    pub fn set_folded_dict(&mut self, on: bool) {
        self.folded_dict = on;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ---- Write side ----

    /// The primitive update operation: create the document if the uniterm
    /// has no posting, replace it wholesale otherwise. The docid is kept
    /// stable across replacement.
    pub fn replace_document(&mut self, uniterm: &str, mut doc: StoreDocument) -> Result<DocId> {
        doc.add_boolean_term(uniterm);
        let existing = self
            .postings
            .get(uniterm)
            .and_then(|pl| pl.docids().next());
        let docid = match existing {
            Some(id) => {
                self.unlink_document(id);
                id
            }
            None => {
                let id = self.next_docid;
                self.next_docid += 1;
                id
            }
        };

        let mut terms = Vec::new();
        for (term, tp) in doc.postings() {
            let mut positions = tp.positions.clone();
            positions.sort_unstable();
            positions.dedup();
            self.postings
                .entry(term.to_string())
                .or_default()
                .upsert(docid, tp.wdf, positions)?;
            terms.push(term.to_string());
        }
        for term in doc.boolean_terms() {
            self.postings
                .entry(term.to_string())
                .or_default()
                .upsert(docid, 0, Vec::new())?;
            terms.push(term.to_string());
        }

        let doc_length = doc.doc_length();
        self.total_doc_length += doc_length as u64;
        self.docs.insert(docid, StoredDoc {
            data: doc.data().to_string(),
            values: doc.values().map(|(s, v)| (s, v.to_string())).collect(),
            doc_length,
            terms,
        });
        self.dirty = true;
        Ok(DocId(docid))
    }

    pub fn delete_document(&mut self, docid: DocId) -> Result<()> {
        if self.docs.contains_key(&docid.0) {
            self.unlink_document(docid.0);
            self.dirty = true;
        }
        Ok(())
    }

    fn unlink_document(&mut self, docid: u32) {
        if let Some(old) = self.docs.remove(&docid) {
            self.total_doc_length = self.total_doc_length.saturating_sub(old.doc_length as u64);
            for term in &old.terms {
                if let Some(pl) = self.postings.get_mut(term) {
                    pl.remove(docid);
                    if pl.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if value.is_empty() {
            self.metadata.remove(key);
        } else {
            self.metadata.insert(key.to_string(), value);
        }
        self.dirty = true;
    }

    pub fn commit(&mut self) -> Result<()> {
        self.rebuild_dict()?;
        storage::save(&self.dir, storage::StoreImage {
            postings: self.postings.clone(),
            docs: self.docs.clone(),
            metadata: self.metadata.clone(),
            next_docid: self.next_docid,
            total_doc_length: self.total_doc_length,
        })?;
        self.dirty = false;
        info!("store commit: {} docs at {}", self.docs.len(), self.dir.display());
        Ok(())
    }

    // ---- Read side ----

    pub fn postings(&self, term: &str) -> Option<&PostingList> {
        self.postings.get(term)
    }

    /// Docid list for a term.
    pub fn postlist(&self, term: &str) -> Vec<DocId> {
        self.postings
            .get(term)
            .map(|pl| pl.docids().map(DocId).collect())
            .unwrap_or_default()
    }

    /// Position list for (docid, term).
    pub fn positions(&self, docid: DocId, term: &str) -> &[u32] {
        self.postings
            .get(term)
            .and_then(|pl| pl.get(docid.0))
            .map(|e| e.positions.as_slice())
            .unwrap_or(&[])
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.postings.get(term).map(|pl| pl.doc_freq()).unwrap_or(0)
    }

    pub fn get_document(&self, docid: DocId) -> Result<&StoredDoc> {
        self.docs
            .get(&docid.0)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no document {}", docid.0)))
    }

    pub fn value(&self, docid: DocId, slot: u32) -> Option<&str> {
        self.docs
            .get(&docid.0)
            .and_then(|d| d.values.get(&slot))
            .map(|s| s.as_str())
    }

    pub fn get_metadata(&self, key: &str) -> Option<&[u8]> {
        self.metadata.get(key).map(|v| v.as_slice())
    }

    pub fn get_metadata_string(&self, key: &str) -> Option<String> {
        self.get_metadata(key)
            .and_then(|v| String::from_utf8(v.to_vec()).ok())
    }

    pub fn metadata_keys(&self, key_prefix: &str) -> Vec<String> {
        self.metadata
            .keys()
            .filter(|k| k.starts_with(key_prefix))
            .cloned()
            .collect()
    }

    pub fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }

    pub fn docids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.keys().map(|id| DocId(*id))
    }

    pub fn doc_terms(&self, docid: DocId) -> &[String] {
        self.docs
            .get(&docid.0)
            .map(|d| d.terms.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_terms(&self) -> impl Iterator<Item = &str> + Clone {
        self.postings.keys().map(|t| t.as_str())
    }

    pub fn avg_doc_length(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_doc_length as f32 / self.docs.len() as f32
        }
    }

    pub fn doc_length_bounds(&self) -> (u32, u32) {
        let mut lo = u32::MAX;
        let mut hi = 0;
        for d in self.docs.values() {
            lo = lo.min(d.doc_length);
            hi = hi.max(d.doc_length);
        }
        if self.docs.is_empty() { (0, 0) } else { (lo, hi) }
    }

    /// Rebuild a document in its pre-insertion form from the stored state:
    /// exact postings, values and data record. `uniterm_prefix` is the
    /// wrapped unique-term prefix, used to report the document's uniterm.
    pub fn export_document(
        &self,
        docid: DocId,
        uniterm_prefix: &str,
    ) -> Result<(String, StoreDocument)> {
        let stored = self.get_document(docid)?;
        let mut doc = StoreDocument::new();
        let mut uniterm = None;
        for term in &stored.terms {
            if let Some(entry) = self.postings.get(term).and_then(|pl| pl.get(docid.0)) {
                doc.set_term_postings(term, entry.wdf, entry.positions.clone());
            }
            if uniterm.is_none() && term.starts_with(uniterm_prefix) {
                uniterm = Some(term.clone());
            }
        }
        for (s, v) in &stored.values {
            doc.add_value(*s, v.clone());
        }
        doc.set_data(stored.data.clone());
        let uniterm = uniterm.ok_or_else(|| {
            Error::new(ErrorKind::StoreCorrupt, format!("document {} has no uniterm", docid.0))
        })?;
        Ok((uniterm, doc))
    }

    /// The committed dictionary, rebuilt on demand when writes happened
    /// since the last build.
    pub fn dict(&mut self) -> Result<&Dictionary> {
        if self.dict.is_none() || self.dirty {
            self.rebuild_dict()?;
        }
        Ok(self.dict.as_ref().unwrap())
    }

    fn rebuild_dict(&mut self) -> Result<()> {
        let terms = self.postings.keys().map(|t| t.as_str());
        self.dict = Some(Dictionary::build(terms, self.folded_dict)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(terms: &[(&str, u32, u32)]) -> StoreDocument {
        let mut d = StoreDocument::new();
        for &(t, pos, wdfinc) in terms {
            d.add_posting(t, pos, wdfinc);
        }
        d
    }

    #[test]
    fn test_replace_is_create_or_update() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        let id1 = store.replace_document("Qudi1", doc_with(&[("hello", 1, 1)])).unwrap();
        assert_eq!(store.postlist("Qudi1"), vec![id1]);
        assert_eq!(store.term_freq("hello"), 1);

        // Same uniterm: replaced in place, docid stable, old terms gone.
        let id2 = store.replace_document("Qudi1", doc_with(&[("world", 1, 1)])).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.term_freq("hello"), 0);
        assert_eq!(store.term_freq("world"), 1);
        assert_eq!(store.doc_count(), 1);
    }

    #[test]
    fn test_delete() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        let id = store.replace_document("Qudi1", doc_with(&[("a", 1, 1)])).unwrap();
        store.delete_document(id).unwrap();
        assert_eq!(store.doc_count(), 0);
        assert_eq!(store.term_freq("a"), 0);
        assert!(store.postlist("Qudi1").is_empty());
    }

    #[test]
    fn test_positions_deduped_on_replace() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        let mut d = StoreDocument::new();
        // Word and covering span at the same position.
        d.add_posting("bill", 100000, 1);
        d.add_posting("bill", 100000, 1);
        let id = store.replace_document("Qx", d).unwrap();
        assert_eq!(store.positions(id, "bill"), &[100000]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::create(tmp.path()).unwrap();
        let mut d = doc_with(&[("alpha", 100000, 1), ("beta", 100001, 1)]);
        d.add_value(10, "sig1");
        d.set_data("url=file:///x\n");
        store.replace_document("Qx", d).unwrap();
        store.set_metadata("descr", "storetext=1\n".as_bytes().to_vec());
        store.commit().unwrap();

        let reopened = Store::open(tmp.path()).unwrap();
        let id = reopened.postlist("Qx")[0];
        assert_eq!(reopened.positions(id, "beta"), &[100001]);
        assert_eq!(reopened.value(id, 10), Some("sig1"));
        assert_eq!(reopened.get_document(id).unwrap().data, "url=file:///x\n");
        assert_eq!(reopened.get_metadata_string("descr").as_deref(), Some("storetext=1\n"));
    }

    #[test]
    fn test_open_missing_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Store::open(tmp.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreOpen);
    }
}
