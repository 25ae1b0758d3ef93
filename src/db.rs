use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::compression::compress::inflate;
use crate::core::cancel::CancelFlag;
use crate::core::config::IndexConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Doc, DocId};
use crate::index::SeenDocs;
use crate::index::docbuild::{BASE_TEXT_POSITION, BuiltDoc, DocBuilder, SECTION_JUMP};
use crate::index::record::{DataRecord, KEY_MBREAKS, KEY_SIG, decode_mbreaks};
use crate::index::stemdb::{StemDb, build_stem_dbs};
use crate::pipeline::stopwords::StopList;
use crate::pipeline::synonyms::SynGroups;
use crate::query::highlight::HighlightData;
use crate::query::searchdata::{SearchData, SubdocSpec};
use crate::query::translate::{CompiledQuery, Translator};
use crate::schema::fields::{FieldsConfig, PrefixStyle, prefix, slot};
use crate::snippet::{SnippetParams, SnippetsResult, build_snippets};
use crate::store::Store;
use crate::store::executor::{QueryRunner, SearchHit};
use crate::store::query::{SortOrder, StoreQuery};

pub const IDX_VERSION_KEY: &str = "idx_version";
pub const IDX_VERSION: &str = "1";
pub const IDX_DESCRIPTOR_KEY: &str = "idx_descriptor";

/// How often the filesystem fullness gets rechecked, in bytes of text.
const FS_CHECK_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    /// Discard any existing index and start over. Up-to-date checks always
    /// answer "update".
    WriteTruncate,
}

pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub hld: HighlightData,
    pub description: String,
}

#[derive(Default, Debug)]
struct FlushState {
    text_since_flush: u64,
    text_since_fscheck: u64,
}

/// The index database: owns the posting store and provides the indexing
/// and query entry points. The store handle is not thread-safe, so every
/// access, read or write, goes through one mutex.
#[derive(Debug)]
pub struct Db {
    store: Mutex<Store>,
    config: IndexConfig,
    fields: FieldsConfig,
    stops: Arc<StopList>,
    syngroups: Arc<SynGroups>,
    builder: DocBuilder,
    prefixes: PrefixStyle,
    seen: Mutex<SeenDocs>,
    flush: Mutex<FlushState>,
    cancel: CancelFlag,
    truncate_mode: bool,
}

impl Db {
    pub fn open(
        dir: impl AsRef<Path>,
        mode: OpenMode,
        mut config: IndexConfig,
        fields: FieldsConfig,
        stops: Arc<StopList>,
        syngroups: Arc<SynGroups>,
    ) -> Result<Db> {
        let dir = dir.as_ref();
        let truncate = mode == OpenMode::WriteTruncate;
        let mut store;
        if truncate || !Store::exists(dir) {
            if mode == OpenMode::Read {
                return Err(Error::new(
                    ErrorKind::StoreOpen,
                    format!("no index at {}", dir.display()),
                ));
            }
            store = Store::create(dir)?;
            store.set_metadata(IDX_VERSION_KEY, IDX_VERSION.as_bytes().to_vec());
            store.set_metadata(
                IDX_DESCRIPTOR_KEY,
                format!(
                    "storetext={}\nstripchars={}\n",
                    config.store_text as u8, config.strip_chars as u8
                )
                .into_bytes(),
            );
            info!("created index at {}", dir.display());
        } else {
            store = Store::open(dir)?;
            let version = store.get_metadata_string(IDX_VERSION_KEY).unwrap_or_default();
            if version != IDX_VERSION {
                return Err(Error::new(
                    ErrorKind::StoreOpen,
                    format!("index version '{}', this engine needs '{}'", version, IDX_VERSION),
                ));
            }
            // The index-wide properties fixed at creation override the
            // caller's configuration.
            let descr = store.get_metadata_string(IDX_DESCRIPTOR_KEY).unwrap_or_default();
            for line in descr.lines() {
                match line.split_once('=') {
                    Some(("storetext", v)) => config.store_text = v == "1",
                    Some(("stripchars", v)) => config.strip_chars = v == "1",
                    _ => {}
                }
            }
        }
        store.set_folded_dict(!config.strip_chars);

        let builder =
            DocBuilder::new(config.clone(), fields.clone(), stops.clone(), syngroups.clone());
        let prefixes = builder.prefixes();
        Ok(Db {
            store: Mutex::new(store),
            config,
            fields,
            stops,
            syngroups,
            builder,
            prefixes,
            seen: Mutex::new(SeenDocs::new()),
            flush: Mutex::new(FlushState::default()),
            cancel: CancelFlag::new(),
            truncate_mode: truncate,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn prefixes(&self) -> PrefixStyle {
        self.prefixes
    }

    pub fn builder(&self) -> &DocBuilder {
        &self.builder
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn doc_count(&self) -> u64 {
        self.store.lock().doc_count()
    }

    // ---- Indexing ----

    /// Index or reindex one document. Splitting and document building run
    /// on the caller's thread; only the store update takes the lock.
    pub fn add_or_update(&self, udi: &str, parent_udi: Option<&str>, doc: &Doc) -> Result<()> {
        self.cancel.check()?;
        let built = self.builder.build(udi, parent_udi, doc)?;
        self.write_built(built)
    }

    /// Install a pre-built document, the writer-thread side of the split
    /// pipeline.
    pub fn write_built(&self, built: BuiltDoc) -> Result<()> {
        self.cancel.check()?;
        let mut store = self.store.lock();
        let docid = store.replace_document(&built.uniterm, built.doc)?;
        if let Some(text) = built.deflated_text {
            store.set_metadata(&text_key(&built.uniterm), text);
        }
        self.seen.lock().mark(docid);
        debug!("indexed {} as docid {}", built.udi, docid.0);

        // Flush policy: commit every idx_flush_mb of raw text, checking
        // filesystem fullness every MB on the way.
        let mut flush = self.flush.lock();
        flush.text_since_flush += built.text_bytes;
        flush.text_since_fscheck += built.text_bytes;
        if flush.text_since_fscheck >= FS_CHECK_BYTES {
            flush.text_since_fscheck = 0;
            self.check_fs_full(store.dir())?;
        }
        if flush.text_since_flush >= self.config.idx_flush_mb as u64 * 1024 * 1024 {
            flush.text_since_flush = 0;
            drop(flush);
            self.commit_locked(&mut store)?;
        }
        Ok(())
    }

    /// Signature-based up-to-date check. On "up to date", the document and
    /// its sub-documents get their existence bits set.
    pub fn need_update(&self, udi: &str, sig: &str) -> Result<bool> {
        if self.truncate_mode {
            return Ok(true);
        }
        let store = self.store.lock();
        let uniterm = self.prefixes.uniterm(udi);
        let ids = store.postlist(&uniterm);
        let Some(&docid) = ids.first() else {
            debug!("need_update: yes (new): {}", udi);
            return Ok(true);
        };
        let osig = store.value(docid, slot::SIG).unwrap_or("");
        let up_to_date = osig == sig
            || (self.config.no_retry_failed
                && osig.strip_suffix('+').map(|p| p == sig).unwrap_or(false));
        if !up_to_date {
            return Ok(true);
        }
        // Mark the doc and its subdocs as seen for the purge pass.
        let mut seen = self.seen.lock();
        seen.mark(docid);
        for sub in store.postlist(&self.prefixes.parent_term(udi)) {
            seen.mark(sub);
        }
        Ok(false)
    }

    pub fn has_doc(&self, udi: &str) -> bool {
        !self.store.lock().postlist(&self.prefixes.uniterm(udi)).is_empty()
    }

    /// Before reindexing only the documents of one backend, mark everything
    /// else as seen so the final purge leaves it alone.
    pub fn prepare_purge(&self, backend_prefix: &str) -> Result<()> {
        let store = self.store.lock();
        let mut seen = self.seen.lock();
        let wrapped = self.prefixes.wrap(prefix::UNIQ);
        for docid in store.docids() {
            if let Some(udi) = udi_of(&store, docid, &wrapped) {
                if !udi.starts_with(backend_prefix) {
                    seen.mark(docid);
                }
            }
        }
        Ok(())
    }

    /// Delete every document not seen during the walk, then commit.
    pub fn purge(&self) -> Result<()> {
        let mut store = self.store.lock();
        let all: Vec<DocId> = store.docids().collect();
        let seen = self.seen.lock();
        let mut purged = 0u64;
        for (i, docid) in all.into_iter().enumerate() {
            if i % 256 == 0 {
                self.cancel.check()?;
            }
            if !seen.is_seen(docid) {
                self.delete_docid(&mut store, docid)?;
                purged += 1;
            }
        }
        drop(seen);
        info!("purge: removed {} documents", purged);
        self.commit_locked(&mut store)
    }

    /// Delete sub-documents of `udi` whose signature does not match the
    /// container's current one. Used after a partial update.
    pub fn purge_orphans(&self, udi: &str) -> Result<()> {
        let mut store = self.store.lock();
        let parent_ids = store.postlist(&self.prefixes.uniterm(udi));
        let Some(&parent_id) = parent_ids.first() else { return Ok(()) };
        let cur_sig = store
            .value(parent_id, slot::SIG)
            .unwrap_or("")
            .trim_end_matches('+')
            .to_string();
        let subs = store.postlist(&self.prefixes.parent_term(udi));
        for (i, sub) in subs.into_iter().enumerate() {
            if i % 256 == 0 {
                self.cancel.check()?;
            }
            let sub_sig = store
                .value(sub, slot::SIG)
                .unwrap_or("")
                .trim_end_matches('+')
                .to_string();
            if sub_sig != cur_sig {
                debug!("purge_orphans: deleting subdoc {}", sub.0);
                self.delete_docid(&mut store, sub)?;
            }
        }
        Ok(())
    }

    /// Delete a document and its sub-documents.
    pub fn delete_document(&self, udi: &str) -> Result<()> {
        let mut store = self.store.lock();
        for sub in store.postlist(&self.prefixes.parent_term(udi)) {
            self.delete_docid(&mut store, sub)?;
        }
        let ids = store.postlist(&self.prefixes.uniterm(udi));
        if let Some(&docid) = ids.first() {
            self.delete_docid(&mut store, docid)?;
        }
        Ok(())
    }

    fn delete_docid(&self, store: &mut Store, docid: DocId) -> Result<()> {
        // Drop the stored text along with the document.
        let wrapped = self.prefixes.wrap(prefix::UNIQ);
        if let Some(udi) = udi_of(store, docid, &wrapped) {
            let uniterm = self.prefixes.uniterm(&udi);
            store.set_metadata(&text_key(&uniterm), Vec::new());
        }
        store.delete_document(docid)
    }

    /// Update only the metadata fields of an existing document: clear the
    /// re-supplied fields' prefixed postings, re-index them, refresh the
    /// signature and merge the data record.
    pub fn add_or_update_meta(&self, udi: &str, doc: &Doc) -> Result<()> {
        let mut store = self.store.lock();
        let uniterm = self.prefixes.uniterm(udi);
        let ids = store.postlist(&uniterm);
        let Some(&docid) = ids.first() else {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("no indexed document for {}", udi),
            ));
        };
        let (_, mut sdoc) =
            store.export_document(docid, &self.prefixes.wrap(prefix::UNIQ))?;

        // Clear the prefixed terms of the fields being updated.
        let mut wrapped_prefixes: Vec<String> = Vec::new();
        for name in doc.meta.keys() {
            if let Some(traits) = self.fields.traits(name) {
                if !traits.pfx.is_empty() {
                    wrapped_prefixes.push(self.prefixes.wrap(&traits.pfx));
                }
            }
        }
        sdoc.clear_terms_if(|t| wrapped_prefixes.iter().any(|p| t.starts_with(p.as_str())));

        // Re-index those fields above every position already in use below
        // the text body.
        let mut base = sdoc
            .postings()
            .flat_map(|(_, tp)| tp.positions.iter().copied())
            .filter(|&p| p < BASE_TEXT_POSITION)
            .max()
            .unwrap_or(0)
            + SECTION_JUMP;
        let mut names: Vec<&String> = doc.meta.keys().collect();
        names.sort();
        for name in names {
            let Some(traits) = self.fields.traits(name) else { continue };
            if traits.pfx.is_empty() {
                continue;
            }
            let only_prefixed = crate::schema::fields::FieldTraits {
                pfxonly: true,
                ..traits.clone()
            };
            let (next, _) =
                self.builder
                    .index_section(&mut sdoc, &doc.meta[name.as_str()], &only_prefixed, base, false)?;
            base = next;
        }

        if !doc.sig.is_empty() {
            sdoc.add_value(slot::SIG, doc.sig.clone());
        }
        let mut rec = DataRecord::parse(sdoc.data());
        if !doc.sig.is_empty() {
            rec.set(KEY_SIG, &doc.sig);
        }
        for name in self.fields.stored() {
            if let Some(v) = doc.meta_get(name) {
                rec.set(name, v);
            }
        }
        if let Some(caption) = doc.meta_get("caption").or_else(|| doc.meta_get("title")) {
            rec.set("caption", caption);
        }
        sdoc.set_data(rec.to_record_string());

        let docid = store.replace_document(&uniterm, sdoc)?;
        self.seen.lock().mark(docid);
        Ok(())
    }

    /// Commit pending changes: stem expansion maps are rebuilt, then the
    /// store snapshot is written.
    pub fn flush(&self) -> Result<()> {
        let mut store = self.store.lock();
        self.commit_locked(&mut store)
    }

    fn commit_locked(&self, store: &mut Store) -> Result<()> {
        build_stem_dbs(store, &self.config.stemming_languages)?;
        store.commit()
    }

    fn check_fs_full(&self, dir: &Path) -> Result<()> {
        if self.config.max_fs_occup_pc == 0 {
            return Ok(());
        }
        if let Some(pc) = fs_occupation_pc(dir) {
            if pc >= self.config.max_fs_occup_pc {
                warn!("filesystem {}% full, stopping indexing", pc);
                return Err(Error::new(
                    ErrorKind::IndexFull,
                    format!("filesystem holding the index is {}% full", pc),
                ));
            }
        }
        Ok(())
    }

    // ---- Queries ----

    /// Compile and run a search. A corrupt-store error is retried once
    /// after reopening the read handle.
    pub fn search(
        &self,
        sd: &SearchData,
        sort: SortOrder,
        limit: Option<usize>,
    ) -> Result<SearchResults> {
        match self.search_once(sd, sort, limit) {
            Err(e) if e.is_retryable() => {
                warn!("search failed ({}), reopening and retrying", e);
                {
                    let mut store = self.store.lock();
                    *store = Store::open(store.dir())?;
                    store.set_folded_dict(!self.config.strip_chars);
                }
                self.search_once(sd, sort, limit)
            }
            other => other,
        }
    }

    fn search_once(
        &self,
        sd: &SearchData,
        sort: SortOrder,
        limit: Option<usize>,
    ) -> Result<SearchResults> {
        let mut store = self.store.lock();
        let compiled = self.compile_locked(&mut store, sd)?;
        let runner = QueryRunner::new(&store);
        let mut hits = runner.run(&compiled.query, sort, None)?;

        if sd.subspec != SubdocSpec::Any {
            hits.retain(|h| {
                let is_sub = store
                    .get_document(h.docid)
                    .ok()
                    .map(|d| {
                        DataRecord::parse(&d.data)
                            .get("ipath")
                            .map(|i| !i.is_empty())
                            .unwrap_or(false)
                    })
                    .unwrap_or(false);
                match sd.subspec {
                    SubdocSpec::SubOnly => is_sub,
                    SubdocSpec::TopOnly => !is_sub,
                    SubdocSpec::Any => true,
                }
            });
        }
        if let Some(n) = limit {
            hits.truncate(n);
        }
        Ok(SearchResults { hits, hld: compiled.hld, description: compiled.description })
    }

    fn compile_locked(&self, store: &mut Store, sd: &SearchData) -> Result<CompiledQuery> {
        if sd.is_empty() {
            return Ok(CompiledQuery {
                query: StoreQuery::MatchAll,
                hld: HighlightData::new(),
                description: StoreQuery::MatchAll.describe(),
            });
        }
        let stemdbs: Vec<StemDb> = self
            .config
            .stemming_languages
            .iter()
            .filter_map(|lang| StemDb::load(store, lang))
            .collect();
        let translator = Translator::new(
            store,
            &self.config,
            &self.fields,
            &self.stops,
            &self.syngroups,
            &stemdbs,
        );
        translator.translate(sd)
    }

    /// The parsed data record of a result document.
    pub fn get_doc_record(&self, docid: DocId) -> Result<DataRecord> {
        let store = self.store.lock();
        Ok(DataRecord::parse(&store.get_document(docid)?.data))
    }

    /// Decompressed raw text for a document, if stored. Tries the current
    /// key first, then the historical per-docid one.
    pub fn stored_text(&self, docid: DocId) -> Result<Option<String>> {
        let store = self.store.lock();
        let wrapped = self.prefixes.wrap(prefix::UNIQ);
        let by_uniterm = udi_of(&store, docid, &wrapped)
            .map(|udi| text_key(&self.prefixes.uniterm(&udi)))
            .and_then(|key| store.get_metadata(&key).map(|v| v.to_vec()));
        let packed = match by_uniterm {
            Some(v) => v,
            None => match store.get_metadata(&legacy_text_key(docid)) {
                Some(v) => v.to_vec(),
                None => return Ok(None),
            },
        };
        let bytes = inflate(&packed)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| Error::new(ErrorKind::StoreCorrupt, format!("stored text: {}", e)))
    }

    /// Build result snippets for one document of a search.
    pub fn snippets(
        &self,
        docid: DocId,
        hld: &HighlightData,
        params: &SnippetParams,
    ) -> Result<SnippetsResult> {
        let Some(text) = self.stored_text(docid)? else {
            return Ok(SnippetsResult::default());
        };
        let store = self.store.lock();
        let mut breaks: Vec<u32> =
            store.positions(docid, &self.prefixes.wrap(prefix::PAGEBREAK)).to_vec();
        // Breaks the position list could not hold (empty pages).
        if let Some(mb) = DataRecord::parse(&store.get_document(docid)?.data).get(KEY_MBREAKS) {
            for (rel, extra) in decode_mbreaks(mb) {
                for _ in 0..extra {
                    breaks.push(rel + BASE_TEXT_POSITION);
                }
            }
        }
        breaks.sort_unstable();
        drop(store);
        Ok(build_snippets(&self.config, &self.stops, hld, &text, &breaks, params))
    }

    // ---- Shard support ----

    /// Merge every document of another store into this index, used when
    /// compacting temporary shard indexes.
    pub fn absorb_store(&self, other: &Store) -> Result<()> {
        let mut store = self.store.lock();
        let wrapped = self.prefixes.wrap(prefix::UNIQ);
        for docid in other.docids().collect::<Vec<_>>() {
            self.cancel.check()?;
            let (uniterm, doc) = other.export_document(docid, &wrapped)?;
            let new_id = store.replace_document(&uniterm, doc)?;
            if let Some(text) = other.get_metadata(&text_key(&uniterm)) {
                store.set_metadata(&text_key(&uniterm), text.to_vec());
            }
            self.seen.lock().mark(new_id);
        }
        Ok(())
    }
}

fn udi_of(store: &Store, docid: DocId, wrapped_uniq: &str) -> Option<String> {
    store
        .doc_terms(docid)
        .iter()
        .find_map(|t| t.strip_prefix(wrapped_uniq).map(|s| s.to_string()))
}

/// Metadata key of a document's stored text.
pub fn text_key(uniterm: &str) -> String {
    format!("{:x}", md5::compute(uniterm.as_bytes()))
}

/// The historical per-docid key, still honored when reading.
pub fn legacy_text_key(docid: DocId) -> String {
    format!("{:010}", docid.0)
}

/// Percentage of the filesystem holding `path` already in use.
fn fs_occupation_pc(path: &Path) -> Option<u32> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let cpath = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut st) };
    if rc != 0 || st.f_blocks == 0 {
        return None;
    }
    let used = st.f_blocks.saturating_sub(st.f_bavail);
    Some((used as u64 * 100 / st.f_blocks as u64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::searchdata::{ClauseKind, CompositeKind, SearchClause};

    fn open_db(dir: &Path) -> Db {
        let config = IndexConfig { no_aspell: true, ..IndexConfig::default() };
        Db::open(
            dir,
            OpenMode::Write,
            config,
            FieldsConfig::default(),
            Arc::new(StopList::english()),
            Arc::new(SynGroups::new()),
        )
        .unwrap()
    }

    fn doc_with_text(url: &str, sig: &str, text: &str) -> Doc {
        let mut doc = Doc::new(url);
        doc.mimetype = "text/plain".to_string();
        doc.sig = sig.to_string();
        doc.text = text.to_string();
        doc
    }

    fn simple_search(db: &Db, text: &str) -> SearchResults {
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, text, ""));
        db.search(&sd, SortOrder::Relevance, None).unwrap()
    }

    #[test]
    fn test_index_and_search() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        db.add_or_update("u1", None, &doc_with_text("file:///a.txt", "s1", "pride and prejudice"))
            .unwrap();
        db.add_or_update("u2", None, &doc_with_text("file:///b.txt", "s2", "sense and sensibility"))
            .unwrap();
        db.flush().unwrap();
        let res = simple_search(&db, "prejudice");
        assert_eq!(res.hits.len(), 1);
        let rec = db.get_doc_record(res.hits[0].docid).unwrap();
        assert_eq!(rec.get("url"), Some("file:///a.txt"));
    }

    #[test]
    fn test_need_update_protocol() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        assert!(db.need_update("u1", "sigA").unwrap());
        db.add_or_update("u1", None, &doc_with_text("file:///a.txt", "sigA", "text here"))
            .unwrap();
        assert!(!db.need_update("u1", "sigA").unwrap());
        assert!(db.need_update("u1", "sigB").unwrap());
    }

    #[test]
    fn test_failed_doc_retry_control() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        let mut doc = doc_with_text("file:///a.txt", "sigA", "");
        doc.index_error = true;
        db.add_or_update("u1", None, &doc).unwrap();
        // Default: failed docs are retried.
        assert!(db.need_update("u1", "sigA").unwrap());

        db.flush().unwrap();
        drop(db);
        let db3 = Db::open(
            tmp.path(),
            OpenMode::Write,
            IndexConfig { no_retry_failed: true, no_aspell: true, ..IndexConfig::default() },
            FieldsConfig::default(),
            Arc::new(StopList::english()),
            Arc::new(SynGroups::new()),
        )
        .unwrap();
        assert!(!db3.need_update("u1", "sigA").unwrap());
        assert!(db3.need_update("u1", "sigB").unwrap());
    }

    #[test]
    fn test_purge_unseen() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        db.add_or_update("u1", None, &doc_with_text("file:///a.txt", "s1", "alpha"))
            .unwrap();
        db.add_or_update("u2", None, &doc_with_text("file:///b.txt", "s2", "beta"))
            .unwrap();
        db.flush().unwrap();
        drop(db);

        // New walk: only u1 is seen.
        let db = open_db(tmp.path());
        assert!(!db.need_update("u1", "s1").unwrap());
        db.purge().unwrap();
        assert_eq!(db.doc_count(), 1);
        assert!(db.has_doc("u1"));
        assert!(!db.has_doc("u2"));
    }

    #[test]
    fn test_prepare_purge_spares_other_backends() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        db.add_or_update("fs:/a", None, &doc_with_text("file:///a.txt", "s1", "alpha"))
            .unwrap();
        db.add_or_update("web:/b", None, &doc_with_text("http://x/b", "s2", "beta"))
            .unwrap();
        db.flush().unwrap();
        drop(db);

        // Partial walk over the fs backend only: nothing was seen, but the
        // web document must survive the purge.
        let db = open_db(tmp.path());
        db.prepare_purge("fs:").unwrap();
        db.purge().unwrap();
        assert!(db.has_doc("web:/b"));
        assert!(!db.has_doc("fs:/a"));
    }

    #[test]
    fn test_purge_orphan_subdocs() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        let mut container = doc_with_text("file:///c.zip", "sig1", "container");
        container.has_children = true;
        db.add_or_update("c", None, &container).unwrap();
        let mut sub = doc_with_text("file:///c.zip", "sig1", "member one");
        sub.ipath = "1".to_string();
        db.add_or_update("c|1", Some("c"), &sub).unwrap();
        let mut sub2 = doc_with_text("file:///c.zip", "sig1", "member two");
        sub2.ipath = "2".to_string();
        db.add_or_update("c|2", Some("c"), &sub2).unwrap();

        // Reindex the container with a new signature, re-adding only
        // subdoc 1.
        let mut container2 = doc_with_text("file:///c.zip", "sig2", "container");
        container2.has_children = true;
        db.add_or_update("c", None, &container2).unwrap();
        let mut sub1b = doc_with_text("file:///c.zip", "sig2", "member one");
        sub1b.ipath = "1".to_string();
        db.add_or_update("c|1", Some("c"), &sub1b).unwrap();

        db.purge_orphans("c").unwrap();
        assert!(db.has_doc("c"));
        assert!(db.has_doc("c|1"));
        assert!(!db.has_doc("c|2"));
    }

    #[test]
    fn test_stored_text_and_snippets() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        db.add_or_update(
            "u1",
            None,
            &doc_with_text("file:///a.txt", "s1", "pride and prejudice is a novel"),
        )
        .unwrap();
        let res = simple_search(&db, "pride prejudice");
        assert_eq!(res.hits.len(), 1);
        let docid = res.hits[0].docid;
        let text = db.stored_text(docid).unwrap().unwrap();
        assert_eq!(text, "pride and prejudice is a novel");
        let snips = db.snippets(docid, &res.hld, &SnippetParams::default()).unwrap();
        assert!(!snips.snippets.is_empty());
        assert_eq!(snips.snippets[0].page, 1);
        assert!(snips.snippets[0].text.contains("pride"));
        assert!(snips.snippets[0].text.contains("prejudice"));
    }

    #[test]
    fn test_version_mismatch_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let db = open_db(tmp.path());
            db.flush().unwrap();
            let mut store = db.store.lock();
            store.set_metadata(IDX_VERSION_KEY, "99".as_bytes().to_vec());
            store.commit().unwrap();
        }
        let err = Db::open(
            tmp.path(),
            OpenMode::Write,
            IndexConfig::default(),
            FieldsConfig::default(),
            Arc::new(StopList::english()),
            Arc::new(SynGroups::new()),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreOpen);
    }

    #[test]
    fn test_metadata_only_update() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        let mut doc = doc_with_text("file:///a.txt", "s1", "body words here");
        doc.meta_set("title", "Old Title");
        db.add_or_update("u1", None, &doc).unwrap();

        let mut meta = Doc::new("file:///a.txt");
        meta.sig = "s2".to_string();
        meta.meta_set("title", "Completely New");
        db.add_or_update_meta("u1", &meta).unwrap();

        // The new caption matches under the field, the body is untouched.
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "Completely", "title"));
        assert!(!db.search(&sd, SortOrder::Relevance, None).unwrap().hits.is_empty());
        let res = simple_search(&db, "body");
        assert_eq!(res.hits.len(), 1);
        let rec = db.get_doc_record(res.hits[0].docid).unwrap();
        assert_eq!(rec.get("caption"), Some("Completely New"));
        assert_eq!(rec.get("sig"), Some("s2"));
        assert!(!db.need_update("u1", "s2").unwrap());
    }
}
