use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use log::debug;

use crate::analysis::extcjk::{ExternalSplitter, SplitterPool};
use crate::analysis::splitter::{SplitFlags, SplitParams, TextSplitter};
use crate::analysis::unaccent::unac_fold;
use crate::compression::compress::deflate;
use crate::core::config::IndexConfig;
use crate::core::error::Result;
use crate::core::types::Doc;
use crate::index::record::{
    DataRecord, KEY_ABSTRACT, KEY_CAPTION, KEY_DBYTES, KEY_DMTIME, KEY_FBYTES, KEY_FILENAME,
    KEY_FMTIME, KEY_IPATH, KEY_MBREAKS, KEY_MIMETYPE, KEY_ORIGCHARSET, KEY_PCBYTES, KEY_SIG,
    KEY_URL, SYNTHETIC_ABSTRACT_MARKER, encode_mbreaks, normalize_slot_value, pad_size, pad_time,
    truncate_chars,
};
use crate::pipeline::stopwords::StopList;
use crate::pipeline::synonyms::SynGroups;
use crate::pipeline::{MultiSynProc, PrepProc, SplitSink, StopProc, TermProc};
use crate::schema::fields::{FieldTraits, FieldsConfig, PrefixStyle, prefix, slot};
use crate::store::document::StoreDocument;

/// Body text positions start here; metadata fields occupy the range below.
pub const BASE_TEXT_POSITION: u32 = 100_000;
/// Jump between field sections, large enough to kill cross-section phrase
/// matches.
pub const SECTION_JUMP: u32 = 100;

/// Everything the writer thread needs to install one document in the store.
pub struct BuiltDoc {
    pub udi: String,
    pub uniterm: String,
    pub doc: StoreDocument,
    /// zlib-deflated raw text for the store metadata, when text storage is
    /// on and extraction succeeded.
    pub deflated_text: Option<Vec<u8>>,
    /// Raw text size, drives the flush accounting.
    pub text_bytes: u64,
}

/// Turns filter output documents into store documents: term pipeline runs
/// over metadata fields and body, boolean terms, path and date terms, value
/// slots and the data record.
#[derive(Debug)]
pub struct DocBuilder {
    config: IndexConfig,
    fields: FieldsConfig,
    prefixes: PrefixStyle,
    stops: Arc<StopList>,
    syngroups: Arc<SynGroups>,
    cjk_pool: Option<Arc<SplitterPool>>,
}

impl DocBuilder {
    pub fn new(
        config: IndexConfig,
        fields: FieldsConfig,
        stops: Arc<StopList>,
        syngroups: Arc<SynGroups>,
    ) -> Self {
        let prefixes = PrefixStyle { strip_chars: config.strip_chars };
        let cjk_pool = config
            .cjk_tagger
            .as_ref()
            .map(|cmd| SplitterPool::new(cmd.clone(), "default"));
        DocBuilder { config, fields, prefixes, stops, syngroups, cjk_pool }
    }

    pub fn prefixes(&self) -> PrefixStyle {
        self.prefixes
    }

    pub fn fields(&self) -> &FieldsConfig {
        &self.fields
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn fold(&self, s: &str) -> String {
        if self.config.strip_chars { unac_fold(s) } else { s.to_string() }
    }

    /// Build the store-side document. With `doc.index_error` set, only the
    /// filename is indexed and the signature gets the retry marker.
    pub fn build(&self, udi: &str, parent_udi: Option<&str>, doc: &Doc) -> Result<BuiltDoc> {
        let uniterm = self.prefixes.uniterm(udi);
        let mut sdoc = StoreDocument::new();
        let mut base = SECTION_JUMP;

        let failed = doc.index_error;

        if !failed {
            // Metadata fields, in stable order.
            let mut names: Vec<&String> = doc.meta.keys().collect();
            names.sort();
            for name in names {
                let Some(traits) = self.fields.traits(name) else { continue };
                let value = &doc.meta[name.as_str()];
                let (next, _) = self.index_section(&mut sdoc, value, traits, base, false)?;
                base = next;
            }
        }

        // Filename words, split and unprefixed, plus the unsplit term for
        // exact lookups.
        if let Some(fname) = doc.filename() {
            let traits = FieldTraits { noterms: true, wdfinc: 1, ..Default::default() };
            let (next, _) = self.index_section(&mut sdoc, fname, &traits, base, false)?;
            base = next;
            let unsplit = format!(
                "{}{}",
                self.prefixes.wrap(prefix::UNSPLIT_FILENAME),
                self.fold(fname)
            );
            sdoc.add_boolean_term(&unsplit);
            if let Some(dot) = fname.rfind('.') {
                let ext = fname[dot + 1..].to_lowercase();
                if !ext.is_empty() {
                    sdoc.add_boolean_term(&format!("{}{}", self.prefixes.wrap(prefix::EXT), ext));
                }
            }
        }

        // Path element terms for directory filtering, in order, consecutive
        // positions. An absolute path gets an empty root element so PATH
        // queries can anchor.
        self.add_path_terms(&mut sdoc, &doc.url, base);

        // Body text.
        let mut mbreaks: Vec<(u32, u32)> = Vec::new();
        if !failed && !doc.text.is_empty() {
            let traits = FieldTraits { wdfinc: 1, ..Default::default() };
            let (_, breaks) =
                self.index_section(&mut sdoc, &doc.text, &traits, BASE_TEXT_POSITION, true)?;
            mbreaks = breaks;
        }

        // Boolean identity and category terms.
        sdoc.add_boolean_term(&uniterm);
        if let Some(parent) = parent_udi {
            sdoc.add_boolean_term(&self.prefixes.parent_term(parent));
        }
        if !doc.mimetype.is_empty() {
            sdoc.add_boolean_term(&format!(
                "{}{}",
                self.prefixes.wrap(prefix::MIMETYPE),
                doc.mimetype
            ));
        }
        if doc.has_children {
            sdoc.add_boolean_term(&self.prefixes.wrap(prefix::HAS_CHILDREN));
        }
        self.add_date_terms(&mut sdoc, doc);
        if let Some(md5) = doc.meta_get("md5") {
            sdoc.add_boolean_term(&format!("{}{}", self.prefixes.wrap(prefix::MD5), md5));
            sdoc.add_value(slot::MD5, md5);
        }

        // Values.
        let sig = if failed { format!("{}+", doc.sig) } else { doc.sig.clone() };
        sdoc.add_value(slot::SIG, sig.clone());
        let size = if doc.fbytes != 0 { doc.fbytes } else { doc.pcbytes };
        sdoc.add_value(slot::SIZE, pad_size(size));
        for (name, value) in &doc.meta {
            if let Some(vslot) = self.fields.value_slot(name) {
                sdoc.add_value(vslot, normalize_slot_value(value));
            }
        }

        // Data record.
        let text_bytes = doc.text.len() as u64;
        let rec = self.build_record(doc, &sig, text_bytes, &mbreaks);
        sdoc.set_data(rec.to_record_string());

        let deflated_text = if self.config.store_text && !failed && !doc.text.is_empty() {
            Some(deflate(doc.text.as_bytes())?)
        } else {
            None
        };

        debug!("built doc {}: {} terms", udi, sdoc.terms().len());
        Ok(BuiltDoc {
            udi: udi.to_string(),
            uniterm,
            doc: sdoc,
            deflated_text,
            text_bytes,
        })
    }

    /// Index one text section: start anchor, pipeline run, end anchor.
    /// Returns the base position for the next section and the multi-break
    /// pairs collected when page tracking is on.
    pub fn index_section(
        &self,
        sdoc: &mut StoreDocument,
        text: &str,
        traits: &FieldTraits,
        base: u32,
        with_pages: bool,
    ) -> Result<(u32, Vec<(u32, u32)>)> {
        sdoc.add_posting(&self.prefixes.wrap(prefix::FIELD_START), base, 0);
        let words_base = base + 1;

        let (used, mbreaks) = {
            let emit = EmitTerms {
                doc: &mut *sdoc,
                prefix: self.prefixes.wrap(&traits.pfx),
                wdfinc: traits.wdfinc.max(1),
                pfxonly: traits.pfxonly,
                base: words_base,
                next_ord: 0,
                posmap: HashMap::new(),
                page_term: with_pages.then(|| self.prefixes.wrap(prefix::PAGEBREAK)),
                last_break: None,
                mbreaks: Vec::new(),
            };

            let stop = StopProc::new(self.stops.clone(), emit);
            let syn = MultiSynProc::new(self.syngroups.clone(), stop);
            let mut chain = PrepProc::new(self.config.strip_chars, syn);

            let params = SplitParams::from(&self.config);
            let mut splitter = TextSplitter::new(SplitFlags::empty(), params);
            if let Some(pool) = &self.cjk_pool {
                splitter = splitter.with_external(ExternalSplitter::new(pool.clone(), false));
            }
            {
                let mut sink = SplitSink::new(&mut chain);
                splitter.text_to_words(text, &mut sink);
            }
            chain.flush();
            let emit = chain.next.next.next;
            (emit.next_ord, emit.mbreaks)
        };

        let end = words_base + used;
        sdoc.add_posting(&self.prefixes.wrap(prefix::FIELD_END), end, 0);
        Ok((end + SECTION_JUMP, mbreaks))
    }

    fn add_path_terms(&self, sdoc: &mut StoreDocument, url: &str, base: u32) {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let Some((dir, _)) = path.rsplit_once('/') else { return };
        let xp = self.prefixes.wrap(prefix::PATHELT);
        let mut pos = base;
        if path.starts_with('/') {
            sdoc.add_posting(&xp, pos, 0);
            pos += 1;
        }
        for elt in dir.split('/').filter(|e| !e.is_empty()) {
            sdoc.add_posting(&format!("{}{}", xp, self.fold(elt)), pos, 0);
            pos += 1;
        }
    }

    fn add_date_terms(&self, sdoc: &mut StoreDocument, doc: &Doc) {
        let stamp = if !doc.dmtime.is_empty() { &doc.dmtime } else { &doc.fmtime };
        self.add_date_terms_for(sdoc, stamp, prefix::YEAR, prefix::MONTH, prefix::DAY);
        if !doc.brtime.is_empty() {
            self.add_date_terms_for(
                sdoc,
                &doc.brtime,
                prefix::BRT_YEAR,
                prefix::BRT_MONTH,
                prefix::BRT_DAY,
            );
        }
    }

    fn add_date_terms_for(
        &self,
        sdoc: &mut StoreDocument,
        stamp: &str,
        ypfx: &str,
        mpfx: &str,
        dpfx: &str,
    ) {
        let Ok(secs) = stamp.trim().parse::<i64>() else { return };
        let Some(dt) = DateTime::from_timestamp(secs, 0) else { return };
        let date = dt.date_naive();
        sdoc.add_boolean_term(&format!("{}{}", self.prefixes.wrap(ypfx), date.format("%Y")));
        sdoc.add_boolean_term(&format!("{}{}", self.prefixes.wrap(mpfx), date.format("%Y%m")));
        sdoc.add_boolean_term(&format!("{}{}", self.prefixes.wrap(dpfx), date.format("%Y%m%d")));
    }

    fn build_record(
        &self,
        doc: &Doc,
        sig: &str,
        text_bytes: u64,
        mbreaks: &[(u32, u32)],
    ) -> DataRecord {
        let cfg = &self.config;
        let mut rec = DataRecord::new();
        rec.set(KEY_URL, &doc.url);
        rec.set_opt(KEY_MIMETYPE, &doc.mimetype);
        if let Ok(secs) = doc.fmtime.trim().parse::<u64>() {
            rec.set(KEY_FMTIME, &pad_time(secs));
        }
        rec.set_opt(KEY_DMTIME, &doc.dmtime);
        rec.set_opt(KEY_ORIGCHARSET, &doc.origcharset);
        if let Some(fname) = doc.filename() {
            rec.set(KEY_FILENAME, fname);
        }
        if let Some(caption) = doc.meta_get("caption").or_else(|| doc.meta_get("title")) {
            rec.set(KEY_CAPTION, truncate_chars(caption, cfg.idx_meta_stored_len));
        }
        // A missing or stub abstract is replaced by a marked prefix of the
        // body text.
        let abs = doc.meta_get("abstract").unwrap_or("");
        if abs.len() >= cfg.abstract_min_len {
            rec.set(KEY_ABSTRACT, truncate_chars(abs, cfg.idx_meta_stored_len));
        } else if !doc.text.is_empty() {
            let cut = truncate_chars(doc.text.trim_start(), cfg.idx_text_truncate_len);
            rec.set(KEY_ABSTRACT, &format!("{}{}", SYNTHETIC_ABSTRACT_MARKER, cut));
        }
        rec.set_opt(KEY_IPATH, &doc.ipath);
        if doc.pcbytes != 0 {
            rec.set(KEY_PCBYTES, &doc.pcbytes.to_string());
        }
        if doc.fbytes != 0 {
            rec.set(KEY_FBYTES, &doc.fbytes.to_string());
        }
        rec.set(KEY_DBYTES, &text_bytes.to_string());
        rec.set(KEY_SIG, sig);
        for name in self.fields.stored() {
            if let Some(v) = doc.meta_get(name) {
                rec.set(name, truncate_chars(v, cfg.idx_meta_stored_len));
            }
        }
        if !mbreaks.is_empty() {
            rec.set(KEY_MBREAKS, &encode_mbreaks(mbreaks));
        }
        rec
    }
}

/// Final pipeline link: allocates dense positions and adds the postings,
/// prefixed and, unless the field is prefix-only, unprefixed.
struct EmitTerms<'a> {
    doc: &'a mut StoreDocument,
    prefix: String,
    wdfinc: u32,
    pfxonly: bool,
    base: u32,
    next_ord: u32,
    /// Splitter position to dense position: a span lands on the dense
    /// position of its first word.
    posmap: HashMap<u32, u32>,
    page_term: Option<String>,
    last_break: Option<u32>,
    mbreaks: Vec<(u32, u32)>,
}

impl TermProc for EmitTerms<'_> {
    fn take(&mut self, term: &str, spos: u32) -> bool {
        let dense = match self.posmap.get(&spos) {
            Some(&d) => d,
            None => {
                let d = self.base + self.next_ord;
                self.next_ord += 1;
                self.posmap.insert(spos, d);
                d
            }
        };
        if !self.prefix.is_empty() {
            self.doc.add_posting(&format!("{}{}", self.prefix, term), dense, self.wdfinc);
            if self.pfxonly {
                return true;
            }
        }
        self.doc.add_posting(term, dense, self.wdfinc);
        true
    }

    fn page(&mut self, _spos: u32) -> bool {
        let Some(term) = self.page_term.clone() else { return true };
        let pos = self.base + self.next_ord;
        if self.last_break == Some(pos) {
            // An empty page: the position list cannot hold the same
            // position twice, record it in the data record instead.
            let rel = pos - BASE_TEXT_POSITION;
            if let Some(entry) = self.mbreaks.iter_mut().find(|(p, _)| *p == rel) {
                entry.1 += 1;
            } else {
                self.mbreaks.push((rel, 1));
            }
        } else {
            self.doc.add_posting(&term, pos, 0);
            self.last_break = Some(pos);
        }
        true
    }
}
