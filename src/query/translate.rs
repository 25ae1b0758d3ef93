use chrono::{Datelike, Months, NaiveDate};
use log::debug;

use crate::analysis::splitter::{SplitFlags, SplitParams, TermSink, TextSplitter};
use crate::analysis::unaccent::unac_fold;
use crate::core::config::IndexConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::stemdb::StemDb;
use crate::pipeline::stopwords::StopList;
use crate::pipeline::synonyms::SynGroups;
use crate::query::expand::{Expander, has_wildcards};
use crate::query::highlight::{GroupKind, HighlightData, TermGroup};
use crate::query::searchdata::{
    ClauseKind, CompositeKind, DateBound, DateRange, Modifiers, Relation, SearchClause,
    SearchData,
};
use crate::schema::fields::{FieldsConfig, PrefixStyle, prefix, slot};
use crate::store::Store;
use crate::store::query::StoreQuery;

/// Most phrase variants generated from per-position alternatives before we
/// fall back to the first alternative only.
const MAX_PHRASE_VARIANTS: usize = 32;

/// A compiled search: the store query tree plus the highlight description
/// used by the snippet builder, plus a printable form for the UI.
#[derive(Debug)]
pub struct CompiledQuery {
    pub query: StoreQuery,
    pub hld: HighlightData,
    pub description: String,
}

/// Compiles a `SearchData` tree to a posting-store query. Ambient state
/// (expansion caps, stemming languages, field traits) comes in through the
/// context rather than from the tree itself.
pub struct Translator<'a> {
    pub store: &'a mut Store,
    pub config: &'a IndexConfig,
    pub fields: &'a FieldsConfig,
    pub prefixes: PrefixStyle,
    pub stops: &'a StopList,
    pub syngroups: &'a SynGroups,
    pub stemdbs: &'a [StemDb],
    leaves: usize,
    soft_max: usize,
    hld: HighlightData,
}

impl<'a> Translator<'a> {
    pub fn new(
        store: &'a mut Store,
        config: &'a IndexConfig,
        fields: &'a FieldsConfig,
        stops: &'a StopList,
        syngroups: &'a SynGroups,
        stemdbs: &'a [StemDb],
    ) -> Self {
        let prefixes = PrefixStyle { strip_chars: config.strip_chars };
        Translator {
            store,
            config,
            fields,
            prefixes,
            stops,
            syngroups,
            stemdbs,
            leaves: 0,
            soft_max: 0,
            hld: HighlightData::new(),
        }
    }

    pub fn translate(mut self, sd: &SearchData) -> Result<CompiledQuery> {
        self.soft_max = sd.soft_max_expand;
        let query = self.compile(sd, true)?;
        let description = query.describe();
        debug!("compiled query: {}", description);
        Ok(CompiledQuery { query, hld: self.hld, description })
    }

    fn count_leaves(&mut self, q: &StoreQuery) -> Result<()> {
        self.leaves += q.leaf_count();
        if self.leaves > self.config.max_store_clauses {
            return Err(Error::new(
                ErrorKind::MaxClauses,
                format!(
                    "query expands to more than {} clauses; use more specific terms or \
                     case/diacritic sensitivity",
                    self.config.max_store_clauses
                ),
            ));
        }
        Ok(())
    }

    fn compile(&mut self, sd: &SearchData, top: bool) -> Result<StoreQuery> {
        if sd.is_empty() {
            return Ok(StoreQuery::MatchAll);
        }
        let mut positive: Vec<StoreQuery> = Vec::new();
        let mut filters: Vec<StoreQuery> = Vec::new();
        let mut negative: Vec<StoreQuery> = Vec::new();

        for clause in &sd.clauses {
            let q = self.compile_clause(clause)?;
            if q == StoreQuery::MatchNothing && !clause.exclude {
                // An all-stopwords clause: contributes nothing.
                continue;
            }
            self.count_leaves(&q)?;
            if clause.exclude {
                negative.push(q);
            } else if clause.modifiers.contains(Modifiers::FILTER) {
                filters.push(q);
            } else {
                positive.push(q);
            }
        }

        let mut query = match sd.kind {
            CompositeKind::And => StoreQuery::and(positive),
            CompositeKind::Or => StoreQuery::or(positive),
        };

        if top && self.config.auto_phrase && sd.auto_phrase {
            if let Some(phrase) = self.auto_phrase_query(sd)? {
                self.count_leaves(&phrase)?;
                query = StoreQuery::AndMaybe(Box::new(query), Box::new(phrase));
            }
        }

        // Auxiliary result filters.
        if let Some(dates) = &sd.dates {
            let f = self.date_filter(dates, false)?;
            self.count_leaves(&f)?;
            filters.push(f);
        }
        if let Some(dates) = &sd.birth_dates {
            let f = self.date_filter(dates, true)?;
            self.count_leaves(&f)?;
            filters.push(f);
        }
        if sd.min_size >= 0 || sd.max_size >= 0 {
            filters.push(StoreQuery::ValueRange {
                slot: slot::SIZE,
                lo: (sd.min_size >= 0)
                    .then(|| crate::index::record::pad_size(sd.min_size as u64)),
                hi: (sd.max_size >= 0)
                    .then(|| crate::index::record::pad_size(sd.max_size as u64)),
            });
        }
        if !sd.filetypes.is_empty() {
            let f = self.filetype_query(&sd.filetypes)?;
            self.count_leaves(&f)?;
            filters.push(f);
        }
        if !sd.nfiletypes.is_empty() {
            let f = self.filetype_query(&sd.nfiletypes)?;
            self.count_leaves(&f)?;
            negative.push(f);
        }

        for f in filters {
            query = StoreQuery::Filter(Box::new(query), Box::new(f));
        }
        if !negative.is_empty() {
            query = StoreQuery::AndNot(Box::new(query), Box::new(StoreQuery::or(negative)));
        }
        Ok(query)
    }

    fn compile_clause(&mut self, clause: &SearchClause) -> Result<StoreQuery> {
        match clause.kind {
            ClauseKind::And | ClauseKind::Or => self.process_simple(clause),
            ClauseKind::Phrase | ClauseKind::Near => {
                let words = self.split_spans(&clause.text);
                let near = clause.kind == ClauseKind::Near;
                self.process_phrase_or_near(&words, clause, clause.slack, near)
            }
            ClauseKind::Filename => self.process_filename(clause),
            ClauseKind::Path => self.process_path(clause),
            ClauseKind::Range => self.process_range(clause),
            ClauseKind::Sub => match &clause.sub {
                Some(sub) => self.compile(sub, false),
                None => Err(Error::new(ErrorKind::InvalidInput, "SUB clause with no subtree")),
            },
        }
    }

    // A simple clause: whitespace-separated units, quoted units become
    // phrases, each unit is split for spans and expanded.
    fn process_simple(&mut self, clause: &SearchClause) -> Result<StoreQuery> {
        let units = TextSplitter::string_to_strings(&clause.text).ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, "unbalanced quotes in query text")
        })?;
        let mut unit_queries: Vec<StoreQuery> = Vec::new();
        for unit in units {
            let mut mods = clause.modifiers;
            let unit = strip_anchors(&unit, &mut mods);
            if unit.is_empty() {
                continue;
            }
            if unit.contains(char::is_whitespace) {
                // Quoted phrase inside a simple clause.
                let words = self.split_spans(&unit);
                let q = self.process_phrase_or_near(&words, clause, 0, false)?;
                if q != StoreQuery::MatchNothing {
                    unit_queries.push(q);
                }
                continue;
            }
            let spans = self.split_spans(&unit);
            match spans.len() {
                0 => {}
                1 => {
                    if let Some(q) = self.process_simple_span(&spans[0], clause, mods)? {
                        unit_queries.push(q);
                    }
                }
                _ => {
                    // A single unit that splits into several terms (CJK,
                    // mostly): an implicit exact phrase.
                    let q = self.process_phrase_or_near(&spans, clause, 0, false)?;
                    if q != StoreQuery::MatchNothing {
                        unit_queries.push(q);
                    }
                }
            }
        }
        if unit_queries.is_empty() {
            return Ok(StoreQuery::MatchNothing);
        }
        let q = match clause.kind {
            ClauseKind::Or => StoreQuery::or(unit_queries),
            _ => StoreQuery::and(unit_queries),
        };
        Ok(weighted(q, clause.weight))
    }

    fn process_simple_span(
        &mut self,
        span: &str,
        clause: &SearchClause,
        mods: Modifiers,
    ) -> Result<Option<StoreQuery>> {
        if self.stops.is_stop(&unac_fold(span)) && !has_wildcards(span) {
            return Ok(None);
        }
        let field_prefix = self.field_prefix(&clause.field)?;
        let expansion = {
            let mut ex = Expander {
                store: &mut *self.store,
                config: self.config,
                syngroups: self.syngroups,
                stemdbs: self.stemdbs,
                soft_max: self.soft_max,
            };
            ex.expand(span, &field_prefix, mods)?
        };

        let noterms = mods.contains(Modifiers::NOTERMS)
            || self
                .fields
                .traits(&clause.field)
                .map(|t| t.noterms)
                .unwrap_or(false);
        if !noterms {
            self.hld.add_user_term(span);
            for t in &expansion.unprefixed {
                self.hld.add_expanded(t, span);
            }
            self.hld.spellexpands.extend(expansion.spelled.iter().cloned());
        }

        let anchors = (
            mods.contains(Modifiers::ANCHORSTART),
            mods.contains(Modifiers::ANCHOREND),
        );
        let mut alts: Vec<StoreQuery> = Vec::new();
        for term in &expansion.terms {
            let base = match anchors {
                (false, false) => StoreQuery::Term(term.clone()),
                (start, end) => {
                    let mut terms = Vec::new();
                    if start {
                        terms.push(self.prefixes.wrap(prefix::FIELD_START));
                    }
                    terms.push(term.clone());
                    if end {
                        terms.push(self.prefixes.wrap(prefix::FIELD_END));
                    }
                    StoreQuery::Phrase { terms, slack: 0 }
                }
            };
            if Some(term) == expansion.original.as_ref() {
                alts.push(StoreQuery::ScaleWeight(10.0, Box::new(base)));
            } else {
                alts.push(base);
            }
        }
        for words in &expansion.multiword_syns {
            let terms: Vec<String> =
                words.iter().map(|w| format!("{}{}", field_prefix, w)).collect();
            if !noterms {
                self.hld.add_group(TermGroup {
                    kind: GroupKind::Phrase,
                    slack: 0,
                    alternatives: words.iter().map(|w| vec![w.clone()]).collect(),
                    user_words: vec![span.to_string()],
                });
            }
            alts.push(StoreQuery::Phrase { terms, slack: 0 });
        }
        Ok(Some(StoreQuery::or(alts)))
    }

    fn process_phrase_or_near(
        &mut self,
        words: &[String],
        clause: &SearchClause,
        slack: u32,
        near: bool,
    ) -> Result<StoreQuery> {
        let field_prefix = self.field_prefix(&clause.field)?;
        let mut slack = slack;
        let mut alternatives: Vec<Vec<String>> = Vec::new(); // prefixed
        let mut hl_alternatives: Vec<Vec<String>> = Vec::new();
        let mut user_words: Vec<String> = Vec::new();

        for word in words {
            let folded = unac_fold(word);
            if self.stops.is_stop(&folded) && !has_wildcards(word) {
                // Stopwords are not indexed and positions are dense, so the
                // phrase simply contracts around them.
                continue;
            }
            let expand_fully =
                clause.modifiers.contains(Modifiers::EXPANDPHRASE) || has_wildcards(word);
            let mut mods = clause.modifiers;
            if !expand_fully {
                mods |= Modifiers::NOSTEMMING | Modifiers::NOSYNS;
            } else if !clause.modifiers.contains(Modifiers::NOSYNS) {
                // Multi-word synonym alternatives cannot substitute inside
                // a positional window; widen the slack instead.
                slack += self.syngroups.extra_positions(&folded);
            }
            let expansion = {
                let mut ex = Expander {
                    store: self.store,
                    config: self.config,
                    syngroups: self.syngroups,
                    stemdbs: self.stemdbs,
                    soft_max: self.soft_max,
                };
                ex.expand(word, &field_prefix, mods)?
            };
            if expansion.terms.is_empty() {
                return Ok(StoreQuery::MatchNothing);
            }
            user_words.push(word.clone());
            alternatives.push(expansion.terms.clone());
            hl_alternatives.push(expansion.unprefixed.clone());
            if !clause.modifiers.contains(Modifiers::NOTERMS) {
                self.hld.add_user_term(word);
                for t in &expansion.unprefixed {
                    self.hld.add_expanded(t, word);
                }
            }
        }

        match alternatives.len() {
            0 => return Ok(StoreQuery::MatchNothing),
            1 => {
                let alts = alternatives.into_iter().next().unwrap();
                return Ok(weighted(
                    StoreQuery::or(alts.into_iter().map(StoreQuery::Term).collect()),
                    clause.weight,
                ));
            }
            _ => {}
        }

        if !clause.modifiers.contains(Modifiers::NOTERMS) {
            self.hld.add_group(TermGroup {
                kind: if near { GroupKind::Near } else { GroupKind::Phrase },
                slack,
                alternatives: hl_alternatives,
                user_words: user_words.clone(),
            });
        }

        let variants = cartesian(&alternatives, MAX_PHRASE_VARIANTS);
        let qs: Vec<StoreQuery> = variants
            .into_iter()
            .map(|terms| {
                if near {
                    StoreQuery::Near { terms, slack }
                } else {
                    StoreQuery::Phrase { terms, slack }
                }
            })
            .collect();
        Ok(weighted(StoreQuery::or(qs), clause.weight))
    }

    // Fast, narrow filename lookup against the unsplit-filename terms.
    fn process_filename(&mut self, clause: &SearchClause) -> Result<StoreQuery> {
        let folded = unac_fold(clause.text.trim());
        let wrapped = self.prefixes.wrap(prefix::UNSPLIT_FILENAME);
        let terms = if has_wildcards(&folded) {
            let pattern = format!("{}{}", wrapped, folded);
            let cap = self.config.max_term_expand;
            let matched = self.store.dict()?.wildcard_match(&pattern, cap + 1)?;
            if matched.len() > cap {
                return Err(Error::new(
                    ErrorKind::QueryExpansionOverflow,
                    format!("too many filenames match '{}'", clause.text),
                ));
            }
            matched
        } else {
            vec![format!("{}{}", wrapped, folded)]
        };
        Ok(StoreQuery::or(terms.into_iter().map(StoreQuery::Term).collect()))
    }

    // dir: clause: ordered path-element phrase, anchored at the root for
    // absolute paths.
    fn process_path(&mut self, clause: &SearchClause) -> Result<StoreQuery> {
        let path = clause.text.trim();
        let wrapped = self.prefixes.wrap(prefix::PATHELT);
        let mut alternatives: Vec<Vec<String>> = Vec::new();
        if path.starts_with('/') {
            alternatives.push(vec![wrapped.clone()]);
        }
        for elt in path.split('/').filter(|e| !e.is_empty()) {
            let folded = unac_fold(elt);
            if has_wildcards(&folded) {
                let pattern = format!("{}{}", wrapped, folded);
                let cap = self.config.max_term_expand;
                let matched = self.store.dict()?.wildcard_match(&pattern, cap + 1)?;
                if matched.is_empty() {
                    return Ok(StoreQuery::MatchNothing);
                }
                if matched.len() > cap {
                    return Err(Error::new(
                        ErrorKind::QueryExpansionOverflow,
                        format!("too many path elements match '{}'", elt),
                    ));
                }
                alternatives.push(matched);
            } else {
                alternatives.push(vec![format!("{}{}", wrapped, folded)]);
            }
        }
        if alternatives.is_empty() {
            return Ok(StoreQuery::MatchNothing);
        }
        if alternatives.len() == 1 {
            let alts = alternatives.into_iter().next().unwrap();
            return Ok(StoreQuery::or(alts.into_iter().map(StoreQuery::Term).collect()));
        }
        let variants = cartesian(&alternatives, MAX_PHRASE_VARIANTS);
        Ok(StoreQuery::or(
            variants
                .into_iter()
                .map(|terms| StoreQuery::Phrase { terms, slack: 0 })
                .collect(),
        ))
    }

    fn process_range(&mut self, clause: &SearchClause) -> Result<StoreQuery> {
        let traits = self
            .fields
            .traits(&clause.field)
            .ok_or_else(|| {
                Error::new(ErrorKind::UnknownField, format!("unknown field '{}'", clause.field))
            })?;
        let vslot = traits.valueslot.ok_or_else(|| {
            Error::new(
                ErrorKind::BadRange,
                format!("field '{}' has no value slot, cannot range-query it", clause.field),
            )
        })?;
        if clause.text.is_empty() && clause.text2.is_empty() {
            return Err(Error::new(ErrorKind::BadRange, "range clause needs a value"));
        }
        let norm = crate::index::record::normalize_slot_value;
        let v1 = (!clause.text.is_empty()).then(|| norm(&clause.text));
        let v2 = (!clause.text2.is_empty()).then(|| norm(&clause.text2));
        let range = |lo: Option<String>, hi: Option<String>| StoreQuery::ValueRange {
            slot: vslot,
            lo,
            hi,
        };
        let q = match clause.rel {
            // An absent bound leaves that side of the interval open.
            Relation::Contains => range(v1, v2),
            Relation::Equals => {
                let v = v1.ok_or_else(|| Error::new(ErrorKind::BadRange, "empty range value"))?;
                range(Some(v.clone()), Some(v))
            }
            Relation::Lte => range(None, v1),
            Relation::Gte => range(v1, None),
            Relation::Lt => {
                let v = v1.ok_or_else(|| Error::new(ErrorKind::BadRange, "empty range value"))?;
                StoreQuery::AndNot(
                    Box::new(range(None, Some(v.clone()))),
                    Box::new(range(Some(v.clone()), Some(v))),
                )
            }
            Relation::Gt => {
                let v = v1.ok_or_else(|| Error::new(ErrorKind::BadRange, "empty range value"))?;
                StoreQuery::AndNot(
                    Box::new(range(Some(v.clone()), None)),
                    Box::new(range(Some(v.clone()), Some(v))),
                )
            }
        };
        Ok(q)
    }

    // OR of date terms covering the interval: whole years as Y terms, whole
    // months as M terms, leftover days as D terms.
    fn date_filter(&mut self, range: &DateRange, birth: bool) -> Result<StoreQuery> {
        let min = bound_to_date(&range.min, true);
        let max = bound_to_date(&range.max, false);
        if min > max {
            return Err(Error::new(ErrorKind::BadRange, "date range is empty"));
        }
        let (ypfx, mpfx, dpfx) = if birth {
            (prefix::BRT_YEAR, prefix::BRT_MONTH, prefix::BRT_DAY)
        } else {
            (prefix::YEAR, prefix::MONTH, prefix::DAY)
        };
        let mut terms: Vec<StoreQuery> = Vec::new();
        let mut cur = min;
        while cur <= max {
            if cur.month() == 1 && cur.day() == 1 {
                let year_end = NaiveDate::from_ymd_opt(cur.year(), 12, 31).unwrap();
                if year_end <= max {
                    terms.push(StoreQuery::Term(format!(
                        "{}{}",
                        self.prefixes.wrap(ypfx),
                        cur.format("%Y")
                    )));
                    cur = year_end.succ_opt().unwrap();
                    continue;
                }
            }
            if cur.day() == 1 {
                let next_month = cur + Months::new(1);
                let month_end = next_month.pred_opt().unwrap();
                if month_end <= max {
                    terms.push(StoreQuery::Term(format!(
                        "{}{}",
                        self.prefixes.wrap(mpfx),
                        cur.format("%Y%m")
                    )));
                    cur = next_month;
                    continue;
                }
            }
            terms.push(StoreQuery::Term(format!(
                "{}{}",
                self.prefixes.wrap(dpfx),
                cur.format("%Y%m%d")
            )));
            cur = cur.succ_opt().unwrap();
        }
        Ok(StoreQuery::or(terms))
    }

    fn filetype_query(&mut self, types: &[String]) -> Result<StoreQuery> {
        let wrapped = self.prefixes.wrap(prefix::MIMETYPE);
        let mut terms: Vec<StoreQuery> = Vec::new();
        for ft in types {
            if has_wildcards(ft) {
                let pattern = format!("{}{}", wrapped, ft);
                for t in self.store.dict()?.wildcard_match(&pattern, 0)? {
                    terms.push(StoreQuery::Term(t));
                }
            } else {
                terms.push(StoreQuery::Term(format!("{}{}", wrapped, ft)));
            }
        }
        Ok(StoreQuery::or(terms))
    }

    // The ranking helper phrase: every bare user term whose frequency is
    // reasonable, in input order.
    fn auto_phrase_query(&mut self, sd: &SearchData) -> Result<Option<StoreQuery>> {
        let doc_count = self.store.doc_count().max(1);
        let mut terms: Vec<String> = Vec::new();
        for clause in &sd.clauses {
            if clause.exclude
                || !matches!(clause.kind, ClauseKind::And | ClauseKind::Or)
                || !clause.field.is_empty()
            {
                continue;
            }
            let Some(units) = TextSplitter::string_to_strings(&clause.text) else {
                continue;
            };
            for unit in units {
                if has_wildcards(&unit) || unit.contains(char::is_whitespace) {
                    continue;
                }
                let folded = unac_fold(&unit);
                if self.stops.is_stop(&folded) {
                    continue;
                }
                let df = self.store.term_freq(&folded);
                if df * 100 > doc_count * self.config.auto_phrase_term_freq_pc as u64 {
                    continue;
                }
                terms.push(folded);
            }
        }
        if terms.len() < 2 {
            return Ok(None);
        }
        Ok(Some(StoreQuery::Phrase { terms, slack: 0 }))
    }

    fn field_prefix(&self, field: &str) -> Result<String> {
        if field.is_empty() {
            return Ok(String::new());
        }
        match self.fields.traits(field) {
            Some(t) => Ok(self.prefixes.wrap(&t.pfx)),
            None => Err(Error::new(
                ErrorKind::UnknownField,
                format!("unknown field '{}'", field),
            )),
        }
    }

    // Query-mode split: spans kept whole, wildcards preserved.
    fn split_spans(&self, text: &str) -> Vec<String> {
        struct Spans(Vec<String>);
        impl TermSink for Spans {
            fn take_word(&mut self, term: &str, _pos: u32, _s: usize, _e: usize) -> bool {
                self.0.push(term.to_string());
                true
            }
        }
        let mut sink = Spans(Vec::new());
        let mut splitter = TextSplitter::new(
            SplitFlags::ONLY_SPANS | SplitFlags::KEEP_WILD,
            SplitParams::from(self.config),
        );
        splitter.text_to_words(text, &mut sink);
        sink.0
    }
}

fn weighted(q: StoreQuery, weight: f32) -> StoreQuery {
    if (weight - 1.0).abs() < f32::EPSILON {
        q
    } else {
        StoreQuery::ScaleWeight(weight, Box::new(q))
    }
}

fn strip_anchors(unit: &str, mods: &mut Modifiers) -> String {
    let mut s = unit;
    if let Some(rest) = s.strip_prefix('^') {
        *mods |= Modifiers::ANCHORSTART;
        s = rest;
    }
    if let Some(rest) = s.strip_suffix('$') {
        *mods |= Modifiers::ANCHOREND;
        s = rest;
    }
    s.to_string()
}

fn bound_to_date(bound: &DateBound, is_min: bool) -> NaiveDate {
    if !bound.is_set() {
        return if is_min {
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()
        };
    }
    let month = bound.month.clamp(1, 12);
    let day = bound.day.max(1);
    NaiveDate::from_ymd_opt(bound.year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(bound.year, month, 28))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
}

/// Cartesian product of per-position alternatives, bounded. Past the bound,
/// positions fall back to their first alternative.
fn cartesian(alternatives: &[Vec<String>], max: usize) -> Vec<Vec<String>> {
    let total: usize = alternatives.iter().map(|a| a.len().max(1)).product();
    if total > max {
        return vec![alternatives.iter().map(|a| a[0].clone()).collect()];
    }
    let mut out: Vec<Vec<String>> = vec![Vec::new()];
    for alts in alternatives {
        let mut next = Vec::with_capacity(out.len() * alts.len());
        for combo in &out {
            for alt in alts {
                let mut c = combo.clone();
                c.push(alt.clone());
                next.push(c);
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::StoreDocument;

    fn store_with(docs: &[(&str, &[&str])]) -> Store {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        for (udi, words) in docs {
            let mut d = StoreDocument::new();
            for (i, w) in words.iter().enumerate() {
                d.add_posting(w, 100000 + i as u32, 1);
            }
            store
                .replace_document(&format!("Q{}", udi), d)
                .unwrap();
        }
        store
    }

    fn translate_with(
        store: &mut Store,
        config: &IndexConfig,
        sd: &SearchData,
    ) -> Result<CompiledQuery> {
        let fields = FieldsConfig::default();
        let stops = StopList::english();
        let syngroups = SynGroups::new();
        let tr = Translator::new(store, config, &fields, &stops, &syngroups, &[]);
        tr.translate(sd)
    }

    fn cfg() -> IndexConfig {
        IndexConfig { no_aspell: true, ..IndexConfig::default() }
    }

    #[test]
    fn test_simple_and() {
        let mut store = store_with(&[("a", &["pride", "prejudice"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "pride prejudice", ""));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        match &c.query {
            StoreQuery::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected AND, got {:?}", other),
        }
        assert!(c.hld.terms.contains_key("pride"));
        assert_eq!(c.hld.uterms, vec!["pride", "prejudice"]);
    }

    #[test]
    fn test_stopwords_dropped_from_query() {
        let mut store = store_with(&[("a", &["pride"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "the pride", ""));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        // "the" is gone; a single scaled term query remains.
        match &c.query {
            StoreQuery::ScaleWeight(_, inner) => {
                assert_eq!(**inner, StoreQuery::Term("pride".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_query_is_match_all() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And);
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        assert_eq!(c.query, StoreQuery::MatchAll);
    }

    #[test]
    fn test_exclusion_becomes_and_not() {
        let mut store = store_with(&[("a", &["pride", "sense"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "pride", ""))
            .with_clause(SearchClause::simple(ClauseKind::And, "sense", "").excluded());
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        assert!(matches!(c.query, StoreQuery::AndNot(_, _)));
    }

    #[test]
    fn test_phrase_clause() {
        let mut store = store_with(&[("a", &["pride", "prejudice"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::phrase("pride prejudice", 1));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        match &c.query {
            StoreQuery::Phrase { terms, slack } => {
                assert_eq!(terms, &["pride", "prejudice"]);
                assert_eq!(*slack, 1);
            }
            other => panic!("expected phrase, got {:?}", other),
        }
        assert_eq!(c.hld.index_term_groups.len(), 1);
        assert_eq!(c.hld.index_term_groups[0].kind, GroupKind::Phrase);
    }

    #[test]
    fn test_field_prefix_applied() {
        let mut store = store_with(&[("a", &["Spride"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "pride", "title"));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        // The original term is present in the index and gets the boost.
        match &c.query {
            StoreQuery::ScaleWeight(f, inner) => {
                assert_eq!(*f, 10.0);
                assert_eq!(**inner, StoreQuery::Term("Spride".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Highlighting uses the unprefixed form.
        assert!(c.hld.terms.contains_key("pride"));
    }

    #[test]
    fn test_unknown_field() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "x", "nosuchfield"));
        let err = translate_with(&mut store, &cfg(), &sd).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownField);
    }

    #[test]
    fn test_range_needs_value_slot() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::range("author", "a", "b"));
        let err = translate_with(&mut store, &cfg(), &sd).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRange);
    }

    fn slotted_fields() -> FieldsConfig {
        let mut fields = FieldsConfig::default();
        fields.set_traits("pages", crate::schema::fields::FieldTraits {
            pfx: "XPAGES".to_string(),
            wdfinc: 1,
            valueslot: Some(21),
            pfxonly: false,
            noterms: true,
        });
        fields
    }

    fn translate_slotted(store: &mut Store, sd: &SearchData) -> Result<CompiledQuery> {
        let config = cfg();
        let fields = slotted_fields();
        let stops = StopList::english();
        let syngroups = SynGroups::new();
        let tr = Translator::new(store, &config, &fields, &stops, &syngroups, &[]);
        tr.translate(sd)
    }

    #[test]
    fn test_range_open_bounds() {
        let mut store = store_with(&[("a", &["x"])]);
        // Lower bound only: everything at or above it, not an exact match.
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::range("pages", "10", ""));
        let c = translate_slotted(&mut store, &sd).unwrap();
        match &c.query {
            StoreQuery::ValueRange { lo, hi, .. } => {
                assert_eq!(lo.as_deref(), Some("000000000010"));
                assert_eq!(hi.as_deref(), None);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Upper bound only: the symmetric open range.
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::range("pages", "", "20"));
        let c = translate_slotted(&mut store, &sd).unwrap();
        match &c.query {
            StoreQuery::ValueRange { lo, hi, .. } => {
                assert_eq!(lo.as_deref(), None);
                assert_eq!(hi.as_deref(), Some("000000000020"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_range_without_value_rejected() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::range("pages", "", ""));
        let err = translate_slotted(&mut store, &sd).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRange);
    }

    #[test]
    fn test_range_on_slotted_field() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::range("pages", "10", "20"));
        let c = translate_slotted(&mut store, &sd).unwrap();
        match &c.query {
            StoreQuery::ValueRange { slot, lo, hi } => {
                assert_eq!(*slot, 21);
                assert_eq!(lo.as_deref(), Some("000000000010"));
                assert_eq!(hi.as_deref(), Some("000000000020"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_date_filter_decomposition() {
        let mut store = store_with(&[("a", &["x"])]);
        let mut sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "x", ""));
        sd.set_date_span(DateRange {
            min: DateBound::ymd(2013, 12, 30),
            max: DateBound::ymd(2015, 2, 2),
        });
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        // The filter is AND-ed in as a FILTER node over an OR of date terms.
        let StoreQuery::Filter(_, f) = &c.query else {
            panic!("expected filter, got {:?}", c.query)
        };
        let StoreQuery::Or(terms) = f.as_ref() else { panic!("expected OR") };
        let names: Vec<String> = terms
            .iter()
            .map(|t| match t {
                StoreQuery::Term(s) => s.clone(),
                _ => panic!("expected terms"),
            })
            .collect();
        // Two edge days of 2013, the whole of 2014, January 2015, two edge
        // days of February 2015.
        assert!(names.contains(&"D20131230".to_string()));
        assert!(names.contains(&"D20131231".to_string()));
        assert!(names.contains(&"Y2014".to_string()));
        assert!(names.contains(&"M201501".to_string()));
        assert!(names.contains(&"D20150201".to_string()));
        assert!(names.contains(&"D20150202".to_string()));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_max_clauses_cap() {
        let mut store = store_with(&[("a", &["t1", "t2", "t3", "t4"])]);
        let config = IndexConfig { max_store_clauses: 2, no_aspell: true, ..IndexConfig::default() };
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "t*", ""));
        let err = translate_with(&mut store, &config, &sd).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MaxClauses);
    }

    #[test]
    fn test_filename_clause() {
        let mut store = store_with(&[("a", &["x"])]);
        // Seed unsplit filename terms.
        let mut d = StoreDocument::new();
        d.add_posting("x", 100000, 1);
        store.replace_document("Qf", d).unwrap();
        let mut d = StoreDocument::new();
        d.add_boolean_term("XSFNreport.txt");
        d.add_posting("y", 100000, 1);
        store.replace_document("Qg", d).unwrap();
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::filename("report.*"));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        let StoreQuery::Filter(_, f) = &c.query else { panic!("filename should filter") };
        assert_eq!(**f, StoreQuery::Term("XSFNreport.txt".to_string()));
    }

    #[test]
    fn test_path_clause_is_anchored_phrase() {
        let mut store = store_with(&[("a", &["x"])]);
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::path("/home/me", false));
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        let StoreQuery::Filter(_, f) = &c.query else { panic!("path should filter") };
        match f.as_ref() {
            StoreQuery::Phrase { terms, slack } => {
                assert_eq!(terms, &["XP", "XPhome", "XPme"]);
                assert_eq!(*slack, 0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_auto_phrase_added() {
        let mut store = store_with(&[("a", &["pride", "prejudice"])]);
        // Enough other documents that the terms count as rare.
        for i in 0..60 {
            let mut d = StoreDocument::new();
            d.add_posting("filler", 100000, 1);
            store.replace_document(&format!("Qf{}", i), d).unwrap();
        }
        let mut sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "pride prejudice", ""));
        sd.auto_phrase = true;
        let c = translate_with(&mut store, &cfg(), &sd).unwrap();
        let StoreQuery::AndMaybe(_, maybe) = &c.query else {
            panic!("expected AndMaybe, got {:?}", c.query)
        };
        assert!(matches!(maybe.as_ref(), StoreQuery::Phrase { .. }));
    }
}
