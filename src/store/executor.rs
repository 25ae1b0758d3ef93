use std::collections::BTreeMap;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::scoring::bm25::{Bm25, CollectionStats};
use crate::store::Store;
use crate::store::query::{SortOrder, StoreQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub docid: DocId,
    pub score: f32,
}

/// Evaluates a query tree against the store: set operations over posting
/// lists, position window checks for PHRASE/NEAR, BM25 weighting with
/// SCALE_WEIGHT factors applied on the way up.
pub struct QueryRunner<'a> {
    store: &'a Store,
    bm25: Bm25,
    stats: CollectionStats,
}

impl<'a> QueryRunner<'a> {
    pub fn new(store: &'a Store) -> Self {
        let stats = CollectionStats {
            doc_count: store.doc_count(),
            avg_doc_length: store.avg_doc_length(),
        };
        QueryRunner { store, bm25: Bm25::default(), stats }
    }

    pub fn run(
        &self,
        query: &StoreQuery,
        sort: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let scored = self.eval(query);
        let mut hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(id, score)| SearchHit { docid: DocId(id), score })
            .collect();
        match sort {
            SortOrder::Relevance => {
                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.docid.cmp(&b.docid))
                });
            }
            SortOrder::Value { slot, ascending } => {
                hits.sort_by(|a, b| {
                    let va = self.store.value(a.docid, slot).unwrap_or("");
                    let vb = self.store.value(b.docid, slot).unwrap_or("");
                    let ord = va.cmp(vb).then(a.docid.cmp(&b.docid));
                    if ascending { ord } else { ord.reverse() }
                });
            }
        }
        if let Some(n) = limit {
            hits.truncate(n);
        }
        Ok(hits)
    }

    fn eval(&self, query: &StoreQuery) -> BTreeMap<u32, f32> {
        match query {
            StoreQuery::MatchAll => self.store.docids().map(|d| (d.0, 0.0)).collect(),
            StoreQuery::MatchNothing => BTreeMap::new(),
            StoreQuery::Term(term) => self.eval_term(term),
            StoreQuery::And(clauses) => {
                let mut it = clauses.iter();
                let Some(first) = it.next() else { return BTreeMap::new() };
                let mut acc = self.eval(first);
                for c in it {
                    let m = self.eval(c);
                    acc.retain(|id, _| m.contains_key(id));
                    for (id, score) in acc.iter_mut() {
                        *score += m[id];
                    }
                }
                acc
            }
            StoreQuery::Or(clauses) => {
                let mut acc: BTreeMap<u32, f32> = BTreeMap::new();
                for c in clauses {
                    for (id, score) in self.eval(c) {
                        *acc.entry(id).or_insert(0.0) += score;
                    }
                }
                acc
            }
            StoreQuery::AndNot(a, b) => {
                let mut acc = self.eval(a);
                let not = self.eval(b);
                acc.retain(|id, _| !not.contains_key(id));
                acc
            }
            StoreQuery::AndMaybe(a, b) => {
                let mut acc = self.eval(a);
                let maybe = self.eval(b);
                for (id, score) in acc.iter_mut() {
                    if let Some(extra) = maybe.get(id) {
                        *score += extra;
                    }
                }
                acc
            }
            StoreQuery::Filter(a, b) => {
                let mut acc = self.eval(a);
                let filter = self.eval(b);
                acc.retain(|id, _| filter.contains_key(id));
                acc
            }
            StoreQuery::Phrase { terms, slack } => self.eval_group(terms, *slack, true),
            StoreQuery::Near { terms, slack } => self.eval_group(terms, *slack, false),
            StoreQuery::ValueRange { slot, lo, hi } => self
                .store
                .docids()
                .filter(|d| {
                    let Some(v) = self.store.value(*d, *slot) else { return false };
                    lo.as_deref().map(|lo| v >= lo).unwrap_or(true)
                        && hi.as_deref().map(|hi| v <= hi).unwrap_or(true)
                })
                .map(|d| (d.0, 0.0))
                .collect(),
            StoreQuery::ScaleWeight(factor, q) => {
                let mut acc = self.eval(q);
                for score in acc.values_mut() {
                    *score *= factor;
                }
                acc
            }
        }
    }

    fn eval_term(&self, term: &str) -> BTreeMap<u32, f32> {
        let Some(pl) = self.store.postings(term) else {
            return BTreeMap::new();
        };
        let df = pl.doc_freq();
        pl.iter()
            .map(|e| {
                let doc_len = self
                    .store
                    .get_document(DocId(e.docid))
                    .map(|d| d.doc_length)
                    .unwrap_or(0);
                (e.docid, self.bm25.score(&self.stats, df, e.wdf, doc_len))
            })
            .collect()
    }

    // Phrase and proximity: intersect the term postings, then verify a
    // position window of terms.len() + slack on each candidate.
    fn eval_group(&self, terms: &[String], slack: u32, ordered: bool) -> BTreeMap<u32, f32> {
        if terms.is_empty() {
            return BTreeMap::new();
        }
        if terms.len() == 1 {
            return self.eval_term(&terms[0]);
        }
        let and: Vec<StoreQuery> = terms.iter().map(|t| StoreQuery::Term(t.clone())).collect();
        let mut candidates = self.eval(&StoreQuery::And(and));
        let window = terms.len() as u32 + slack;
        candidates.retain(|id, _| {
            let poslists: Vec<&[u32]> = terms
                .iter()
                .map(|t| self.store.positions(DocId(*id), t))
                .collect();
            if ordered {
                phrase_match(&poslists, window)
            } else {
                near_match(&poslists, window)
            }
        });
        candidates
    }
}

/// Terms in order, first-to-last span strictly inside the window.
pub fn phrase_match(poslists: &[&[u32]], window: u32) -> bool {
    let first = poslists[0];
    'starts: for &p0 in first {
        let mut cur = p0;
        for plist in &poslists[1..] {
            // Smallest position after the current one; greedy keeps the
            // span minimal for this start.
            match plist.iter().find(|&&p| p > cur) {
                Some(&p) => cur = p,
                None => break 'starts,
            }
        }
        if cur - p0 < window {
            return true;
        }
    }
    false
}

/// Terms in any order within the window.
pub fn near_match(poslists: &[&[u32]], window: u32) -> bool {
    let k = poslists.len();
    let mut merged: Vec<(u32, usize)> = Vec::new();
    for (idx, plist) in poslists.iter().enumerate() {
        merged.extend(plist.iter().map(|&p| (p, idx)));
    }
    merged.sort_unstable();

    let mut counts = vec![0usize; k];
    let mut have = 0usize;
    let mut left = 0usize;
    for right in 0..merged.len() {
        let (rpos, ridx) = merged[right];
        if counts[ridx] == 0 {
            have += 1;
        }
        counts[ridx] += 1;
        while have == k {
            if rpos - merged[left].0 < window {
                return true;
            }
            let (_, lidx) = merged[left];
            counts[lidx] -= 1;
            if counts[lidx] == 0 {
                have -= 1;
            }
            left += 1;
        }
    }
    false
}
