use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::analysis::splitter::{SplitFlags, SplitParams, TermSink, TextSplitter};
use crate::analysis::unaccent::unac_fold;
use crate::core::config::IndexConfig;
use crate::index::docbuild::BASE_TEXT_POSITION;
use crate::pipeline::stopwords::StopList;
use crate::query::highlight::{GroupKind, HighlightData};

/// Cap on consecutive fragment extensions, so a very common term cannot
/// widen one fragment across the whole document.
const MAX_EXTENSIONS: usize = 3;
/// Weight bonus for a fragment containing a full phrase/near group match.
const GROUP_MATCH_BONUS: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct SnippetParams {
    pub max_snippets: usize,
    /// Context words kept around each hit.
    pub ctx_words: usize,
    /// Order by position in the document instead of by score.
    pub sort_by_page: bool,
    /// Token cutoff for the text walk; exceeding it truncates the result.
    pub max_tokens: usize,
}

impl Default for SnippetParams {
    fn default() -> Self {
        SnippetParams {
            max_snippets: 12,
            ctx_words: 6,
            sort_by_page: false,
            max_tokens: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    /// 1-based page, from the recorded page-break positions.
    pub page: u32,
    /// The user term the fragment's best hit came from.
    pub term: String,
    pub text: String,
    /// Line number of the fragment start in the raw text.
    pub line: u32,
}

#[derive(Debug, Default)]
pub struct SnippetsResult {
    pub snippets: Vec<Snippet>,
    /// The walk hit the token cutoff; results cover a prefix of the text.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy)]
struct TermHit {
    pos: u32,
    bstart: usize,
    bend: usize,
}

#[derive(Debug)]
struct Fragment {
    start_byte: usize,
    end_byte: usize,
    start_pos: u32,
    line: u32,
    weight: f32,
    best_term: String,
    // Extension budget while open.
    remaining: usize,
    extensions: usize,
}

struct AbstractWalker<'a> {
    fold: bool,
    stops: &'a StopList,
    terms: &'a HashMap<String, String>,
    wanted_positions: &'a HashSet<String>,
    ctx_words: usize,
    max_tokens: usize,

    window: VecDeque<(String, TermHit, u32)>,
    next_ord: u32,
    line: u32,
    tokens: usize,
    truncated: bool,
    open: Option<Fragment>,
    done: Vec<Fragment>,
    positions: HashMap<String, Vec<TermHit>>,
}

impl AbstractWalker<'_> {
    fn close_open(&mut self) {
        if let Some(frag) = self.open.take() {
            self.done.push(frag);
        }
    }
}

impl TermSink for AbstractWalker<'_> {
    fn take_word(&mut self, term: &str, _spos: u32, bstart: usize, bend: usize) -> bool {
        self.tokens += 1;
        if self.tokens > self.max_tokens {
            self.truncated = true;
            return false;
        }
        let folded = if self.fold { unac_fold(term) } else { term.to_string() };
        if self.stops.is_stop(&folded) {
            return true;
        }
        // Dense positions, mirroring the indexing pipeline.
        let pos = BASE_TEXT_POSITION + 1 + self.next_ord;
        self.next_ord += 1;
        let hit = TermHit { pos, bstart, bend };

        if self.wanted_positions.contains(&folded) {
            self.positions.entry(folded.clone()).or_default().push(hit);
        }

        self.window.push_back((folded.clone(), hit, self.line));
        while self.window.len() > self.ctx_words + 1 {
            self.window.pop_front();
        }

        let matched = self.terms.contains_key(&folded);
        if matched {
            let can_extend = match &self.open {
                Some(frag) => frag.extensions < MAX_EXTENSIONS,
                None => false,
            };
            if can_extend {
                let frag = self.open.as_mut().unwrap();
                frag.weight += 1.0;
                frag.remaining = self.ctx_words;
                frag.extensions += 1;
                frag.end_byte = bend;
            } else {
                // Extension budget exhausted, or nothing open yet: finish
                // any current fragment and open a fresh one here.
                self.close_open();
                self.open_fragment(&folded);
            }
        } else if self.open.is_some() {
            let close = {
                let frag = self.open.as_mut().unwrap();
                frag.end_byte = bend;
                if frag.remaining == 0 {
                    true
                } else {
                    frag.remaining -= 1;
                    false
                }
            };
            if close {
                self.close_open();
            }
        }
        true
    }

    fn new_line(&mut self, _pos: u32) {
        self.line += 1;
    }
}

impl AbstractWalker<'_> {
    fn open_fragment(&mut self, matched_term: &str) {
        let (_, first_hit, first_line) = self.window.front().cloned().unwrap();
        let (_, last_hit, _) = self.window.back().cloned().unwrap();
        self.open = Some(Fragment {
            start_byte: first_hit.bstart,
            end_byte: last_hit.bend,
            start_pos: first_hit.pos,
            line: first_line,
            weight: 1.0,
            best_term: matched_term.to_string(),
            remaining: self.ctx_words,
            extensions: 0,
        });
    }
}

/// Select and score text fragments around query-term matches in the stored
/// raw text, find phrase/near group matches over the recorded positions,
/// and map fragment starts to page numbers.
pub fn build_snippets(
    config: &IndexConfig,
    stops: &StopList,
    hld: &HighlightData,
    raw_text: &str,
    page_positions: &[u32],
    params: &SnippetParams,
) -> SnippetsResult {
    if raw_text.is_empty() || hld.terms.is_empty() {
        return SnippetsResult::default();
    }

    // Positions are only recorded for terms some group needs.
    let wanted_positions: HashSet<String> = hld
        .index_term_groups
        .iter()
        .filter(|g| g.kind != GroupKind::Term)
        .flat_map(|g| g.alternatives.iter().flatten().cloned())
        .collect();

    let mut walker = AbstractWalker {
        fold: config.strip_chars,
        stops,
        terms: &hld.terms,
        wanted_positions: &wanted_positions,
        ctx_words: params.ctx_words,
        max_tokens: params.max_tokens,
        window: VecDeque::new(),
        next_ord: 0,
        line: 1,
        tokens: 0,
        truncated: false,
        open: None,
        done: Vec::new(),
        positions: HashMap::new(),
    };

    // Words only: spans would double-count positions here.
    let mut splitter = TextSplitter::new(SplitFlags::NO_SPANS, SplitParams::from(config));
    splitter.text_to_words(raw_text, &mut walker);
    walker.close_open();

    let truncated = walker.truncated;
    let mut fragments = walker.done;
    let positions = walker.positions;

    // Phrase/near group matches give their containing fragments a bonus.
    for group in &hld.index_term_groups {
        if group.kind == GroupKind::Term || group.alternatives.len() < 2 {
            continue;
        }
        let slots: Vec<Vec<TermHit>> = group
            .alternatives
            .iter()
            .map(|alts| {
                let mut hits: Vec<TermHit> = alts
                    .iter()
                    .flat_map(|t| positions.get(t).cloned().unwrap_or_default())
                    .collect();
                hits.sort_by_key(|h| h.pos);
                hits
            })
            .collect();
        if slots.iter().any(|s| s.is_empty()) {
            continue;
        }
        let window = group.alternatives.len() as u32 + group.slack;
        for (mstart, mend) in match group.kind {
            GroupKind::Phrase => phrase_group_matches(&slots, window),
            _ => near_group_matches(&slots, window),
        } {
            for frag in fragments.iter_mut() {
                if frag.start_byte <= mend && frag.end_byte >= mstart {
                    frag.weight += GROUP_MATCH_BONUS;
                }
            }
        }
    }

    if params.sort_by_page {
        fragments.sort_by_key(|f| f.start_pos);
    } else {
        fragments.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.start_pos.cmp(&b.start_pos))
        });
    }
    fragments.truncate(params.max_snippets);

    let snippets = fragments
        .into_iter()
        .map(|f| {
            let text = clean_fragment(&raw_text[f.start_byte..f.end_byte]);
            let page = page_number(page_positions, f.start_pos);
            let term = hld.terms.get(&f.best_term).cloned().unwrap_or(f.best_term);
            Snippet { page, term, text, line: f.line }
        })
        .collect();

    debug!("snippets built, truncated={}", truncated);
    SnippetsResult { snippets, truncated }
}

// Ordered group match: greedy smallest-next from each start in the first
// slot. Returns matched byte ranges.
fn phrase_group_matches(slots: &[Vec<TermHit>], window: u32) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    'starts: for h0 in &slots[0] {
        let mut cur = *h0;
        let mut bmin = h0.bstart;
        let mut bmax = h0.bend;
        for slot in &slots[1..] {
            match slot.iter().find(|h| h.pos > cur.pos) {
                Some(h) => {
                    cur = *h;
                    bmin = bmin.min(h.bstart);
                    bmax = bmax.max(h.bend);
                }
                None => continue 'starts,
            }
        }
        if cur.pos - h0.pos < window {
            out.push((bmin, bmax));
        }
    }
    out
}

// Any-order group match via a sliding window over the merged positions.
fn near_group_matches(slots: &[Vec<TermHit>], window: u32) -> Vec<(usize, usize)> {
    let k = slots.len();
    let mut merged: Vec<(TermHit, usize)> = Vec::new();
    for (idx, slot) in slots.iter().enumerate() {
        merged.extend(slot.iter().map(|h| (*h, idx)));
    }
    merged.sort_by_key(|(h, _)| h.pos);

    let mut out = Vec::new();
    let mut counts = vec![0usize; k];
    let mut have = 0usize;
    let mut left = 0usize;
    for right in 0..merged.len() {
        let (rh, ridx) = merged[right];
        if counts[ridx] == 0 {
            have += 1;
        }
        counts[ridx] += 1;
        while have == k {
            let (lh, lidx) = merged[left];
            if rh.pos - lh.pos < window {
                let bmin = merged[left..=right].iter().map(|(h, _)| h.bstart).min().unwrap();
                let bmax = merged[left..=right].iter().map(|(h, _)| h.bend).max().unwrap();
                out.push((bmin, bmax));
            }
            counts[lidx] -= 1;
            if counts[lidx] == 0 {
                have -= 1;
            }
            left += 1;
        }
    }
    out
}

// Control characters become spaces, runs of the same punctuation collapse.
fn clean_fragment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_punct: Option<char> = None;
    let mut run = 0usize;
    for c in s.chars() {
        let c = if c.is_control() { ' ' } else { c };
        if !c.is_alphanumeric() && !c.is_whitespace() && Some(c) == last_punct {
            run += 1;
            if run >= 3 {
                continue;
            }
        } else if c.is_alphanumeric() || c.is_whitespace() {
            last_punct = None;
            run = 0;
        } else {
            last_punct = Some(c);
            run = 1;
        }
        out.push(c);
    }
    out
}

// 1-based page for a term position: one past the number of breaks at or
// before it. The break list carries duplicate entries for empty pages.
fn page_number(page_positions: &[u32], pos: u32) -> u32 {
    let n = page_positions.partition_point(|&p| p <= pos);
    1 + n as u32
}
