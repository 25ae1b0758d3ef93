use fst::automaton::{Automaton, Str};
use fst::{IntoStreamer, Streamer};
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, SINK_STATE};

use crate::analysis::unaccent::unac_fold;
use crate::core::error::Result;

/// Committed term dictionary, rebuilt from the live postings map on each
/// commit. Backs prefix, wildcard, spelling and case/diacritic expansion.
///
/// For raw (non-stripping) indexes a second set maps folded forms back to
/// the raw terms: entries are `folded\0raw`, so a prefix scan on
/// `folded\0` enumerates every raw variant.
#[derive(Debug)]
pub struct Dictionary {
    terms: fst::Set<Vec<u8>>,
    folded: Option<fst::Set<Vec<u8>>>,
}

impl Dictionary {
    /// `terms` must be sorted, which iterating a BTreeMap guarantees.
    pub fn build<'a, I>(terms: I, with_folded: bool) -> Result<Self>
    where
        I: Iterator<Item = &'a str> + Clone,
    {
        let set = fst::Set::from_iter(terms.clone().map(|t| t.as_bytes().to_vec()))?;
        let folded = if with_folded {
            let mut pairs: Vec<Vec<u8>> = terms
                .map(|t| {
                    let mut k = unac_fold(t).into_bytes();
                    k.push(0);
                    k.extend_from_slice(t.as_bytes());
                    k
                })
                .collect();
            pairs.sort();
            pairs.dedup();
            Some(fst::Set::from_iter(pairs.into_iter())?)
        } else {
            None
        };
        Ok(Dictionary { terms: set, folded })
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms starting with `prefix`, up to `limit`. A limit of 0 means no
    /// bound.
    pub fn prefix_match(&self, prefix: &str, limit: usize) -> Vec<String> {
        let aut = Str::new(prefix).starts_with();
        self.collect(self.terms.search(aut).into_stream(), limit)
    }

    /// Terms matching a shell-style pattern (`*`, `?`, `[...]`). The fixed
    /// prefix before the first wildcard bounds the scan.
    pub fn wildcard_match(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let fixed: String = pattern
            .chars()
            .take_while(|c| !matches!(c, '*' | '?' | '['))
            .collect();
        let re = regex::Regex::new(&wildcard_to_regex(pattern))
            .map_err(|e| crate::core::error::Error::new(
                crate::core::error::ErrorKind::InvalidInput,
                format!("bad wildcard pattern: {}", e),
            ))?;
        let aut = Str::new(&fixed).starts_with();
        let mut out = Vec::new();
        let mut stream = self.terms.search(aut).into_stream();
        while let Some(key) = stream.next() {
            if let Ok(term) = std::str::from_utf8(key) {
                if re.is_match(term) {
                    out.push(term.to_string());
                    if limit != 0 && out.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Terms within `distance` edits, for spelling correction.
    pub fn levenshtein_match(&self, term: &str, distance: u8, limit: usize) -> Vec<String> {
        let dfa = LevenshteinAutomatonBuilder::new(distance, true).build_dfa(term);
        let aut = DfaAutomaton(&dfa);
        self.collect(self.terms.search(aut).into_stream(), limit)
    }

    /// Raw-index expansion: all raw terms whose folded form equals `folded`.
    pub fn fold_expand(&self, folded: &str, limit: usize) -> Vec<String> {
        let Some(fset) = &self.folded else {
            return Vec::new();
        };
        let mut prefix = folded.as_bytes().to_vec();
        prefix.push(0);
        let mut out = Vec::new();
        let mut stream = fset.range().ge(prefix.clone()).into_stream();
        while let Some(key) = stream.next() {
            if !key.starts_with(&prefix) {
                break;
            }
            if let Ok(raw) = std::str::from_utf8(&key[prefix.len()..]) {
                out.push(raw.to_string());
                if limit != 0 && out.len() >= limit {
                    break;
                }
            }
        }
        out
    }

    fn collect(&self, mut stream: impl for<'a> Streamer<'a, Item = &'a [u8]>, limit: usize) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(key) = stream.next() {
            if let Ok(term) = std::str::from_utf8(key) {
                out.push(term.to_string());
                if limit != 0 && out.len() >= limit {
                    break;
                }
            }
        }
        out
    }
}

/// Translate a shell-style pattern to an anchored regex, escaping everything
/// regex-significant except the wildcard constructs themselves.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                // Character class passed through as-is up to the closing
                // bracket.
                re.push('[');
                for c2 in chars.by_ref() {
                    re.push(c2);
                    if c2 == ']' {
                        break;
                    }
                }
            }
            c if "\\.+()|^$#&-~{}".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push('$');
    re
}

/// Glue between the levenshtein DFA and fst set traversal.
struct DfaAutomaton<'a>(&'a levenshtein_automata::DFA);

impl Automaton for DfaAutomaton<'_> {
    type State = u32;

    fn start(&self) -> u32 {
        self.0.initial_state()
    }

    fn is_match(&self, state: &u32) -> bool {
        matches!(self.0.distance(*state), Distance::Exact(_))
    }

    fn can_match(&self, state: &u32) -> bool {
        *state != SINK_STATE
    }

    fn accept(&self, state: &u32, byte: u8) -> u32 {
        self.0.transition(*state, byte)
    }
}
