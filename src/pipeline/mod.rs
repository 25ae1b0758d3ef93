pub mod stopwords;
pub mod synonyms;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::analysis::splitter::TermSink;
use crate::analysis::unaccent::unac_fold;
use crate::pipeline::stopwords::StopList;
use crate::pipeline::synonyms::SynGroups;

/// One link of the term-processor chain between the text splitter and the
/// posting emitter. Links forward to the next one; `flush` drains any
/// buffered state at end of section.
pub trait TermProc {
    fn take(&mut self, term: &str, pos: u32) -> bool;

    fn page(&mut self, pos: u32) -> bool {
        let _ = pos;
        true
    }

    fn flush(&mut self) -> bool {
        true
    }
}

/// Case/diacritic folding, applied when the index strips characters.
pub struct PrepProc<N: TermProc> {
    fold: bool,
    pub next: N,
}

impl<N: TermProc> PrepProc<N> {
    pub fn new(fold: bool, next: N) -> Self {
        PrepProc { fold, next }
    }
}

impl<N: TermProc> TermProc for PrepProc<N> {
    fn take(&mut self, term: &str, pos: u32) -> bool {
        if self.fold {
            self.next.take(&unac_fold(term), pos)
        } else {
            self.next.take(term, pos)
        }
    }

    fn page(&mut self, pos: u32) -> bool {
        self.next.page(pos)
    }

    fn flush(&mut self) -> bool {
        self.next.flush()
    }
}

/// Multi-word synonyms: watches the last few terms, and when a run matches
/// a multi-word group member, also emits the group's canonical form at the
/// run's first position.
pub struct MultiSynProc<N: TermProc> {
    groups: Arc<SynGroups>,
    window: VecDeque<(String, u32)>,
    max_run: usize,
    pub next: N,
}

impl<N: TermProc> MultiSynProc<N> {
    pub fn new(groups: Arc<SynGroups>, next: N) -> Self {
        let max_run = groups.max_multiword_len();
        MultiSynProc { groups, window: VecDeque::new(), max_run, next }
    }
}

impl<N: TermProc> TermProc for MultiSynProc<N> {
    fn take(&mut self, term: &str, pos: u32) -> bool {
        if !self.next.take(term, pos) {
            return false;
        }
        if self.max_run == 0 {
            return true;
        }
        self.window.push_back((term.to_string(), pos));
        while self.window.len() > self.max_run {
            self.window.pop_front();
        }
        for start in 0..self.window.len().saturating_sub(1) {
            let run: Vec<String> =
                self.window.iter().skip(start).map(|(t, _)| t.clone()).collect();
            if let Some(canon) = self.groups.canonical_for_run(&run) {
                // Multi-word canonicals cannot be emitted as one term.
                if !canon.contains(' ') {
                    let first_pos = self.window[start].1;
                    let canon = canon.to_string();
                    if !self.next.take(&canon, first_pos) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn page(&mut self, pos: u32) -> bool {
        self.next.page(pos)
    }

    fn flush(&mut self) -> bool {
        self.window.clear();
        self.next.flush()
    }
}

/// Stop list filter.
pub struct StopProc<N: TermProc> {
    stops: Arc<StopList>,
    pub next: N,
}

impl<N: TermProc> StopProc<N> {
    pub fn new(stops: Arc<StopList>, next: N) -> Self {
        StopProc { stops, next }
    }
}

impl<N: TermProc> TermProc for StopProc<N> {
    fn take(&mut self, term: &str, pos: u32) -> bool {
        if self.stops.is_stop(term) {
            return true;
        }
        self.next.take(term, pos)
    }

    fn page(&mut self, pos: u32) -> bool {
        self.next.page(pos)
    }

    fn flush(&mut self) -> bool {
        self.next.flush()
    }
}

/// Adapter plugging a term-processor chain under the text splitter.
pub struct SplitSink<'a, P: TermProc> {
    pub proc: &'a mut P,
}

impl<'a, P: TermProc> SplitSink<'a, P> {
    pub fn new(proc: &'a mut P) -> Self {
        SplitSink { proc }
    }
}

impl<P: TermProc> TermSink for SplitSink<'_, P> {
    fn take_word(&mut self, term: &str, pos: u32, _bstart: usize, _bend: usize) -> bool {
        self.proc.take(term, pos)
    }

    fn new_page(&mut self, pos: u32) {
        self.proc.page(pos);
    }
}
