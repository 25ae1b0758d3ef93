use bitflags::bitflags;
use log::debug;

use crate::analysis::charclass::{self, CharClass};
use crate::analysis::extcjk::ExternalSplitter;
use crate::analysis::ngram::ngram_run;
use crate::core::config::IndexConfig;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SplitFlags: u32 {
        /// Only return maximum spans (a@b.com, not a, b, com).
        const ONLY_SPANS = 1;
        /// Only return atomic words. Used for position computation during
        /// abstract generation, never for indexing.
        const NO_SPANS = 2;
        /// Treat wildcard characters as letters, for parsing query strings.
        /// Only meaningful together with ONLY_SPANS.
        const KEEP_WILD = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    WordTooLong,
    LongSpanTruncated,
}

/// Receives the splitter output. `take_word` returning false aborts the walk.
pub trait TermSink {
    fn take_word(&mut self, term: &str, pos: u32, bstart: usize, bend: usize) -> bool;

    /// Formfeed seen. Mostly produced by pdf extraction.
    fn new_page(&mut self, _pos: u32) {}

    /// Newline seen.
    fn new_line(&mut self, _pos: u32) {}

    fn discarded(
        &mut self,
        _term: &str,
        _pos: u32,
        _bstart: usize,
        _bend: usize,
        _why: DiscardReason,
    ) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct SplitParams {
    pub no_numbers: bool,
    pub dehyphenate: bool,
    /// Max term size in characters, words beyond it are discarded.
    pub max_word_length: usize,
    /// A span may hold at most this many words, longer content starts a
    /// fresh span.
    pub max_words_in_span: usize,
    pub cjk_ngram_len: usize,
}

impl Default for SplitParams {
    fn default() -> Self {
        SplitParams {
            no_numbers: false,
            dehyphenate: false,
            max_word_length: 40,
            max_words_in_span: 6,
            cjk_ngram_len: 2,
        }
    }
}

impl From<&IndexConfig> for SplitParams {
    fn from(cfg: &IndexConfig) -> Self {
        SplitParams {
            no_numbers: cfg.no_numbers,
            dehyphenate: cfg.dehyphenate,
            max_word_length: cfg.max_word_length,
            max_words_in_span: cfg.max_words_in_span,
            cjk_ngram_len: cfg.cjk_ngram_len,
        }
    }
}

/// Unicode-aware word and span splitter.
///
/// Walks the input code points and builds spans: compound tokens made of
/// several words joined by internal punctuation (jf.dockes@wanadoo.fr,
/// 2024-01-31). On span close each word is emitted at consecutive positions
/// and the span itself at the position of its first word, so that phrase
/// searches find either. Runs of non-splittable scripts are handed to the
/// n-gram splitter or to an external dictionary-based helper.
pub struct TextSplitter {
    flags: SplitFlags,
    params: SplitParams,
    external: Option<ExternalSplitter>,
}

// One kept word inside the current span. `ord` is the word's ordinal within
// the span, counting discarded words, which still consume a position.
#[derive(Debug, Clone, Copy)]
struct SpanWord {
    rel_start: usize, // byte offsets into the span buffer
    rel_end: usize,
    abs_start: usize, // byte offsets into the input
    abs_end: usize,
    ord: usize,
}

struct Walk<'s, S: TermSink> {
    flags: SplitFlags,
    params: &'s SplitParams,
    sink: &'s mut S,

    // Current span buffer. Skip characters and de-hyphenated line breaks are
    // not copied in, so the buffer is not always a byte-for-byte slice of
    // the input.
    span: String,
    span_has_discard: bool,
    all_dot_initials: bool,
    words: Vec<SpanWord>,
    span_ords: usize,

    // Current word state
    word_open: bool,
    word_rel_start: usize,
    word_abs_start: usize,
    word_abs_end: usize,
    word_chars: usize,
    in_number: bool,

    // Glue character seen after a word, kept until the next character tells
    // us whether the span continues ("a.b") or ended at punctuation ("end.").
    pending_glue: Option<char>,

    // Next word position, and position of the current span's first word.
    pos: u32,
    span_pos: u32,

    // Emission dedup
    prev_pos: Option<u32>,
    prev_term: String,

    aborted: bool,
}

impl<'s, S: TermSink> Walk<'s, S> {
    fn new(flags: SplitFlags, params: &'s SplitParams, sink: &'s mut S) -> Self {
        Walk {
            flags,
            params,
            sink,
            span: String::new(),
            span_has_discard: false,
            all_dot_initials: true,
            words: Vec::new(),
            span_ords: 0,
            word_open: false,
            word_rel_start: 0,
            word_abs_start: 0,
            word_abs_end: 0,
            word_chars: 0,
            in_number: false,
            pending_glue: None,
            pos: 0,
            span_pos: 0,
            prev_pos: None,
            prev_term: String::new(),
            aborted: false,
        }
    }

    fn emit(&mut self, term: &str, pos: u32, bstart: usize, bend: usize) -> bool {
        if term.is_empty() {
            return true;
        }
        // Cleanup sometimes ends up producing the same term twice at the
        // same position, coalesce.
        if self.prev_pos == Some(pos) && self.prev_term == term {
            return true;
        }
        self.prev_pos = Some(pos);
        self.prev_term.clear();
        self.prev_term.push_str(term);
        self.sink.take_word(term, pos, bstart, bend)
    }

    fn open_word(&mut self, abs: usize, digit: bool) {
        self.word_open = true;
        self.word_rel_start = self.span.len();
        self.word_abs_start = abs;
        self.word_abs_end = abs;
        self.word_chars = 0;
        self.in_number = digit;
    }

    fn push_char(&mut self, c: char, abs: usize) {
        self.span.push(c);
        self.word_abs_end = abs + c.len_utf8();
        self.word_chars += 1;
    }

    // Close the current word into the span word list.
    fn close_word(&mut self) {
        if !self.word_open {
            return;
        }
        self.word_open = false;
        let rel_end = self.span.len();
        if rel_end == self.word_rel_start {
            return;
        }
        let ord = self.span_ords;
        self.span_ords += 1;
        if self.word_chars > self.params.max_word_length {
            let term = self.span[self.word_rel_start..rel_end].to_string();
            let pos = self.span_pos + ord as u32;
            if !self.sink.discarded(
                &term,
                pos,
                self.word_abs_start,
                self.word_abs_end,
                DiscardReason::WordTooLong,
            ) {
                self.aborted = true;
            }
            self.span_has_discard = true;
            return;
        }
        if self.in_number && self.params.no_numbers {
            let text = &self.span[self.word_rel_start..rel_end];
            if text.chars().all(|c| !c.is_alphabetic()) {
                self.span_has_discard = true;
                return;
            }
        }
        if self.word_chars != 1 {
            self.all_dot_initials = false;
        }
        self.words.push(SpanWord {
            rel_start: self.word_rel_start,
            rel_end,
            abs_start: self.word_abs_start,
            abs_end: self.word_abs_end,
            ord,
        });
    }

    // Emit the span contents: each word, then the enclosing span.
    fn flush_span(&mut self) -> bool {
        self.close_word();
        self.pending_glue = None;
        if self.words.is_empty() {
            self.pos = self.span_pos + self.span_ords as u32;
            self.reset_span();
            return !self.aborted;
        }
        let only_spans = self.flags.contains(SplitFlags::ONLY_SPANS);
        let no_spans = self.flags.contains(SplitFlags::NO_SPANS);
        let nwords = self.words.len();

        if nwords == 1 {
            let w = self.words[0];
            let term = self.span[w.rel_start..w.rel_end].to_string();
            if !self.emit(&term, self.span_pos + w.ord as u32, w.abs_start, w.abs_end) {
                self.aborted = true;
            }
        } else {
            if !only_spans {
                for i in 0..nwords {
                    let w = self.words[i];
                    let term = self.span[w.rel_start..w.rel_end].to_string();
                    if !self.emit(&term, self.span_pos + w.ord as u32, w.abs_start, w.abs_end) {
                        self.aborted = true;
                        break;
                    }
                }
            }
            if !no_spans && !self.aborted && !self.span_has_discard {
                let first = self.words[0];
                let last = self.words[nwords - 1];
                // J.F.D style spans also produce the concatenated initials.
                let term = if self.all_dot_initials {
                    self.words
                        .iter()
                        .map(|w| &self.span[w.rel_start..w.rel_end])
                        .collect::<String>()
                } else {
                    self.span[first.rel_start..last.rel_end].to_string()
                };
                let spos = self.span_pos + first.ord as u32;
                if term.chars().count() > 2 * self.params.max_word_length {
                    if !self.sink.discarded(
                        &term,
                        spos,
                        first.abs_start,
                        last.abs_end,
                        DiscardReason::LongSpanTruncated,
                    ) {
                        self.aborted = true;
                    }
                } else if !self.emit(&term, spos, first.abs_start, last.abs_end) {
                    self.aborted = true;
                }
            }
        }
        self.pos = self.span_pos + self.span_ords as u32;
        self.reset_span();
        !self.aborted
    }

    fn reset_span(&mut self) {
        self.span.clear();
        self.words.clear();
        self.span_ords = 0;
        self.word_open = false;
        self.span_has_discard = false;
        self.all_dot_initials = true;
        self.in_number = false;
        self.span_pos = self.pos;
    }

    // A word character arrives: resolve any held glue, then make sure a word
    // is open. Returns false on abort.
    fn start_word_char(&mut self, abs: usize, digit: bool) -> bool {
        if let Some(g) = self.pending_glue.take() {
            self.close_word();
            if self.span_ords >= self.params.max_words_in_span {
                // Span is full: emit it and start a fresh one here.
                if !self.flush_span() {
                    return false;
                }
            } else {
                if g != '.' {
                    self.all_dot_initials = false;
                }
                self.span.push(g);
            }
            self.open_word(abs, digit);
        } else if !self.word_open {
            self.open_word(abs, digit);
        }
        true
    }

    fn is_word_char(&self, cl: CharClass) -> bool {
        matches!(cl, CharClass::Letter | CharClass::Digit)
            || (cl == CharClass::Wild && self.flags.contains(SplitFlags::KEEP_WILD))
    }
}

impl TextSplitter {
    pub fn new(flags: SplitFlags, params: SplitParams) -> Self {
        TextSplitter { flags, params, external: None }
    }

    /// The configuration used for parsing user query strings: spans kept
    /// whole, wildcard characters preserved.
    pub fn for_query(params: SplitParams) -> Self {
        TextSplitter::new(SplitFlags::ONLY_SPANS | SplitFlags::KEEP_WILD, params)
    }

    /// Use a dictionary-based helper process for Chinese runs instead of
    /// n-grams.
    pub fn with_external(mut self, ext: ExternalSplitter) -> Self {
        self.external = Some(ext);
        self
    }

    pub fn flags(&self) -> SplitFlags {
        self.flags
    }

    /// Split text, emit words and positions into the sink. Returns false if
    /// the sink aborted the walk. State is reset on each call, so unrelated
    /// texts can be processed by the same splitter.
    pub fn text_to_words<S: TermSink>(&mut self, text: &str, sink: &mut S) -> bool {
        let params = self.params.clone();
        let mut w = Walk::new(self.flags, &params, sink);
        let mut it = text.char_indices().peekable();

        while let Some((abs, c)) = it.next() {
            if w.aborted {
                return false;
            }

            if charclass::is_ngrammed(c) {
                if !w.flush_span() {
                    return false;
                }
                // Collect the whole non-splittable run.
                let run_start = abs;
                let mut run_end = abs + c.len_utf8();
                let mut nchars = 1usize;
                while let Some(&(abs2, c2)) = it.peek() {
                    if !charclass::is_ngrammed(c2) {
                        break;
                    }
                    run_end = abs2 + c2.len_utf8();
                    nchars += 1;
                    it.next();
                }
                let run = &text[run_start..run_end];
                let mut handled = false;
                if charclass::is_chinese(c) {
                    if let Some(ext) = self.external.as_mut() {
                        match ext.split(run, run_start, w.pos, &mut *w.sink) {
                            Ok(()) => handled = true,
                            Err(e) => {
                                // Batch dropped, document goes on without
                                // Chinese tokenization.
                                debug!("external splitter failed, batch dropped: {}", e);
                                handled = true;
                            }
                        }
                    }
                }
                if !handled && !ngram_run(run, run_start, w.pos, params.cjk_ngram_len, &mut *w.sink)
                {
                    return false;
                }
                // Each character of the run is a potential phrase position.
                w.pos += nchars as u32;
                w.span_pos = w.pos;
                continue;
            }

            let cl = charclass::classify(c);

            if w.is_word_char(cl) {
                if !w.start_word_char(abs, cl == CharClass::Digit) {
                    return false;
                }
                if cl != CharClass::Digit {
                    w.in_number = false;
                }
                w.push_char(c, abs);
                continue;
            }

            match cl {
                CharClass::Skip => {
                    // Dropped from the term without closing the word.
                    if w.word_open {
                        w.word_abs_end = abs + c.len_utf8();
                    }
                }
                CharClass::Glue => {
                    // Decimal/group separators stay inside a number word.
                    if w.word_open
                        && w.in_number
                        && (c == '.' || c == ',')
                        && it.peek().map(|&(_, n)| n.is_numeric()).unwrap_or(false)
                    {
                        w.push_char(c, abs);
                    } else if w.word_open && w.pending_glue.is_none() {
                        w.pending_glue = Some(c);
                    } else {
                        // Glue with no open word, or a second glue in a row:
                        // the span is over.
                        if !w.flush_span() {
                            return false;
                        }
                    }
                }
                CharClass::Trailing => {
                    // c++, c#: appended to the word itself.
                    if w.word_open && w.pending_glue.is_none() {
                        w.push_char(c, abs);
                        w.in_number = false;
                        w.all_dot_initials = false;
                        // A run of trailing chars ends the word unless a word
                        // character follows immediately.
                        let goes_on = it
                            .peek()
                            .map(|&(_, n)| n == c || w.is_word_char(charclass::classify(n)))
                            .unwrap_or(false);
                        if !goes_on {
                            w.close_word();
                        }
                    } else if !w.flush_span() {
                        return false;
                    }
                }
                CharClass::Space => {
                    if c == '\n' {
                        if params.dehyphenate && w.pending_glue == Some('-') && w.word_open {
                            // word-\nword: drop the hyphen and keep the word
                            // going across the line break.
                            w.pending_glue = None;
                            w.sink.new_line(w.pos);
                            continue;
                        }
                        if !w.flush_span() {
                            return false;
                        }
                        w.sink.new_line(w.pos);
                    } else if c == '\u{0C}' {
                        if !w.flush_span() {
                            return false;
                        }
                        w.sink.new_page(w.pos);
                    } else if !w.flush_span() {
                        return false;
                    }
                }
                _ => {
                    if !w.flush_span() {
                        return false;
                    }
                }
            }
        }
        w.flush_span() && !w.aborted
    }

    /// Count words as the splitter would generate them.
    pub fn count_words(text: &str, flags: SplitFlags) -> usize {
        struct Counter(usize);
        impl TermSink for Counter {
            fn take_word(&mut self, _t: &str, _p: u32, _s: usize, _e: usize) -> bool {
                self.0 += 1;
                true
            }
        }
        let mut counter = Counter(0);
        let mut splitter = TextSplitter::new(flags, SplitParams::default());
        splitter.text_to_words(text, &mut counter);
        counter.0
    }

    /// Check if this is visibly not a single block of text.
    pub fn has_visible_white(text: &str) -> bool {
        text.chars().any(|c| c.is_whitespace())
    }

    /// Split at Unicode whitespace, allowing for double-quoted substrings
    /// with the usual backslash escaping inside. Returns None on an
    /// unbalanced quote.
    pub fn string_to_strings(s: &str) -> Option<Vec<String>> {
        let mut out = Vec::new();
        let mut cur = String::new();
        let mut in_quote = false;
        let mut escaped = false;
        let mut any = false;
        for c in s.chars() {
            if escaped {
                cur.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    if in_quote {
                        // A closing quote always terminates a token, even an
                        // empty one.
                        out.push(std::mem::take(&mut cur));
                        any = false;
                        in_quote = false;
                    } else {
                        if any {
                            out.push(std::mem::take(&mut cur));
                            any = false;
                        }
                        in_quote = true;
                        cur.clear();
                    }
                }
                c if c.is_whitespace() && !in_quote => {
                    if any {
                        out.push(std::mem::take(&mut cur));
                        any = false;
                    }
                }
                c => {
                    cur.push(c);
                    any = true;
                }
            }
        }
        if in_quote || escaped {
            return None;
        }
        if any {
            out.push(cur);
        }
        Some(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Collects (term, pos) pairs plus byte ranges.
    pub(crate) struct Collect {
        pub words: Vec<(String, u32)>,
        pub ranges: Vec<(usize, usize)>,
        pub pages: Vec<u32>,
    }

    impl Collect {
        pub fn new() -> Self {
            Collect { words: Vec::new(), ranges: Vec::new(), pages: Vec::new() }
        }
        pub fn terms(&self) -> Vec<&str> {
            self.words.iter().map(|(t, _)| t.as_str()).collect()
        }
    }

    impl TermSink for Collect {
        fn take_word(&mut self, term: &str, pos: u32, bstart: usize, bend: usize) -> bool {
            self.words.push((term.to_string(), pos));
            self.ranges.push((bstart, bend));
            true
        }
        fn new_page(&mut self, pos: u32) {
            self.pages.push(pos);
        }
    }

    pub(crate) fn split(text: &str, flags: SplitFlags) -> Collect {
        let mut c = Collect::new();
        let mut sp = TextSplitter::new(flags, SplitParams::default());
        assert!(sp.text_to_words(text, &mut c));
        c
    }

    #[test]
    fn test_simple_words() {
        let c = split("pride and prejudice", SplitFlags::empty());
        assert_eq!(c.words, vec![
            ("pride".to_string(), 0),
            ("and".to_string(), 1),
            ("prejudice".to_string(), 2),
        ]);
    }

    #[test]
    fn test_span_and_words() {
        let c = split("bill@some.com rocks", SplitFlags::empty());
        assert_eq!(c.words, vec![
            ("bill".to_string(), 0),
            ("some".to_string(), 1),
            ("com".to_string(), 2),
            ("bill@some.com".to_string(), 0),
            ("rocks".to_string(), 3),
        ]);
    }

    #[test]
    fn test_only_spans() {
        let c = split("bill@some.com rocks", SplitFlags::ONLY_SPANS);
        assert_eq!(c.terms(), vec!["bill@some.com", "rocks"]);
    }

    #[test]
    fn test_no_spans() {
        let c = split("bill@some.com rocks", SplitFlags::NO_SPANS);
        assert_eq!(c.terms(), vec!["bill", "some", "com", "rocks"]);
    }

    #[test]
    fn test_trailing_punctuation_not_glued() {
        let c = split("the end. next", SplitFlags::empty());
        assert_eq!(c.words, vec![
            ("the".to_string(), 0),
            ("end".to_string(), 1),
            ("next".to_string(), 2),
        ]);
    }

    #[test]
    fn test_numbers() {
        let c = split("pi is 3.14 ok", SplitFlags::empty());
        assert!(c.terms().contains(&"3.14"));
        let c = split("date 2024-01-31 here", SplitFlags::empty());
        assert_eq!(c.terms(), vec!["date", "2024", "01", "31", "2024-01-31", "here"]);
    }

    #[test]
    fn test_no_numbers() {
        let params = SplitParams { no_numbers: true, ..SplitParams::default() };
        let mut sp = TextSplitter::new(SplitFlags::empty(), params);
        let mut c = Collect::new();
        assert!(sp.text_to_words("version 42 of x11", &mut c));
        assert_eq!(c.terms(), vec!["version", "of", "x11"]);
    }

    #[test]
    fn test_cplusplus() {
        let c = split("we use c++ and c# daily", SplitFlags::empty());
        assert!(c.terms().contains(&"c++"));
        assert!(c.terms().contains(&"c#"));
    }

    #[test]
    fn test_initials() {
        let c = split("J.F.D wrote", SplitFlags::empty());
        assert!(c.terms().contains(&"JFD"));
    }

    #[test]
    fn test_keep_wild() {
        let c = split("doc*", SplitFlags::ONLY_SPANS | SplitFlags::KEEP_WILD);
        assert_eq!(c.terms(), vec!["doc*"]);
        // Without the flag the wildcard is a separator.
        let c = split("doc*", SplitFlags::ONLY_SPANS);
        assert_eq!(c.terms(), vec!["doc"]);
    }

    #[test]
    fn test_max_words_in_span() {
        // 8 dotted words, limit 6: two spans.
        let c = split("a1.b2.c3.d4.e5.f6.g7.h8", SplitFlags::ONLY_SPANS);
        assert_eq!(c.terms(), vec!["a1.b2.c3.d4.e5.f6", "g7.h8"]);
    }

    #[test]
    fn test_word_too_long_discarded() {
        let long = "x".repeat(50);
        let text = format!("ok {} fine", long);
        let c = split(&text, SplitFlags::empty());
        assert_eq!(c.terms(), vec!["ok", "fine"]);
        // The discarded word still consumed a position.
        assert_eq!(c.words[1].1, 2);
    }

    #[test]
    fn test_page_break() {
        let c = split("one\u{0C}two", SplitFlags::empty());
        assert_eq!(c.terms(), vec!["one", "two"]);
        assert_eq!(c.pages, vec![1]);
    }

    #[test]
    fn test_dehyphenate() {
        let params = SplitParams { dehyphenate: true, ..SplitParams::default() };
        let mut sp = TextSplitter::new(SplitFlags::empty(), params);
        let mut c = Collect::new();
        assert!(sp.text_to_words("hyphen-\nated text", &mut c));
        assert_eq!(c.terms(), vec!["hyphenated", "text"]);
        // Off by default: the hyphenated halves stay separate words.
        let c = split("hyphen-\nated text", SplitFlags::empty());
        assert_eq!(c.terms(), vec!["hyphen", "ated", "text"]);
    }

    #[test]
    fn test_cjk_ngrams() {
        let c = split("中文分词 test", SplitFlags::empty());
        assert_eq!(c.words, vec![
            ("中文".to_string(), 0),
            ("文分".to_string(), 1),
            ("分词".to_string(), 2),
            ("test".to_string(), 4),
        ]);
    }

    #[test]
    fn test_span_reconstruction() {
        // Words-only byte ranges, joined with the separators between them,
        // rebuild the input.
        let text = "jf.dockes@wanadoo.fr, x-23 end";
        let c = split(text, SplitFlags::NO_SPANS);
        let mut rebuilt = String::new();
        let mut prev_end = 0;
        for &(s, e) in &c.ranges {
            rebuilt.push_str(&text[prev_end..s]);
            rebuilt.push_str(&text[s..e]);
            prev_end = e;
        }
        rebuilt.push_str(&text[prev_end..]);
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_abort_propagates() {
        struct Stop;
        impl TermSink for Stop {
            fn take_word(&mut self, _t: &str, _p: u32, _s: usize, _e: usize) -> bool {
                false
            }
        }
        let mut sp = TextSplitter::new(SplitFlags::empty(), SplitParams::default());
        assert!(!sp.text_to_words("any text", &mut Stop));
    }

    #[test]
    fn test_string_to_strings() {
        assert_eq!(
            TextSplitter::string_to_strings(r#"a "quoted phrase" b"#).unwrap(),
            vec!["a", "quoted phrase", "b"]
        );
        assert!(TextSplitter::string_to_strings(r#"un "balanced"#).is_none());
        assert_eq!(
            TextSplitter::string_to_strings(r#""esc \" ape""#).unwrap(),
            vec![r#"esc " ape"#]
        );
    }

    #[test]
    fn test_count_words() {
        assert_eq!(TextSplitter::count_words("a@b.c plus one", SplitFlags::ONLY_SPANS), 3);
        assert!(TextSplitter::has_visible_white("two words"));
        assert!(!TextSplitter::has_visible_white("single"));
    }
}
