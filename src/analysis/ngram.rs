use crate::analysis::splitter::TermSink;

/// Emit n-grams for a run of non-splittable script text. Each character
/// starts one potential phrase position, so consecutive n-grams get
/// consecutive positions and phrase matching works across the run.
pub fn ngram_run<S: TermSink>(
    run: &str,
    byte_base: usize,
    pos_base: u32,
    n: usize,
    sink: &mut S,
) -> bool {
    let offs: Vec<usize> = run.char_indices().map(|(i, _)| i).collect();
    let nchars = offs.len();
    if nchars == 0 {
        return true;
    }
    let end_of = |i: usize| if i < nchars { offs[i] } else { run.len() };

    if nchars < n {
        let bstart = byte_base;
        let bend = byte_base + run.len();
        return sink.take_word(run, pos_base, bstart, bend);
    }
    for i in 0..=(nchars - n) {
        let bstart = offs[i];
        let bend = end_of(i + n);
        let term = &run[bstart..bend];
        if !sink.take_word(term, pos_base + i as u32, byte_base + bstart, byte_base + bend) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Vec<(String, u32)>);
    impl TermSink for Collect {
        fn take_word(&mut self, term: &str, pos: u32, _s: usize, _e: usize) -> bool {
            self.0.push((term.to_string(), pos));
            true
        }
    }

    #[test]
    fn test_bigrams() {
        let mut c = Collect(Vec::new());
        assert!(ngram_run("中文分词", 0, 10, 2, &mut c));
        assert_eq!(c.0, vec![
            ("中文".to_string(), 10),
            ("文分".to_string(), 11),
            ("分词".to_string(), 12),
        ]);
    }

    #[test]
    fn test_short_run() {
        let mut c = Collect(Vec::new());
        assert!(ngram_run("中", 0, 0, 2, &mut c));
        assert_eq!(c.0, vec![("中".to_string(), 0)]);
    }
}
