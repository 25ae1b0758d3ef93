/// Index-wide tuning values. The configuration file reader lives outside the
/// engine; callers fill this in and hand it to `Db::create` / `Db::open`.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    // Flushing and disk safety
    pub idx_flush_mb: usize,            // commit after this many MB of raw text
    pub max_fs_occup_pc: u32,           // abort indexing above this fs fill percentage, 0 = off
    // Data record
    pub idx_meta_stored_len: usize,     // cap on each stored metadata value
    pub idx_text_truncate_len: usize,   // cap on synthetic abstracts taken from body text
    pub abstract_min_len: usize,        // shorter filter-provided abstracts are replaced
    // Query expansion
    pub max_term_expand: usize,         // hard cap, exceeding aborts the query
    pub max_store_clauses: usize,       // cap on generated query tree leaves
    pub auto_case_sens: bool,           // non-initial uppercase makes a term case sensitive
    pub auto_diac_sens: bool,           // any diacritic makes a term diacritic sensitive
    pub auto_phrase: bool,              // AND_MAYBE an automatic phrase for ranking
    pub auto_phrase_term_freq_pc: u32,  // terms above this df percentage stay out of it
    // Spelling correction
    pub no_aspell: bool,
    pub auto_spell_rarity_threshold: u64,    // only terms rarer than this get corrected
    pub auto_spell_selection_threshold: u64, // candidate df must exceed term df by this factor
    // Index-wide properties fixed at creation
    pub store_text: bool,               // keep compressed raw text in the store
    pub strip_chars: bool,              // fold case/diacritics for all terms
    pub stemming_languages: Vec<String>,
    // Indexing behavior
    pub no_retry_failed: bool,          // don't reindex docs whose last attempt failed
    // Splitter
    pub no_numbers: bool,
    pub dehyphenate: bool,
    pub max_word_length: usize,
    pub max_words_in_span: usize,
    pub cjk_ngram_len: usize,
    pub cjk_tagger: Option<String>,     // external splitter command, None = ngrams
    // Scheduler
    pub split_workers: usize,
    pub queue_depth: usize,
    pub shard_writers: usize,           // 0 = single writer, no temp shards
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            idx_flush_mb: 10,
            max_fs_occup_pc: 98,
            idx_meta_stored_len: 150,
            idx_text_truncate_len: 250,
            abstract_min_len: 10,
            max_term_expand: 10000,
            max_store_clauses: 50000,
            auto_case_sens: true,
            auto_diac_sens: false,
            auto_phrase: true,
            auto_phrase_term_freq_pc: 2,
            no_aspell: false,
            auto_spell_rarity_threshold: 1000,
            auto_spell_selection_threshold: 10,
            store_text: true,
            strip_chars: true,
            stemming_languages: vec!["english".to_string()],
            no_retry_failed: false,
            no_numbers: false,
            dehyphenate: false,
            max_word_length: 40,
            max_words_in_span: 6,
            cjk_ngram_len: 2,
            cjk_tagger: None,
            split_workers: 0,           // 0 = number of cpus
            queue_depth: 100,
            shard_writers: 0,
        }
    }
}

impl IndexConfig {
    pub fn effective_split_workers(&self) -> usize {
        if self.split_workers != 0 {
            self.split_workers
        } else {
            num_cpus::get().max(1)
        }
    }
}
