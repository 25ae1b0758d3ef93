use log::debug;

use crate::analysis::unaccent::{fold_case, has_diacritics, has_inner_uppercase, strip_diacritics, unac_fold};
use crate::core::config::IndexConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::stemdb::StemDb;
use crate::pipeline::synonyms::SynGroups;
use crate::query::searchdata::Modifiers;
use crate::store::Store;

/// Outcome of expanding one user term against the index.
#[derive(Debug, Default)]
pub struct Expansion {
    /// Index terms for the query, field prefix included.
    pub terms: Vec<String>,
    /// The same terms without the prefix, for highlighting.
    pub unprefixed: Vec<String>,
    /// The original term itself when present, eligible for a weight boost.
    pub original: Option<String>,
    /// Multi-word synonym alternatives, to be OR-ed in as phrases.
    pub multiword_syns: Vec<Vec<String>>,
    /// Terms that came from spelling correction.
    pub spelled: Vec<String>,
}

/// Expands user terms: case/diacritic handling, stem, wildcard, synonym and
/// spelling expansion, with the soft and hard caps applied.
pub struct Expander<'a> {
    pub store: &'a mut Store,
    pub config: &'a IndexConfig,
    pub syngroups: &'a SynGroups,
    pub stemdbs: &'a [StemDb],
    /// UI-requested cap, quietly truncating. 0 means none.
    pub soft_max: usize,
}

pub fn has_wildcards(term: &str) -> bool {
    term.chars().any(|c| matches!(c, '*' | '?' | '['))
}

impl Expander<'_> {
    /// `field_prefix` is the already-wrapped prefix, empty for body text.
    pub fn expand(
        &mut self,
        user_term: &str,
        field_prefix: &str,
        mods: Modifiers,
    ) -> Result<Expansion> {
        let cfg = self.config;
        let hard_cap = cfg.max_term_expand;

        // Sensitivity: explicit modifiers, else derived from the term
        // itself. Either one disables stem expansion.
        let case_sens = mods.contains(Modifiers::CASESENS)
            || (cfg.auto_case_sens && has_inner_uppercase(user_term));
        let diac_sens = mods.contains(Modifiers::DIACSENS)
            || (cfg.auto_diac_sens && has_diacritics(user_term));

        let folded = unac_fold(user_term);

        if has_wildcards(user_term) && !mods.contains(Modifiers::NOWILDEXP) {
            return self.expand_wildcard(user_term, &folded, field_prefix, hard_cap);
        }

        let mut unprefixed: Vec<String> = Vec::new();

        if cfg.strip_chars {
            // Everything in the index is folded; sensitivity cannot be
            // honored and is ignored.
            unprefixed.push(folded.clone());
        } else if case_sens && diac_sens {
            unprefixed.push(user_term.to_string());
        } else {
            // Enumerate raw variants through the folded dictionary, then
            // filter by whichever sensitivity is requested.
            let target = unac_fold(&format!("{}{}", field_prefix, user_term));
            let mut variants = self.store.dict()?.fold_expand(&target, hard_cap + 1);
            if field_prefix.is_empty() && variants.is_empty() {
                variants.push(user_term.to_string());
            }
            for v in variants {
                let v = v.strip_prefix(field_prefix).unwrap_or(&v).to_string();
                if case_sens && strip_diacritics(&v) != strip_diacritics(user_term) {
                    continue;
                }
                if diac_sens && fold_case(&v) != fold_case(user_term) {
                    continue;
                }
                unprefixed.push(v);
            }
            if unprefixed.is_empty() {
                unprefixed.push(user_term.to_string());
            }
        }

        let can_stem = !mods.contains(Modifiers::NOSTEMMING)
            && !case_sens
            && !diac_sens
            && !folded.chars().any(crate::analysis::charclass::no_stemming);
        if can_stem {
            for db in self.stemdbs {
                for t in db.expand(&folded) {
                    unprefixed.push(t);
                }
            }
        }

        let mut expansion = Expansion::default();

        if !mods.contains(Modifiers::NOSYNS) {
            for syn in self.syngroups.expand(&folded) {
                if syn.contains(' ') {
                    expansion
                        .multiword_syns
                        .push(syn.split_whitespace().map(|s| s.to_string()).collect());
                } else {
                    unprefixed.push(syn);
                }
            }
        }

        if !cfg.no_aspell && !case_sens && !diac_sens {
            self.spell_expand(&folded, &mut unprefixed, &mut expansion.spelled);
        }

        unprefixed.sort();
        unprefixed.dedup();

        if unprefixed.len() > hard_cap {
            return Err(expansion_overflow(user_term));
        }
        if self.soft_max != 0 && unprefixed.len() > self.soft_max {
            unprefixed.truncate(self.soft_max);
        }

        expansion.terms = unprefixed
            .iter()
            .map(|t| format!("{}{}", field_prefix, t))
            .collect();
        let original_unprefixed = if self.config.strip_chars { &folded } else { user_term };
        if unprefixed.iter().any(|t| t == original_unprefixed) {
            expansion.original = Some(format!("{}{}", field_prefix, original_unprefixed));
        }
        expansion.unprefixed = unprefixed;
        Ok(expansion)
    }

    fn expand_wildcard(
        &mut self,
        user_term: &str,
        folded: &str,
        field_prefix: &str,
        hard_cap: usize,
    ) -> Result<Expansion> {
        let pattern = if self.config.strip_chars {
            format!("{}{}", field_prefix, folded)
        } else {
            format!("{}{}", field_prefix, user_term)
        };
        // Ask for one more than the cap: exactly at the cap succeeds, one
        // past it overflows.
        let matched = self.store.dict()?.wildcard_match(&pattern, hard_cap + 1)?;
        if matched.len() > hard_cap {
            return Err(expansion_overflow(user_term));
        }
        debug!("wildcard {} -> {} terms", pattern, matched.len());
        let mut matched = matched;
        if self.soft_max != 0 && matched.len() > self.soft_max {
            matched.truncate(self.soft_max);
        }
        let unprefixed: Vec<String> = matched
            .iter()
            .map(|t| t.strip_prefix(field_prefix).unwrap_or(t).to_string())
            .collect();
        Ok(Expansion {
            terms: matched,
            unprefixed,
            original: None,
            multiword_syns: Vec::new(),
            spelled: Vec::new(),
        })
    }

    // Dictionary-resident spelling correction: for rare terms, pick close
    // neighbors that are clearly more frequent.
    fn spell_expand(&mut self, folded: &str, out: &mut Vec<String>, spelled: &mut Vec<String>) {
        let cfg = self.config;
        let df = self.store.term_freq(folded);
        if df >= cfg.auto_spell_rarity_threshold {
            return;
        }
        let distance = if folded.chars().count() > 6 { 2 } else { 1 };
        let candidates = match self.store.dict() {
            Ok(d) => d.levenshtein_match(folded, distance, 100),
            Err(_) => return,
        };
        let floor = cfg.auto_spell_selection_threshold * df.max(1);
        for cand in candidates {
            if cand == folded {
                continue;
            }
            if self.store.term_freq(&cand) >= floor {
                debug!("spell expansion {} -> {}", folded, cand);
                out.push(cand.clone());
                spelled.push(cand);
            }
        }
    }
}

fn expansion_overflow(term: &str) -> Error {
    Error::new(
        ErrorKind::QueryExpansionOverflow,
        format!(
            "too many index terms match '{}'; try a longer prefix, or case/diacritic \
             sensitivity to restrict matching",
            term
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::StoreDocument;
    use std::sync::Arc;

    fn seed_store(terms: &[&str], folded_dict: bool) -> Store {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        store.set_folded_dict(folded_dict);
        let mut doc = StoreDocument::new();
        for (i, t) in terms.iter().enumerate() {
            doc.add_posting(t, 100000 + i as u32, 1);
        }
        store.replace_document("Qseed", doc).unwrap();
        store
    }

    fn config() -> IndexConfig {
        IndexConfig { no_aspell: true, ..IndexConfig::default() }
    }

    #[test]
    fn test_wildcard_expansion() {
        let mut store = seed_store(&["search", "seam", "sell"], false);
        let cfg = config();
        let sg = SynGroups::new();
        let mut ex = Expander {
            store: &mut store,
            config: &cfg,
            syngroups: &sg,
            stemdbs: &[],
            soft_max: 0,
        };
        let e = ex.expand("sea*", "", Modifiers::default()).unwrap();
        assert_eq!(e.terms, vec!["seam", "search"]);
        assert!(e.original.is_none());
    }

    #[test]
    fn test_hard_cap_boundary() {
        let mut store = seed_store(&["t1", "t2", "t3"], false);
        let cfg = IndexConfig { max_term_expand: 3, no_aspell: true, ..IndexConfig::default() };
        let sg = SynGroups::new();
        let mut ex = Expander {
            store: &mut store,
            config: &cfg,
            syngroups: &sg,
            stemdbs: &[],
            soft_max: 0,
        };
        // Exactly at the cap: fine.
        assert_eq!(ex.expand("t*", "", Modifiers::default()).unwrap().terms.len(), 3);
        // One more term: overflow.
        let mut doc = StoreDocument::new();
        doc.add_posting("t4", 100000, 1);
        ex.store.replace_document("Qmore", doc).unwrap();
        let err = ex.expand("t*", "", Modifiers::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueryExpansionOverflow);
    }

    #[test]
    fn test_synonym_expansion() {
        let mut store = seed_store(&["car", "automobile"], false);
        let cfg = config();
        let mut sg = SynGroups::new();
        sg.add_group(vec!["car".into(), "automobile".into(), "motor vehicle".into()]);
        let mut ex = Expander {
            store: &mut store,
            config: &cfg,
            syngroups: &sg,
            stemdbs: &[],
            soft_max: 0,
        };
        let e = ex.expand("car", "", Modifiers::default()).unwrap();
        assert!(e.terms.contains(&"automobile".to_string()));
        assert_eq!(e.multiword_syns, vec![vec!["motor".to_string(), "vehicle".to_string()]]);
        assert_eq!(e.original.as_deref(), Some("car"));
        // NOSYNS turns it off.
        let e = ex.expand("car", "", Modifiers::NOSYNS).unwrap();
        assert!(!e.terms.contains(&"automobile".to_string()));
    }

    #[test]
    fn test_spelling_correction() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        // "search" appears in many docs, the typo in none.
        for i in 0..20 {
            let mut doc = StoreDocument::new();
            doc.add_posting("search", 100000, 1);
            store.replace_document(&format!("Qd{}", i), doc).unwrap();
        }
        let cfg = IndexConfig {
            auto_spell_rarity_threshold: 5,
            auto_spell_selection_threshold: 2,
            ..IndexConfig::default()
        };
        let sg = SynGroups::new();
        let mut ex = Expander {
            store: &mut store,
            config: &cfg,
            syngroups: &sg,
            stemdbs: &[],
            soft_max: 0,
        };
        let e = ex.expand("serch", "", Modifiers::default()).unwrap();
        assert!(e.terms.contains(&"search".to_string()));
        assert_eq!(e.spelled, vec!["search"]);
    }

    #[test]
    fn test_raw_index_diacritics() {
        let mut store = seed_store(&["café", "cafe"], true);
        let cfg = IndexConfig {
            strip_chars: false,
            auto_diac_sens: true,
            no_aspell: true,
            ..IndexConfig::default()
        };
        let sg = SynGroups::new();
        let mut ex = Expander {
            store: &mut store,
            config: &cfg,
            syngroups: &sg,
            stemdbs: &[],
            soft_max: 0,
        };
        // Accented query term: diacritic sensitive, matches the accented
        // form only.
        let e = ex.expand("café", "", Modifiers::default()).unwrap();
        assert_eq!(e.terms, vec!["café"]);
        // Unaccented: insensitive, matches both raw variants.
        let e = ex.expand("cafe", "", Modifiers::default()).unwrap();
        assert!(e.terms.contains(&"café".to_string()));
        assert!(e.terms.contains(&"cafe".to_string()));
    }
}
