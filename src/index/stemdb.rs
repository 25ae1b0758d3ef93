use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use rayon::prelude::*;
use rust_stemmers::{Algorithm, Stemmer};

use crate::core::error::Result;
use crate::store::Store;

/// Store metadata key prefix for the per-language expansion maps.
pub const STEMDB_KEY_PREFIX: &str = "stemdb:";

pub fn algorithm_for(lang: &str) -> Option<Algorithm> {
    let alg = match lang.to_lowercase().as_str() {
        "arabic" => Algorithm::Arabic,
        "danish" => Algorithm::Danish,
        "dutch" => Algorithm::Dutch,
        "english" => Algorithm::English,
        "finnish" => Algorithm::Finnish,
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "greek" => Algorithm::Greek,
        "hungarian" => Algorithm::Hungarian,
        "italian" => Algorithm::Italian,
        "norwegian" => Algorithm::Norwegian,
        "portuguese" => Algorithm::Portuguese,
        "romanian" => Algorithm::Romanian,
        "russian" => Algorithm::Russian,
        "spanish" => Algorithm::Spanish,
        "swedish" => Algorithm::Swedish,
        "tamil" => Algorithm::Tamil,
        "turkish" => Algorithm::Turkish,
        _ => return None,
    };
    Some(alg)
}

// Prefixed terms never enter the stem maps: under the stripping convention
// they start with an ASCII uppercase run, under the raw one with a colon.
fn is_plain_term(term: &str) -> bool {
    match term.chars().next() {
        Some(c) => !c.is_ascii_uppercase() && c != ':',
        None => false,
    }
}

/// Rebuild the stem → {terms} expansion maps for the configured languages
/// and drop the maps of languages no longer configured. Called after the
/// main index commit; map construction is per-language parallel, the store
/// writes are serialized.
pub fn build_stem_dbs(store: &mut Store, languages: &[String]) -> Result<()> {
    let terms: Vec<String> = store
        .all_terms()
        .filter(|t| is_plain_term(t))
        .map(|t| t.to_string())
        .collect();

    let built: Vec<(String, Vec<u8>)> = languages
        .par_iter()
        .filter_map(|lang| {
            let alg = algorithm_for(lang)?;
            let stemmer = Stemmer::create(alg);
            let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for term in &terms {
                let stem = stemmer.stem(term).to_string();
                map.entry(stem).or_default().push(term.clone());
            }
            // Groups reduced to the identity add nothing to expansion.
            map.retain(|stem, group| group.len() > 1 || group[0] != *stem);
            debug!("stem db {}: {} groups", lang, map.len());
            let bytes = bincode::serialize(&map).ok()?;
            Some((lang.clone(), bytes))
        })
        .collect();

    for key in store.metadata_keys(STEMDB_KEY_PREFIX) {
        let lang = &key[STEMDB_KEY_PREFIX.len()..];
        if !languages.iter().any(|l| l == lang) {
            info!("dropping stale stem db for {}", lang);
            store.set_metadata(&key, Vec::new());
        }
    }
    for (lang, bytes) in built {
        store.set_metadata(&format!("{}{}", STEMDB_KEY_PREFIX, lang), bytes);
    }
    Ok(())
}

/// One language's expansion map, loaded from store metadata.
pub struct StemDb {
    stemmer: Stemmer,
    map: HashMap<String, Vec<String>>,
}

impl StemDb {
    pub fn load(store: &Store, lang: &str) -> Option<StemDb> {
        let alg = algorithm_for(lang)?;
        let bytes = store.get_metadata(&format!("{}{}", STEMDB_KEY_PREFIX, lang))?;
        let map: HashMap<String, Vec<String>> = bincode::deserialize(bytes).ok()?;
        Some(StemDb { stemmer: Stemmer::create(alg), map })
    }

    /// Index terms sharing the stem of `term`, excluding `term` itself.
    pub fn expand(&self, term: &str) -> Vec<String> {
        let stem = self.stemmer.stem(term).to_string();
        match self.map.get(&stem) {
            Some(group) => group.iter().filter(|t| t.as_str() != term).cloned().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::StoreDocument;

    #[test]
    fn test_build_and_expand() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        let mut doc = StoreDocument::new();
        for (i, w) in ["running", "runs", "runner", "Sprefixed"].iter().enumerate() {
            doc.add_posting(w, 100000 + i as u32, 1);
        }
        store.replace_document("Qx", doc).unwrap();
        build_stem_dbs(&mut store, &["english".to_string()]).unwrap();

        let db = StemDb::load(&store, "english").expect("stem db present");
        let exp = db.expand("running");
        assert!(exp.contains(&"runs".to_string()));
        assert!(!exp.contains(&"running".to_string()));
        // Prefixed terms are kept out of the maps.
        assert!(!exp.iter().any(|t| t.starts_with('S')));
    }

    #[test]
    fn test_stale_language_dropped() {
        let mut store = Store::create("/nonexistent-unused").unwrap();
        let mut doc = StoreDocument::new();
        doc.add_posting("walking", 100000, 1);
        store.replace_document("Qx", doc).unwrap();
        build_stem_dbs(&mut store, &["english".to_string(), "french".to_string()]).unwrap();
        assert_eq!(store.metadata_keys(STEMDB_KEY_PREFIX).len(), 2);
        build_stem_dbs(&mut store, &["english".to_string()]).unwrap();
        assert_eq!(store.metadata_keys(STEMDB_KEY_PREFIX), vec!["stemdb:english"]);
    }

    #[test]
    fn test_unknown_language_ignored() {
        assert!(algorithm_for("klingon").is_none());
    }
}
