use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Strip diacritics: NFKD decomposition with combining marks removed. The
/// result is not recomposed, so applying the function twice is a no-op.
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Case folding only.
pub fn fold_case(s: &str) -> String {
    s.chars().flat_map(|c| c.to_lowercase()).collect()
}

/// Combined fold used for all terms when the index strips characters:
/// diacritics removed, then lowercased.
pub fn unac_fold(s: &str) -> String {
    fold_case(&strip_diacritics(s))
}

/// True if stripping diacritics would change the string. Used by the query
/// translator to auto-detect diacritic sensitivity.
pub fn has_diacritics(s: &str) -> bool {
    s.nfkd().any(is_combining_mark)
}

/// True if the term contains an uppercase letter after the first character.
/// Used to auto-detect case sensitivity ("US" stays sensitive, "Paris" not).
pub fn has_inner_uppercase(s: &str) -> bool {
    s.chars().skip(1).any(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_idempotent() {
        for s in ["Café", "ÉLÈVE", "straße", "ﬁn", "已经"] {
            let once = unac_fold(s);
            assert_eq!(unac_fold(&once), once);
            let stripped = strip_diacritics(s);
            assert_eq!(strip_diacritics(&stripped), stripped);
        }
    }

    #[test]
    fn test_strip() {
        assert_eq!(strip_diacritics("Café"), "Cafe");
        assert_eq!(unac_fold("ÉLÈVE"), "eleve");
    }

    #[test]
    fn test_detection() {
        assert!(has_diacritics("café"));
        assert!(!has_diacritics("cafe"));
        assert!(has_inner_uppercase("aB"));
        assert!(!has_inner_uppercase("Ab"));
    }
}
