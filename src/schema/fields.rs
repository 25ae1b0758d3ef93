use serde::{Serialize, Deserialize};
use std::collections::HashMap;

// Stable term prefixes. Changing any of these invalidates existing indexes.
pub mod prefix {
    pub const MIMETYPE: &str = "T";
    pub const EXT: &str = "XE";
    pub const PATHELT: &str = "XP";
    /// Unique document term, wrapped around the UDI.
    pub const UNIQ: &str = "Q";
    /// Parent document term, wrapped around the parent UDI.
    pub const PARENT: &str = "F";
    pub const MD5: &str = "XM";
    pub const PAGEBREAK: &str = "XXPG/";
    pub const FIELD_START: &str = "XXST/";
    pub const FIELD_END: &str = "XXND/";
    pub const HAS_CHILDREN: &str = "XXC/";
    pub const UNSPLIT_FILENAME: &str = "XSFN";
    pub const DAY: &str = "D";
    pub const MONTH: &str = "M";
    pub const YEAR: &str = "Y";
    pub const BRT_DAY: &str = "BD";
    pub const BRT_MONTH: &str = "BM";
    pub const BRT_YEAR: &str = "BY";
}

// Stable value slots. Per-field configured slots start at FIELD_SLOT_BASE.
pub mod slot {
    pub const SIG: u32 = 10;
    pub const SIZE: u32 = 11;
    pub const MD5: u32 = 12;
    pub const FIELD_SLOT_BASE: u32 = 20;
}

/// Prefix wrapping style, an index-wide property fixed at creation: plain
/// uppercase runs when the index folds case/diacritics, colon-delimited
/// otherwise so that prefixes cannot collide with raw uppercase terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixStyle {
    pub strip_chars: bool,
}

impl PrefixStyle {
    pub fn wrap(&self, pfx: &str) -> String {
        if pfx.is_empty() {
            String::new()
        } else if self.strip_chars {
            pfx.to_string()
        } else {
            format!(":{}:", pfx)
        }
    }

    pub fn uniterm(&self, udi: &str) -> String {
        format!("{}{}", self.wrap(prefix::UNIQ), udi)
    }

    pub fn parent_term(&self, udi: &str) -> String {
        format!("{}{}", self.wrap(prefix::PARENT), udi)
    }

    /// Strip a wrapped prefix from a term, for enumeration results.
    pub fn strip(&self, pfx: &str, term: &str) -> Option<String> {
        term.strip_prefix(self.wrap(pfx).as_str()).map(|s| s.to_string())
    }
}

/// How a named metadata field is indexed and queried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldTraits {
    /// Term prefix. Empty means the field is indexed unprefixed only.
    pub pfx: String,
    /// Weight increment added to each term occurrence.
    pub wdfinc: u32,
    /// Value slot enabling range queries on this field.
    pub valueslot: Option<u32>,
    /// Do not also emit the unprefixed form.
    pub pfxonly: bool,
    /// Do not contribute terms to highlight data.
    pub noterms: bool,
}

impl FieldTraits {
    fn new(pfx: &str, wdfinc: u32) -> Self {
        FieldTraits { pfx: pfx.to_string(), wdfinc, ..Default::default() }
    }
}

/// Field name to traits mapping, with alias canonicalization and the list of
/// fields copied into the document data record.
#[derive(Debug, Clone)]
pub struct FieldsConfig {
    traits: HashMap<String, FieldTraits>,
    aliases: HashMap<String, String>,
    stored: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        let mut traits = HashMap::new();
        traits.insert("caption".to_string(), FieldTraits::new("S", 10));
        traits.insert("author".to_string(), FieldTraits::new("A", 1));
        traits.insert("keyword".to_string(), FieldTraits::new("K", 10));
        traits.insert("recipient".to_string(), FieldTraits::new("R", 1));
        traits.insert("abstract".to_string(), FieldTraits::new("", 1));
        traits.insert("filename".to_string(), FieldTraits {
            pfx: prefix::UNSPLIT_FILENAME.to_string(),
            wdfinc: 1,
            valueslot: None,
            pfxonly: false,
            noterms: true,
        });
        let mut aliases = HashMap::new();
        aliases.insert("title".to_string(), "caption".to_string());
        aliases.insert("subject".to_string(), "caption".to_string());
        aliases.insert("keywords".to_string(), "keyword".to_string());
        aliases.insert("tags".to_string(), "keyword".to_string());
        aliases.insert("creator".to_string(), "author".to_string());
        aliases.insert("from".to_string(), "author".to_string());
        aliases.insert("to".to_string(), "recipient".to_string());
        FieldsConfig {
            traits,
            aliases,
            stored: vec![
                "author".to_string(),
                "keyword".to_string(),
                "recipient".to_string(),
            ],
        }
    }
}

impl FieldsConfig {
    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    pub fn traits(&self, name: &str) -> Option<&FieldTraits> {
        self.traits.get(self.canonical(name))
    }

    /// Register or replace a field. A field given a value slot becomes range
    /// queryable.
    pub fn set_traits(&mut self, name: impl Into<String>, traits: FieldTraits) {
        self.traits.insert(name.into(), traits);
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Fields whose values are copied to the data record at index time.
    pub fn stored(&self) -> &[String] {
        &self.stored
    }

    pub fn add_stored(&mut self, name: impl Into<String>) {
        self.stored.push(name.into());
    }

    pub fn value_slot(&self, name: &str) -> Option<u32> {
        self.traits(name).and_then(|t| t.valueslot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_styles() {
        let stripped = PrefixStyle { strip_chars: true };
        let raw = PrefixStyle { strip_chars: false };
        assert_eq!(stripped.wrap(prefix::MIMETYPE), "T");
        assert_eq!(raw.wrap(prefix::MIMETYPE), ":T:");
        assert_eq!(stripped.uniterm("/a/b"), "Q/a/b");
        assert_eq!(raw.uniterm("/a/b"), ":Q:/a/b");
        assert_eq!(raw.strip(prefix::UNIQ, ":Q:/a/b").as_deref(), Some("/a/b"));
        assert_eq!(stripped.wrap(""), "");
    }

    #[test]
    fn test_aliases() {
        let fields = FieldsConfig::default();
        assert_eq!(fields.canonical("title"), "caption");
        assert_eq!(fields.traits("title").unwrap().wdfinc, 10);
        assert!(fields.traits("nosuchfield").is_none());
    }
}
