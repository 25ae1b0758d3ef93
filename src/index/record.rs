use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

/// Marker prepended to abstracts the indexer synthesized from body text, as
/// opposed to filter-provided ones.
pub const SYNTHETIC_ABSTRACT_MARKER: &str = "?!#@";

/// Data record key for the multi-page-break descriptor: `relpos,extra` pairs
/// for breaks the store position list cannot express (duplicate positions).
pub const KEY_MBREAKS: &str = "rclmbreaks";

pub const KEY_URL: &str = "url";
pub const KEY_MIMETYPE: &str = "mtype";
pub const KEY_FMTIME: &str = "fmtime";
pub const KEY_DMTIME: &str = "dmtime";
pub const KEY_ORIGCHARSET: &str = "origcharset";
pub const KEY_CAPTION: &str = "caption";
pub const KEY_ABSTRACT: &str = "abstract";
pub const KEY_IPATH: &str = "ipath";
pub const KEY_FBYTES: &str = "fbytes";
pub const KEY_DBYTES: &str = "dbytes";
pub const KEY_PCBYTES: &str = "pcbytes";
pub const KEY_SIG: &str = "sig";
pub const KEY_FILENAME: &str = "filename";

/// The per-document data record: UTF-8 `key=value` lines, no escaping. Keys
/// come from a fixed set plus configured stored fields, and values are
/// sanitized at set time, so the line structure cannot be subverted.
#[derive(Debug, Clone, Default)]
pub struct DataRecord {
    fields: Vec<(String, String)>,
}

impl DataRecord {
    pub fn new() -> Self {
        DataRecord::default()
    }

    /// Newlines, formfeeds and backslashes in values become spaces.
    pub fn sanitize(value: &str) -> String {
        value
            .chars()
            .map(|c| if matches!(c, '\n' | '\r' | '\u{0C}' | '\\') { ' ' } else { c })
            .collect()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let value = Self::sanitize(value);
        if let Some(f) = self.fields.iter_mut().find(|(k, _)| k == key) {
            f.1 = value;
        } else {
            self.fields.push((key.to_string(), value));
        }
    }

    /// Set only when the value is not empty.
    pub fn set_opt(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_record_string(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.fields {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }
        out
    }

    /// Line-based parse, splitting at the first '='. Lines without one are
    /// ignored.
    pub fn parse(text: &str) -> Self {
        let mut rec = DataRecord::new();
        for line in text.lines() {
            if let Some(eq) = line.find('=') {
                rec.fields.push((line[..eq].to_string(), line[eq + 1..].to_string()));
            }
        }
        rec
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.fields.iter().cloned().collect()
    }
}

/// File times zero-padded to 11 digits and sizes to 12, so lexicographic
/// value-slot comparison orders numerically.
pub fn pad_time(secs: u64) -> String {
    format!("{:011}", secs)
}

pub fn pad_size(bytes: u64) -> String {
    format!("{:012}", bytes)
}

/// Truncate to at most `max` characters, on a grapheme boundary so that a
/// multi-byte cluster never gets cut in half.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.grapheme_indices(true).nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Normalization applied to field value slots on both the indexing and the
/// query side: numbers left-zero-padded so lexicographic compare orders
/// numerically, dashed dates compacted to YYYYMMDD.
pub fn normalize_slot_value(v: &str) -> String {
    let t = v.trim();
    if let Ok(n) = t.parse::<u64>() {
        return pad_size(n);
    }
    let b = t.as_bytes();
    if b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && t.chars().enumerate().all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
    {
        return t.chars().filter(|c| *c != '-').collect();
    }
    t.to_string()
}

pub fn encode_mbreaks(pairs: &[(u32, u32)]) -> String {
    pairs
        .iter()
        .map(|(p, e)| format!("{},{}", p, e))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_mbreaks(s: &str) -> Vec<(u32, u32)> {
    let nums: Vec<u32> = s.split(',').filter_map(|t| t.trim().parse().ok()).collect();
    nums.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let mut rec = DataRecord::new();
        rec.set(KEY_URL, "file:///home/me/doc.txt");
        rec.set(KEY_MIMETYPE, "text/plain");
        rec.set(KEY_CAPTION, "multi\nline\ttitle");
        let text = rec.to_record_string();
        let back = DataRecord::parse(&text);
        assert_eq!(back.get(KEY_URL), Some("file:///home/me/doc.txt"));
        // The newline was sanitized at set time, the tab kept.
        assert_eq!(back.get(KEY_CAPTION), Some("multi line\ttitle"));
    }

    #[test]
    fn test_set_replaces() {
        let mut rec = DataRecord::new();
        rec.set(KEY_SIG, "a");
        rec.set(KEY_SIG, "b");
        assert_eq!(rec.get(KEY_SIG), Some("b"));
        assert_eq!(rec.to_record_string(), "sig=b\n");
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_time(1700000000), "01700000000");
        assert_eq!(pad_size(4096), "000000004096");
        assert!(pad_size(1000) < pad_size(20000));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }

    #[test]
    fn test_normalize_slot_value() {
        assert_eq!(normalize_slot_value("4096"), "000000004096");
        assert_eq!(normalize_slot_value("2024-01-31"), "20240131");
        assert_eq!(normalize_slot_value("plain"), "plain");
    }

    #[test]
    fn test_mbreaks() {
        let pairs = vec![(150u32, 1u32), (300, 2)];
        assert_eq!(encode_mbreaks(&pairs), "150,1,300,2");
        assert_eq!(decode_mbreaks("150,1,300,2"), pairs);
        assert_eq!(decode_mbreaks(""), vec![]);
    }
}
