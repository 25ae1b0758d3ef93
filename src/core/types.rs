use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Store document id. Ids are assigned by the posting store and never reused
/// within one index generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

/// Input document, as produced by the external format filters. One per file,
/// or one per sub-document for archive members and attachments (non-empty
/// `ipath`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Doc {
    pub url: String,
    /// Locator inside a compound file. Empty for file-level documents.
    pub ipath: String,
    pub mimetype: String,
    /// File modification time, decimal Unix seconds.
    pub fmtime: String,
    /// Document modification time when the filter knows better (e.g. mail date).
    pub dmtime: String,
    /// File birth time where the filesystem provides one.
    pub brtime: String,
    pub origcharset: String,
    /// Named metadata fields: caption, author, keywords, abstract, ...
    pub meta: HashMap<String, String>,
    /// Plain text extracted by the filter. May contain \f page breaks.
    pub text: String,
    /// Top-level container file size.
    pub pcbytes: u64,
    /// Size of the document inside the container.
    pub fbytes: u64,
    /// Text size; filled in at index time from `text`.
    pub dbytes: u64,
    /// Up-to-date check value, opaque to the engine (mtime+size typically).
    pub sig: String,
    pub has_children: bool,
    /// Set by the filter when extraction failed; only the filename gets
    /// indexed and the signature is marked for retry.
    pub index_error: bool,
}

impl Doc {
    pub fn new(url: impl Into<String>) -> Self {
        Doc { url: url.into(), ..Default::default() }
    }

    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(|s| s.as_str())
    }

    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Last component of the url path, for filename terms.
    pub fn filename(&self) -> Option<&str> {
        let path = self.url.strip_prefix("file://").unwrap_or(&self.url);
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}
