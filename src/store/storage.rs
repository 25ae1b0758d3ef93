use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compression::compress::{lz4_compress, lz4_decompress};
use crate::compression::vbyte::{delta_decode, delta_encode, vbyte_decode, vbyte_encode};
use crate::core::error::{Error, ErrorKind, Result};
use crate::store::postings::PostingList;
use crate::store::StoredDoc;

const MAGIC: &[u8; 8] = b"QRYSTOR1";
const FORMAT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE: &str = "index.qst";

/// On-disk image of the whole store: bincode inside an lz4 frame behind a
/// small checksummed header. Posting lists go delta+vbyte coded.
#[derive(Serialize, Deserialize)]
struct SnapshotImage {
    postings: Vec<(String, CodedPostings)>,
    docs: Vec<(u32, StoredDocImage)>,
    metadata: Vec<(String, Vec<u8>)>,
    next_docid: u32,
    total_doc_length: u64,
}

#[derive(Serialize, Deserialize)]
struct CodedPostings {
    docids: Vec<u8>,    // delta+vbyte
    wdfs: Vec<u8>,      // vbyte
    positions: Vec<Vec<u8>>, // delta+vbyte per doc
}

#[derive(Serialize, Deserialize)]
struct StoredDocImage {
    data: String,
    values: Vec<(u32, String)>,
    doc_length: u32,
    terms: Vec<String>,
}

pub struct StoreImage {
    pub postings: BTreeMap<String, PostingList>,
    pub docs: BTreeMap<u32, StoredDoc>,
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub next_docid: u32,
    pub total_doc_length: u64,
}

pub fn save(dir: &Path, image: StoreImage) -> Result<()> {
    let snapshot = SnapshotImage {
        postings: image
            .postings
            .iter()
            .map(|(t, pl)| {
                let docids: Vec<u32> = pl.docids().collect();
                let wdfs: Vec<u32> = pl.iter().map(|e| e.wdf).collect();
                let positions: Vec<Vec<u8>> =
                    pl.iter().map(|e| delta_encode(&e.positions)).collect();
                (
                    t.clone(),
                    CodedPostings {
                        docids: delta_encode(&docids),
                        wdfs: vbyte_encode(&wdfs),
                        positions,
                    },
                )
            })
            .collect(),
        docs: image
            .docs
            .iter()
            .map(|(id, d)| {
                (
                    *id,
                    StoredDocImage {
                        data: d.data.clone(),
                        values: d.values.iter().map(|(s, v)| (*s, v.clone())).collect(),
                        doc_length: d.doc_length,
                        terms: d.terms.clone(),
                    },
                )
            })
            .collect(),
        metadata: image.metadata.into_iter().collect(),
        next_docid: image.next_docid,
        total_doc_length: image.total_doc_length,
    };

    let payload = lz4_compress(&bincode::serialize(&snapshot)?);
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(payload.len() + 24);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);

    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&out)?;
    f.sync_all()?;
    fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}

pub fn exists(dir: &Path) -> bool {
    dir.join(SNAPSHOT_FILE).exists()
}

pub fn load(dir: &Path) -> Result<StoreImage> {
    let path = dir.join(SNAPSHOT_FILE);
    let raw = fs::read(&path)
        .map_err(|e| Error::new(ErrorKind::StoreOpen, format!("{}: {}", path.display(), e)))?;
    if raw.len() < 24 || &raw[0..8] != MAGIC {
        return Err(Error::new(ErrorKind::StoreOpen, "bad store magic"));
    }
    let version = u32::from_le_bytes(raw[8..12].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(Error::new(
            ErrorKind::StoreOpen,
            format!("store format {} not supported (want {})", version, FORMAT_VERSION),
        ));
    }
    let crc = u32::from_le_bytes(raw[12..16].try_into().unwrap());
    let len = u64::from_le_bytes(raw[16..24].try_into().unwrap()) as usize;
    if raw.len() != 24 + len {
        return Err(Error::new(ErrorKind::StoreCorrupt, "truncated store file"));
    }
    let payload = &raw[24..];
    if crc32fast::hash(payload) != crc {
        return Err(Error::new(ErrorKind::StoreCorrupt, "store checksum mismatch"));
    }
    let snapshot: SnapshotImage = bincode::deserialize(&lz4_decompress(payload)?)
        .map_err(|e| Error::new(ErrorKind::StoreCorrupt, e.to_string()))?;

    let mut postings = BTreeMap::new();
    for (term, coded) in snapshot.postings {
        let docids = delta_decode(&coded.docids)?;
        let wdfs = vbyte_decode(&coded.wdfs)?;
        if docids.len() != wdfs.len() || docids.len() != coded.positions.len() {
            return Err(Error::new(ErrorKind::StoreCorrupt, "posting list length skew"));
        }
        let mut pl = PostingList::new();
        for i in 0..docids.len() {
            pl.upsert(docids[i], wdfs[i], delta_decode(&coded.positions[i])?)
                .map_err(|_| Error::new(ErrorKind::StoreCorrupt, "bad position list"))?;
        }
        postings.insert(term, pl);
    }
    let docs = snapshot
        .docs
        .into_iter()
        .map(|(id, d)| {
            (
                id,
                StoredDoc {
                    data: d.data,
                    values: d.values.into_iter().collect(),
                    doc_length: d.doc_length,
                    terms: d.terms,
                },
            )
        })
        .collect();

    Ok(StoreImage {
        postings,
        docs,
        metadata: snapshot.metadata.into_iter().collect(),
        next_docid: snapshot.next_docid,
        total_doc_length: snapshot.total_doc_length,
    })
}
