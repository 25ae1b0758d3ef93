pub mod core;
pub mod analysis;
pub mod pipeline;
pub mod schema;
pub mod compression;
pub mod store;
pub mod scoring;
pub mod index;
pub mod scheduler;
pub mod query;
pub mod snippet;
pub mod db;

pub use crate::core::config::IndexConfig;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Doc, DocId};
pub use crate::db::{Db, OpenMode, SearchResults};

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                        QUARRY STRUCT ARCHITECTURE                        │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── INDEXING ──────────────────────────────────┐
│                                                                          │
│  file → filter (external) → Doc                                          │
│                              │                                           │
│  ┌─────────────────┐  ┌──────▼──────────┐  ┌──────────────────────────┐  │
│  │ TextSplitter    │  │ DocBuilder      │  │ struct StoreDocument     │  │
│  │ • words + spans │─→│ • field section │─→│ • postings (term → wdf,  │  │
│  │ • CJK ngrams /  │  │   runs          │  │   positions)             │  │
│  │   ExternalSplit │  │ • bool terms    │  │ • boolean terms          │  │
│  │ • flags: SPANS/ │  │ • path/date     │  │ • value slots            │  │
│  │   WILD          │  │ • data record   │  │ • data record            │  │
│  └─────────────────┘  └─────────────────┘  └──────────┬───────────────┘  │
│           │                                           │                  │
│  ┌────────▼────────────────────────────┐   ┌──────────▼───────────────┐  │
│  │ term pipeline (TermProc chain)      │   │ Store::replace_document  │  │
│  │ prep(fold) → multiword syn → stop   │   │ keyed by uniterm         │  │
│  │ → emit (dense positions, prefixes)  │   └──────────────────────────┘  │
│  └─────────────────────────────────────┘                                 │
│                                                                          │
│  IndexScheduler: split workers (build) → bounded queue → single writer   │
│  optional shard writers → temp stores → absorbed at close                │
│  Db: need_update(sig) / SeenDocs bitmap / purge / purge_orphans          │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── QUERYING ──────────────────────────────────┐
│                                                                          │
│  SearchData (clauses, modifiers, filters)  ←→  XML                       │
│         │                                                                │
│  ┌──────▼───────────┐   ┌────────────────┐   ┌───────────────────────┐   │
│  │ Translator       │──→│ StoreQuery     │──→│ QueryRunner           │   │
│  │ • term expansion │   │ AND/OR/ANDNOT/ │   │ • posting set ops     │   │
│  │   (stem/wild/syn │   │ PHRASE/NEAR/   │   │ • position windows    │   │
│  │   /case/diac/    │   │ FILTER/VALUE/  │   │ • BM25 + ScaleWeight  │   │
│  │   spelling)      │   │ SCALE_WEIGHT   │   └──────────┬────────────┘   │
│  │ • HighlightData  │   └────────────────┘              │                │
│  └──────────────────┘                                   ▼                │
│                         data records + stored text → snippet builder     │
│                         (fragments, group matches, page mapping)         │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── STORE ─────────────────────────────────────┐
│                                                                          │
│  Store: BTreeMap<term, PostingList> + docs (record, values, length)      │
│         + metadata (descriptor, stem dbs, zlib'd raw text by md5 key)    │
│  Dictionary: fst::Set rebuilt at commit (prefix / wildcard / spell /     │
│              folded-variant expansion)                                   │
│  Snapshot: bincode → lz4 frame → crc32-checked file, atomic rename       │
└──────────────────────────────────────────────────────────────────────────┘
*/
