use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, bounded};
use log::{debug, error, info, warn};
use tempfile::TempDir;
use uuid::Uuid;

use crate::core::cancel::CancelFlag;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Doc;
use crate::db::{Db, text_key};
use crate::index::docbuild::BuiltDoc;
use crate::store::Store;

/// One document headed for the split stage: the file-intern step (format
/// filters) has already produced the `Doc`.
pub struct SplitTask {
    pub udi: String,
    pub parent_udi: Option<String>,
    pub doc: Doc,
}

enum WriterTask {
    AddOrUpdate(Box<BuiltDoc>),
    Delete(String),
    PurgeOrphans(String),
    Flush,
}

// A temporary shard index owned by one split worker. New documents go here;
// the shard is folded into the main index at close time.
struct Shard {
    dir: TempDir,
    store: Store,
}

impl Shard {
    fn create() -> Result<Shard> {
        let dir = TempDir::with_prefix(format!("idxshard-{}-", Uuid::new_v4()))
            .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))?;
        let store = Store::create(dir.path())?;
        Ok(Shard { dir, store })
    }
}

/// Carries documents from splitting into the store: a pool of split workers
/// runs the term pipeline and builds store documents, a single writer owns
/// all store mutation. Queues are bounded and block on both ends. With
/// sharding enabled, each worker writes brand-new documents to a private
/// temporary index instead, merged in at close.
pub struct IndexScheduler {
    split_tx: Option<Sender<SplitTask>>,
    writer_tx: Option<Sender<WriterTask>>,
    workers: Vec<JoinHandle<Option<Shard>>>,
    writer: Option<JoinHandle<Result<()>>>,
    db: Arc<Db>,
    cancel: CancelFlag,
}

impl IndexScheduler {
    pub fn new(db: Arc<Db>) -> IndexScheduler {
        let cfg = db.config();
        let nworkers = cfg.effective_split_workers();
        let use_shards = cfg.shard_writers > 0;
        let depth = cfg.queue_depth.max(1);

        let (split_tx, split_rx) = bounded::<SplitTask>(depth);
        let (writer_tx, writer_rx) = bounded::<WriterTask>(depth);
        let cancel = db.cancel_flag();

        let mut workers = Vec::with_capacity(nworkers);
        for n in 0..nworkers {
            workers.push(spawn_split_worker(
                n,
                db.clone(),
                split_rx.clone(),
                writer_tx.clone(),
                cancel.clone(),
                use_shards,
            ));
        }
        let writer = spawn_writer(db.clone(), writer_rx, cancel.clone());

        info!("index scheduler: {} split workers, shards={}", nworkers, use_shards);
        IndexScheduler {
            split_tx: Some(split_tx),
            writer_tx: Some(writer_tx),
            workers,
            writer: Some(writer),
            db,
            cancel,
        }
    }

    /// Blocks when the split queue is full.
    pub fn enqueue(&self, task: SplitTask) -> Result<()> {
        self.cancel.check()?;
        self.split_tx
            .as_ref()
            .expect("scheduler already closed")
            .send(task)
            .map_err(|_| Error::cancelled())
    }

    pub fn delete(&self, udi: &str) -> Result<()> {
        self.send_writer(WriterTask::Delete(udi.to_string()))
    }

    pub fn purge_orphans(&self, udi: &str) -> Result<()> {
        self.send_writer(WriterTask::PurgeOrphans(udi.to_string()))
    }

    pub fn request_flush(&self) -> Result<()> {
        self.send_writer(WriterTask::Flush)
    }

    fn send_writer(&self, task: WriterTask) -> Result<()> {
        self.cancel.check()?;
        self.writer_tx
            .as_ref()
            .expect("scheduler already closed")
            .send(task)
            .map_err(|_| Error::cancelled())
    }

    /// Graceful shutdown: drain the queues, fold shards into the main
    /// index, final commit.
    pub fn close(mut self) -> Result<()> {
        self.split_tx.take();
        let mut shards = Vec::new();
        for w in self.workers.drain(..) {
            match w.join() {
                Ok(Some(shard)) => shards.push(shard),
                Ok(None) => {}
                Err(_) => error!("split worker panicked"),
            }
        }
        for shard in shards {
            debug!("absorbing shard {}", shard.dir.path().display());
            self.db.absorb_store(&shard.store)?;
            // TempDir cleanup deletes the shard files.
        }
        self.writer_tx.take();
        let res = match self.writer.take() {
            Some(w) => w.join().unwrap_or_else(|_| {
                Err(Error::new(ErrorKind::Internal, "writer thread panicked"))
            }),
            None => Ok(()),
        };
        res?;
        self.db.flush()
    }

    /// Hard shutdown: queued work is discarded, nothing is committed.
    pub fn close_shop(mut self) {
        self.cancel.cancel();
        self.split_tx.take();
        self.writer_tx.take();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
        if let Some(w) = self.writer.take() {
            let _ = w.join();
        }
    }
}

impl Drop for IndexScheduler {
    fn drop(&mut self) {
        // Not closed explicitly: treat like a hard shutdown.
        if self.split_tx.is_some() || self.writer.is_some() {
            self.cancel.cancel();
            self.split_tx.take();
            self.writer_tx.take();
            for w in self.workers.drain(..) {
                let _ = w.join();
            }
            if let Some(w) = self.writer.take() {
                let _ = w.join();
            }
        }
    }
}

fn spawn_split_worker(
    n: usize,
    db: Arc<Db>,
    rx: Receiver<SplitTask>,
    writer_tx: Sender<WriterTask>,
    cancel: CancelFlag,
    use_shards: bool,
) -> JoinHandle<Option<Shard>> {
    std::thread::Builder::new()
        .name(format!("split{}", n))
        .spawn(move || {
            let mut shard: Option<Shard> = None;
            for task in rx.iter() {
                if cancel.is_cancelled() {
                    break;
                }
                let built =
                    match db.builder().build(&task.udi, task.parent_udi.as_deref(), &task.doc) {
                        Ok(b) => b,
                        Err(e) => {
                            // Per-document trouble is not fatal to the walk.
                            error!("building {} failed: {}", task.udi, e);
                            continue;
                        }
                    };
                // Updates must go through the single writer so replaces
                // for one UDI stay ordered; only brand-new documents may
                // take the private shard shortcut.
                let is_update = db.has_doc(&task.udi);
                if use_shards && !is_update {
                    if shard.is_none() {
                        match Shard::create() {
                            Ok(s) => shard = Some(s),
                            Err(e) => {
                                error!("cannot create shard, using main writer: {}", e);
                            }
                        }
                    }
                    if let Some(s) = shard.as_mut() {
                        if let Err(e) = write_to_shard(s, built) {
                            error!("shard write failed: {}", e);
                        }
                        continue;
                    }
                }
                if writer_tx.send(WriterTask::AddOrUpdate(Box::new(built))).is_err() {
                    break;
                }
            }
            shard
        })
        .expect("spawn split worker")
}

fn write_to_shard(shard: &mut Shard, built: BuiltDoc) -> Result<()> {
    shard.store.replace_document(&built.uniterm, built.doc)?;
    if let Some(text) = built.deflated_text {
        shard.store.set_metadata(&text_key(&built.uniterm), text);
    }
    Ok(())
}

fn spawn_writer(
    db: Arc<Db>,
    rx: Receiver<WriterTask>,
    cancel: CancelFlag,
) -> JoinHandle<Result<()>> {
    std::thread::Builder::new()
        .name("idxwriter".to_string())
        .spawn(move || {
            let mut fatal: Option<Error> = None;
            for task in rx.iter() {
                if cancel.is_cancelled() {
                    // Hard shutdown: drain and discard.
                    continue;
                }
                let res = match task {
                    WriterTask::AddOrUpdate(built) => db.write_built(*built),
                    WriterTask::Delete(udi) => db.delete_document(&udi),
                    WriterTask::PurgeOrphans(udi) => db.purge_orphans(&udi),
                    WriterTask::Flush => db.flush(),
                };
                if let Err(e) = res {
                    match e.kind {
                        ErrorKind::IndexFull | ErrorKind::Cancelled => {
                            // The walk cannot usefully continue; stop
                            // everything and drain.
                            warn!("writer stopping: {}", e);
                            cancel.cancel();
                            fatal = Some(e);
                        }
                        _ => error!("writer task failed: {}", e),
                    }
                }
            }
            match fatal {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
        .expect("spawn writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;
    use crate::db::OpenMode;
    use crate::pipeline::stopwords::StopList;
    use crate::pipeline::synonyms::SynGroups;
    use crate::query::searchdata::{ClauseKind, CompositeKind, SearchClause, SearchData};
    use crate::schema::fields::FieldsConfig;
    use crate::store::query::SortOrder;

    fn open_db(dir: &std::path::Path, shard_writers: usize) -> Arc<Db> {
        let config = IndexConfig {
            no_aspell: true,
            split_workers: 2,
            shard_writers,
            ..IndexConfig::default()
        };
        Arc::new(
            Db::open(
                dir,
                OpenMode::Write,
                config,
                FieldsConfig::default(),
                Arc::new(StopList::english()),
                Arc::new(SynGroups::new()),
            )
            .unwrap(),
        )
    }

    fn task(udi: &str, text: &str) -> SplitTask {
        let mut doc = Doc::new(format!("file:///{}.txt", udi));
        doc.sig = "sig1".to_string();
        doc.text = text.to_string();
        SplitTask { udi: udi.to_string(), parent_udi: None, doc }
    }

    fn count_hits(db: &Db, text: &str) -> usize {
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, text, ""));
        db.search(&sd, SortOrder::Relevance, None).unwrap().hits.len()
    }

    #[test]
    fn test_pipeline_indexes_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path(), 0);
        let scheduler = IndexScheduler::new(db.clone());
        for i in 0..20 {
            scheduler
                .enqueue(task(&format!("u{}", i), "some words to index"))
                .unwrap();
        }
        scheduler.close().unwrap();
        assert_eq!(db.doc_count(), 20);
        assert_eq!(count_hits(&db, "words"), 20);
    }

    #[test]
    fn test_sharded_indexing_merges_at_close() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path(), 2);
        let scheduler = IndexScheduler::new(db.clone());
        for i in 0..15 {
            scheduler
                .enqueue(task(&format!("u{}", i), "sharded content here"))
                .unwrap();
        }
        scheduler.close().unwrap();
        assert_eq!(db.doc_count(), 15);
        assert_eq!(count_hits(&db, "sharded"), 15);
        // Stored text survived the shard merge.
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "content", ""));
        let res = db.search(&sd, SortOrder::Relevance, None).unwrap();
        let text = db.stored_text(res.hits[0].docid).unwrap();
        assert_eq!(text.as_deref(), Some("sharded content here"));
    }

    #[test]
    fn test_update_routes_to_main_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path(), 2);
        db.add_or_update("u0", None, &task("u0", "first version").doc)
            .unwrap();
        let scheduler = IndexScheduler::new(db.clone());
        let mut t = task("u0", "second version");
        t.doc.sig = "sig2".to_string();
        scheduler.enqueue(t).unwrap();
        scheduler.close().unwrap();
        // Still one document, carrying the new content.
        assert_eq!(db.doc_count(), 1);
        assert_eq!(count_hits(&db, "second"), 1);
        assert_eq!(count_hits(&db, "first"), 0);
    }

    #[test]
    fn test_close_shop_discards() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path(), 0);
        let scheduler = IndexScheduler::new(db.clone());
        scheduler.enqueue(task("u1", "maybe indexed")).unwrap();
        scheduler.close_shop();
        // No commit happened; a reopened db sees nothing.
        drop(db);
        let db = open_db(tmp.path(), 0);
        assert_eq!(db.doc_count(), 0);
    }

    #[test]
    fn test_writer_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path(), 0);
        db.add_or_update("gone", None, &task("gone", "temporary").doc)
            .unwrap();
        let scheduler = IndexScheduler::new(db.clone());
        scheduler.delete("gone").unwrap();
        scheduler.request_flush().unwrap();
        scheduler.close().unwrap();
        assert!(!db.has_doc("gone"));
    }
}
