use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::analysis::splitter::TermSink;
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Serialize)]
struct SplitRequest<'a> {
    data: &'a str,
    tagger: &'a str,
}

#[derive(Deserialize)]
struct SplitResponse {
    /// Tab-separated (word, startCharOffset, endCharOffset) triples.
    wordsandpos: String,
}

/// One long-lived helper process speaking line-delimited JSON.
#[derive(Debug)]
struct HelperProcess {
    child: Child,
    reader: BufReader<std::process::ChildStdout>,
}

impl HelperProcess {
    fn start(command: &str) -> Result<Self> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::new(ErrorKind::ExternalSplitter, format!("exec {}: {}", command, e))
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::new(ErrorKind::ExternalSplitter, "no stdout"))?;
        Ok(HelperProcess { reader: BufReader::new(stdout), child })
    }

    fn request(&mut self, data: &str, tagger: &str) -> Result<SplitResponse> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::ExternalSplitter, "no stdin"))?;
        let req = serde_json::to_string(&SplitRequest { data, tagger })
            .map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))?;
        stdin
            .write_all(req.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush())
            .map_err(|e| Error::new(ErrorKind::ExternalSplitter, format!("write: {}", e)))?;
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| Error::new(ErrorKind::ExternalSplitter, format!("read: {}", e)))?;
        if line.is_empty() {
            return Err(Error::new(ErrorKind::ExternalSplitter, "helper closed its output"));
        }
        serde_json::from_str(&line)
            .map_err(|e| Error::new(ErrorKind::ExternalSplitter, format!("bad response: {}", e)))
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Pool of helper processes shared by all splitter instances of one runtime
/// context. Processes are reused across documents to amortize startup. A
/// failure before the helper ever answered (script not installed) latches
/// the pool unusable so later batches short-circuit.
#[derive(Debug)]
pub struct SplitterPool {
    command: String,
    tagger: String,
    idle: Mutex<Vec<HelperProcess>>,
    unusable: AtomicBool,
    ever_worked: AtomicBool,
}

impl SplitterPool {
    pub fn new(command: impl Into<String>, tagger: impl Into<String>) -> Arc<Self> {
        Arc::new(SplitterPool {
            command: command.into(),
            tagger: tagger.into(),
            idle: Mutex::new(Vec::new()),
            unusable: AtomicBool::new(false),
            ever_worked: AtomicBool::new(false),
        })
    }

    pub fn is_unusable(&self) -> bool {
        self.unusable.load(Ordering::Relaxed)
    }

    fn checkout(&self) -> Result<HelperProcess> {
        if self.is_unusable() {
            return Err(Error::new(ErrorKind::ExternalSplitter, "splitter marked unusable"));
        }
        if let Some(p) = self.idle.lock().pop() {
            return Ok(p);
        }
        match HelperProcess::start(&self.command) {
            Ok(p) => Ok(p),
            Err(e) => {
                warn!("cannot start external splitter, disabling: {}", e);
                self.unusable.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn put_back(&self, p: HelperProcess) {
        self.idle.lock().push(p);
    }

    fn note_failure(&self) {
        if !self.ever_worked.load(Ordering::Relaxed) {
            warn!("external splitter never answered, disabling");
            self.unusable.store(true, Ordering::Relaxed);
        }
    }
}

/// Dictionary-based segmentation of Chinese runs through a helper process.
/// Offsets in the helper protocol are character offsets into the submitted
/// batch; we keep a char-to-byte map and translate back.
pub struct ExternalSplitter {
    pool: Arc<SplitterPool>,
    proc: Option<HelperProcess>,
    only_spans: bool,
}

impl ExternalSplitter {
    pub fn new(pool: Arc<SplitterPool>, only_spans: bool) -> Self {
        ExternalSplitter { pool, proc: None, only_spans }
    }

    /// Segment `text` and emit the tokens. Positions are `pos_base` plus the
    /// token's start character offset, so the caller can advance its own
    /// position counter by the run's character count afterwards.
    pub fn split<S: TermSink>(
        &mut self,
        text: &str,
        byte_base: usize,
        pos_base: u32,
        sink: &mut S,
    ) -> Result<()> {
        if self.proc.is_none() {
            self.proc = Some(self.pool.checkout()?);
        }
        let resp = {
            let p = self.proc.as_mut().unwrap();
            match p.request(text, &self.pool.tagger) {
                Ok(r) => r,
                Err(e) => {
                    // Broken process: drop it, a fresh one will be started
                    // for the next batch.
                    debug!("external splitter request failed: {}", e);
                    self.proc = None;
                    self.pool.note_failure();
                    return Err(e);
                }
            }
        };
        self.pool.ever_worked.store(true, Ordering::Relaxed);

        let mut offs: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offs.push(text.len());
        let nchars = offs.len() - 1;

        let mut tokens: Vec<(&str, usize, usize)> = Vec::new();
        let mut fields = resp.wordsandpos.split('\t');
        while let Some(word) = fields.next() {
            if word.is_empty() {
                continue;
            }
            let (Some(s), Some(e)) = (fields.next(), fields.next()) else {
                return Err(Error::new(ErrorKind::ExternalSplitter, "truncated triple list"));
            };
            let (Ok(s), Ok(e)) = (s.parse::<usize>(), e.parse::<usize>()) else {
                return Err(Error::new(ErrorKind::ExternalSplitter, "bad offsets"));
            };
            if s >= e || e > nchars {
                return Err(Error::new(ErrorKind::ExternalSplitter, "offsets out of range"));
            }
            tokens.push((word, s, e));
        }
        // Covering spans first: start ascending, end descending.
        tokens.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

        let mut cover: Option<(usize, usize)> = None;
        for (word, s, e) in tokens {
            let contained = cover.map(|(cs, ce)| s >= cs && e <= ce).unwrap_or(false);
            if !contained {
                cover = Some((s, e));
            } else if self.only_spans {
                // Short words inside a covering span are plain words.
                continue;
            }
            let bstart = byte_base + offs[s];
            let bend = byte_base + offs[e];
            if !sink.take_word(word, pos_base + s as u32, bstart, bend) {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for ExternalSplitter {
    fn drop(&mut self) {
        if let Some(p) = self.proc.take() {
            self.pool.put_back(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Vec<(String, u32)>);
    impl TermSink for Collect {
        fn take_word(&mut self, term: &str, pos: u32, _s: usize, _e: usize) -> bool {
            self.0.push((term.to_string(), pos));
            true
        }
    }

    #[test]
    fn test_never_answered_latches_pool() {
        let pool = SplitterPool::new("exit 1", "simple");
        let mut sp = ExternalSplitter::new(pool.clone(), false);
        let mut c = Collect(Vec::new());
        assert!(sp.split("text", 0, 0, &mut c).is_err());
        assert!(pool.is_unusable());
        // Short-circuits from now on.
        assert!(sp.split("text", 0, 0, &mut c).is_err());
    }

    // A helper that answers a fixed segmentation for any request: two words
    // plus the covering span, like a dictionary tagger would.
    const FAKE_TAGGER: &str = concat!(
        "while read line; do ",
        r#"printf '%s\n' '{"wordsandpos": "已经\t0\t2\t进行\t2\t4\t已经进行\t0\t4"}'; "#,
        "done"
    );

    #[test]
    fn test_words_and_cover_span() {
        let pool = SplitterPool::new(FAKE_TAGGER, "simple");
        let mut sp = ExternalSplitter::new(pool.clone(), false);
        let mut c = Collect(Vec::new());
        sp.split("已经进行", 0, 100, &mut c).unwrap();
        assert_eq!(c.0, vec![
            ("已经进行".to_string(), 100),
            ("已经".to_string(), 100),
            ("进行".to_string(), 102),
        ]);
        // Process goes back to the pool and is reused.
        drop(sp);
        assert_eq!(pool.idle.lock().len(), 1);
    }

    #[test]
    fn test_only_spans_skips_contained_words() {
        let pool = SplitterPool::new(FAKE_TAGGER, "simple");
        let mut sp = ExternalSplitter::new(pool, true);
        let mut c = Collect(Vec::new());
        sp.split("已经进行", 0, 0, &mut c).unwrap();
        assert_eq!(c.0, vec![("已经进行".to_string(), 0)]);
    }
}
