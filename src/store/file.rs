use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::ScanResult;
use crate::error::{Result, ShieldError};

use super::memory::Partitions;
use super::{AppendOutcome, ResultStore, TimeRange};

/// Durable store: one JSON document per line, appended and never rewritten.
///
/// The file is replayed into an in-memory index on open. A torn line (from a
/// crash or a failed write) is skipped with a warning and never swallows the
/// record written after it.
pub struct FileStore {
    path: PathBuf,
    log: Arc<Mutex<LogWriter<File>>>,
    index: Arc<RwLock<Partitions>>,
}

/// Line-oriented writer that keeps records on their own lines after a
/// write fails part way through.
struct LogWriter<W> {
    out: W,
    needs_newline: bool,
}

impl<W: Write> LogWriter<W> {
    fn new(out: W, needs_newline: bool) -> Self {
        Self { out, needs_newline }
    }

    /// Write one newline-terminated record.
    fn append_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        // Terminate whatever fragment the last failed write left behind.
        if self.needs_newline {
            self.out.write_all(b"\n")?;
            self.needs_newline = false;
        }
        let written = self.out.write_all(line).and_then(|()| self.out.flush());
        if written.is_err() {
            self.needs_newline = true;
        }
        written
    }
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }

        let mut index = Partitions::default();
        let mut torn_tail = false;
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(unavailable)?;
            torn_tail = !content.is_empty() && !content.ends_with('\n');
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ScanResult>(line) {
                    Ok(result) => {
                        index.insert(result);
                    }
                    Err(e) => warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping unreadable scan record"
                    ),
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(unavailable)?;

        debug!(path = %path.display(), records = index.len(), "opened result store");
        Ok(Self {
            path,
            log: Arc::new(Mutex::new(LogWriter::new(file, torn_tail))),
            index: Arc::new(RwLock::new(index)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unavailable(e: std::io::Error) -> ShieldError {
    ShieldError::StoreUnavailable(e.to_string())
}

#[async_trait]
impl ResultStore for FileStore {
    async fn append(&self, result: &ScanResult) -> Result<AppendOutcome> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let log = self.log.clone();
        let index = self.index.clone();
        let result = result.clone();
        tokio::task::spawn_blocking(move || {
            // The log lock serializes appends, so the duplicate check and the
            // write cannot interleave with another append of the same id.
            let mut log = log.lock();
            if index.read().contains(&result.id) {
                return Ok(AppendOutcome::Duplicate);
            }
            log.append_line(line.as_bytes()).map_err(unavailable)?;
            Ok(index.write().insert(result))
        })
        .await
        .map_err(|e| ShieldError::Internal(format!("store write task failed: {e}")))?
    }

    async fn latest(&self, resource_id: &str) -> Result<Option<ScanResult>> {
        Ok(self.index.read().latest(resource_id))
    }

    async fn history(&self, resource_id: &str, limit: usize) -> Result<Vec<ScanResult>> {
        Ok(self.index.read().history(resource_id, limit))
    }

    async fn query(&self, range: &TimeRange) -> Result<Vec<ScanResult>> {
        Ok(self.index.read().query(range))
    }

    async fn query_resource(&self, resource_id: &str, range: &TimeRange) -> Result<Vec<ScanResult>> {
        Ok(self.index.read().query_resource(resource_id, range))
    }

    async fn get(&self, resource_id: &str, id: &Uuid) -> Result<Option<ScanResult>> {
        Ok(self.index.read().get(resource_id, id))
    }
}
