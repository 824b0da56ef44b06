//! SpoolFile - the per-stream segment store
//!
//! One `SpoolFile` owns the directory `<base>/<stream>/` holding numbered
//! `NNNNNN.spl` segments. The writer appends to the highest segment; the
//! reader only ever opens segments below the writer's index, so the two
//! never share a file. Segments are deleted after full replay.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use sluice_core::{MessageBatch, StreamId};

/// Segment file extension
pub const SEGMENT_EXTENSION: &str = "spl";

struct SegmentWriter {
    file: BufWriter<File>,
    index: u64,
    opened: Instant,
    bytes: u64,
}

/// On-disk segment store for one prior stream
pub struct SpoolFile {
    stream_id: StreamId,
    stream_name: String,
    base_path: PathBuf,

    /// Write-amortizing staging batch
    pub batch: MessageBatch,

    writer: Option<SegmentWriter>,
    /// Index the next opened segment gets
    next_index: u64,
    /// Next segment the reader will consume
    read_index: u64,

    reads: i64,
    writes: i64,
    /// Set on each metrics tick to derive per-second rates
    pub last_metric_update: Instant,
}

impl SpoolFile {
    /// Open (or create) the spool directory for a stream
    ///
    /// The directory is created with mode 0700. Existing segments are
    /// scanned so both writer and reader resume where the last run left
    /// off: the writer above the highest index, the reader at the lowest.
    pub fn open(
        base: &std::path::Path,
        stream_id: StreamId,
        stream_name: &str,
        batch_capacity: usize,
    ) -> std::io::Result<Self> {
        let base_path = base.join(stream_name);

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&base_path)?;

        let mut lowest: Option<u64> = None;
        let mut highest: Option<u64> = None;
        for entry in fs::read_dir(&base_path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXTENSION) {
                continue;
            }
            let Some(index) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            lowest = Some(lowest.map_or(index, |v| v.min(index)));
            highest = Some(highest.map_or(index, |v| v.max(index)));
        }

        Ok(Self {
            stream_id,
            stream_name: stream_name.to_string(),
            base_path,
            batch: MessageBatch::new(batch_capacity),
            writer: None,
            next_index: highest.map_or(0, |v| v + 1),
            read_index: lowest.unwrap_or(0),
            reads: 0,
            writes: 0,
            last_metric_update: Instant::now(),
        })
    }

    /// Stream this spool belongs to
    #[inline]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Stream name (also the directory name)
    #[inline]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The spool directory
    #[inline]
    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    /// Ensure a writable segment, rotating on size or age bounds
    ///
    /// Reading of a segment begins only after it rotates out of the
    /// writer's hands.
    pub fn open_or_rotate(&mut self, max_size: u64, max_age: Duration) -> std::io::Result<()> {
        let needs_new = match &self.writer {
            None => true,
            Some(w) => w.bytes >= max_size || w.opened.elapsed() >= max_age,
        };
        if !needs_new {
            return Ok(());
        }

        self.seal()?;

        let index = self.next_index;
        let path = self.segment_path(index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        tracing::debug!(
            stream = %self.stream_name,
            segment = %path.display(),
            "opened spool segment"
        );

        self.writer = Some(SegmentWriter {
            file: BufWriter::new(file),
            index,
            opened: Instant::now(),
            bytes: 0,
        });
        self.next_index = index + 1;
        Ok(())
    }

    /// Rotate by age only, sealing an idle segment so the reader can reach it
    pub fn rotate_if_aged(&mut self, max_age: Duration) -> std::io::Result<()> {
        let aged = self
            .writer
            .as_ref()
            .is_some_and(|w| w.opened.elapsed() >= max_age);
        if aged {
            self.seal()?;
        }
        Ok(())
    }

    /// Seal the active segment: flush, sync, close
    ///
    /// The next write opens a fresh segment; the sealed one becomes
    /// visible to the reader.
    pub fn seal(&mut self) -> std::io::Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .file
                .into_inner()
                .map_err(|e| e.into_error())?;
            file.sync_all()?;
            tracing::debug!(
                stream = %self.stream_name,
                segment = writer.index,
                bytes = writer.bytes,
                "sealed spool segment"
            );
        }
        Ok(())
    }

    /// Append one encoded record to the active segment
    pub fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no active spool segment")
        })?;
        writer.file.write_all(record)?;
        writer.bytes += record.len() as u64;
        Ok(())
    }

    /// Path of the next sealed segment, if one is ready for the reader
    ///
    /// A segment is sealed when its index is below the active writer's
    /// (or below the next index when no writer is open). The active
    /// segment is never offered.
    pub fn sealed_segment(&self) -> Option<(u64, PathBuf)> {
        let writer_index = self.writer.as_ref().map_or(self.next_index, |w| w.index);
        if self.read_index < writer_index {
            let path = self.segment_path(self.read_index);
            if path.exists() {
                return Some((self.read_index, path));
            }
        }
        None
    }

    /// Delete the segment the reader just exhausted and advance
    pub fn finish_segment(&mut self) -> std::io::Result<()> {
        let path = self.segment_path(self.read_index);
        fs::remove_file(&path)?;
        tracing::debug!(
            stream = %self.stream_name,
            segment = self.read_index,
            "spool segment replayed and deleted"
        );
        self.read_index += 1;
        Ok(())
    }

    /// Skip past an unreadable segment without deleting it
    pub fn skip_segment(&mut self) {
        self.read_index += 1;
    }

    /// Count one replayed (or origin-returned) message
    #[inline]
    pub fn count_read(&mut self) {
        self.reads += 1;
    }

    /// Count one message accepted for spooling
    #[inline]
    pub fn count_write(&mut self) {
        self.writes += 1;
    }

    /// Take and reset the interval counters
    pub fn take_counts(&mut self) -> (i64, i64) {
        (
            std::mem::take(&mut self.reads),
            std::mem::take(&mut self.writes),
        )
    }

    fn segment_path(&self, index: u64) -> PathBuf {
        self.base_path.join(format!("{index:06}.{SEGMENT_EXTENSION}"))
    }
}

impl std::fmt::Debug for SpoolFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolFile")
            .field("stream", &self.stream_name)
            .field("next_index", &self.next_index)
            .field("read_index", &self.read_index)
            .finish()
    }
}

#[cfg(test)]
#[path = "spool_file_test.rs"]
mod spool_file_test;
