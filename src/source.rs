//! Line sources: regular files, memory-mapped large files, chunked files
//! with progress, and (peekable) stdin.
//!
//! Every source satisfies the same contract: `metadata()` describes the
//! source, `read_lines()` consumes it into a lazy iterator of lines without
//! trailing `\n`/`\r`, decoded UTF-8-lossy. Ownership of file handles and
//! maps moves into the iterator, so dropping the iterator releases them even
//! when the consumer stops early. Line-length validation runs inside every
//! iterator; an oversize line yields one error and ends the stream.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;
use thiserror::Error;

use crate::security::{self, MAX_LINE_LENGTH, SecurityError};

/// Files above this size are read through a memory map.
pub const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Progress callback interval, in lines.
pub const DEFAULT_CALLBACK_INTERVAL: u64 = 10_000;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("read error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

pub type LineResult = Result<String, SourceError>;
pub type LineIter = Box<dyn Iterator<Item = LineResult>>;

/// A line producer. Reading consumes the source so resources are released
/// when the returned iterator is dropped.
pub trait LineSource {
    fn metadata(&self) -> BTreeMap<String, String>;
    fn read_lines(self: Box<Self>) -> LineIter;
}

/// Progress callback: (bytes_read, total_bytes, lines_read).
pub type ProgressFn = Box<dyn FnMut(u64, u64, u64)>;

fn strip_line_ending(mut bytes: Vec<u8>) -> Vec<u8> {
    while matches!(bytes.last(), Some(b'\n') | Some(b'\r')) {
        bytes.pop();
    }
    bytes
}

fn decode_line(bytes: Vec<u8>) -> LineResult {
    let line = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    security::validate_line_length(&line, MAX_LINE_LENGTH)?;
    Ok(line)
}

/// Buffered line iteration shared by the file and stdin paths.
struct BufLines<R: Read> {
    reader: BufReader<R>,
    done: bool,
    counters: Option<(Arc<AtomicU64>, Arc<AtomicU64>)>,
}

impl<R: Read> BufLines<R> {
    fn new(inner: R) -> Self {
        BufLines {
            reader: BufReader::new(inner),
            done: false,
            counters: None,
        }
    }

    fn with_counters(inner: R, lines: Arc<AtomicU64>, bytes: Arc<AtomicU64>) -> Self {
        BufLines {
            reader: BufReader::new(inner),
            done: false,
            counters: Some((lines, bytes)),
        }
    }
}

impl<R: Read> Iterator for BufLines<R> {
    type Item = LineResult;

    fn next(&mut self) -> Option<LineResult> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                if let Some((lines, bytes)) = &self.counters {
                    lines.fetch_add(1, Ordering::Relaxed);
                    bytes.fetch_add(n as u64, Ordering::Relaxed);
                }
                let result = decode_line(strip_line_ending(buf));
                if result.is_err() {
                    self.done = true;
                }
                Some(result)
            }
            Err(e) => {
                self.done = true;
                tracing::warn!(error = %e, "read error, treating source as exhausted");
                Some(Err(SourceError::Io(e)))
            }
        }
    }
}

fn stat_path(path: &Path) -> Result<u64, SourceError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SourceError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(SourceError::Io(e)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sequential line iteration over a regular file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<FileSource, SourceError> {
        let path = path.as_ref().to_path_buf();
        let size = stat_path(&path)?;
        let _ = security::check_symlink(&path, true);
        Ok(FileSource { path, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for FileSource {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("source_type".to_string(), "file".to_string()),
            ("path".to_string(), self.path.display().to_string()),
            ("name".to_string(), file_name(&self.path)),
            ("size_bytes".to_string(), self.size.to_string()),
            (
                "size_mb".to_string(),
                format!("{:.2}", self.size as f64 / (1024.0 * 1024.0)),
            ),
        ])
    }

    fn read_lines(self: Box<Self>) -> LineIter {
        match File::open(&self.path) {
            Ok(file) => Box::new(BufLines::new(file)),
            Err(e) => Box::new(std::iter::once(Err(SourceError::Io(e)))),
        }
    }
}

/// Line iteration over a memory map, scanning bytes for `\n`.
/// The map is owned by the iterator and unmapped on drop.
struct MmapLines {
    mmap: Mmap,
    pos: usize,
    done: bool,
}

impl Iterator for MmapLines {
    type Item = LineResult;

    fn next(&mut self) -> Option<LineResult> {
        if self.done || self.pos >= self.mmap.len() {
            return None;
        }
        let rest = &self.mmap[self.pos..];
        let bytes = match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                let line = &rest[..nl];
                self.pos += nl + 1;
                line
            }
            None => {
                // Trailing line without a terminator.
                self.pos = self.mmap.len();
                rest
            }
        };
        let result = decode_line(strip_line_ending(bytes.to_vec()));
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// File source that switches to a memory-mapped read path for files over
/// [`MMAP_THRESHOLD`], falling back to buffered reads below it.
pub struct LargeFileSource {
    path: PathBuf,
    size: u64,
    use_mmap: bool,
}

impl LargeFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<LargeFileSource, SourceError> {
        let path = path.as_ref().to_path_buf();
        let size = stat_path(&path)?;
        let _ = security::check_symlink(&path, true);
        Ok(LargeFileSource {
            path,
            size,
            use_mmap: size > MMAP_THRESHOLD,
        })
    }

    pub fn using_mmap(&self) -> bool {
        self.use_mmap
    }
}

impl LineSource for LargeFileSource {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "source_type".to_string(),
                if self.use_mmap { "large_file" } else { "file" }.to_string(),
            ),
            ("path".to_string(), self.path.display().to_string()),
            ("name".to_string(), file_name(&self.path)),
            ("size_bytes".to_string(), self.size.to_string()),
            (
                "size_mb".to_string(),
                format!("{:.2}", self.size as f64 / (1024.0 * 1024.0)),
            ),
            (
                "size_gb".to_string(),
                format!("{:.2}", self.size as f64 / (1024.0 * 1024.0 * 1024.0)),
            ),
            ("using_mmap".to_string(), self.use_mmap.to_string()),
        ])
    }

    fn read_lines(self: Box<Self>) -> LineIter {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => return Box::new(std::iter::once(Err(SourceError::Io(e)))),
        };
        if !self.use_mmap {
            return Box::new(BufLines::new(file));
        }
        // Safety: the map is read-only and owned by the iterator.
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Box::new(MmapLines {
                mmap,
                pos: 0,
                done: false,
            }),
            Err(e) => Box::new(std::iter::once(Err(SourceError::Io(e)))),
        }
    }
}

struct ChunkedLines {
    reader: BufReader<File>,
    total_bytes: u64,
    bytes_read: u64,
    lines_read: u64,
    interval: u64,
    callback: Option<ProgressFn>,
    done: bool,
}

impl Iterator for ChunkedLines {
    type Item = LineResult;

    fn next(&mut self) -> Option<LineResult> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                if let Some(cb) = self.callback.as_mut() {
                    cb(self.bytes_read, self.total_bytes, self.lines_read);
                }
                None
            }
            Ok(n) => {
                self.bytes_read += n as u64;
                self.lines_read += 1;
                if self.lines_read % self.interval == 0 {
                    if let Some(cb) = self.callback.as_mut() {
                        cb(self.bytes_read, self.total_bytes, self.lines_read);
                    }
                }
                let result = decode_line(strip_line_ending(buf));
                if result.is_err() {
                    self.done = true;
                }
                Some(result)
            }
            Err(e) => {
                self.done = true;
                tracing::warn!(error = %e, "read error, treating source as exhausted");
                Some(Err(SourceError::Io(e)))
            }
        }
    }
}

/// File source that reports progress through a callback as it reads.
/// The callback fires every `interval` lines and once more at end-of-stream.
pub struct ChunkedFileSource {
    path: PathBuf,
    size: u64,
    interval: u64,
    callback: Option<ProgressFn>,
}

impl ChunkedFileSource {
    pub fn open(
        path: impl AsRef<Path>,
        callback: Option<ProgressFn>,
    ) -> Result<ChunkedFileSource, SourceError> {
        Self::with_interval(path, callback, DEFAULT_CALLBACK_INTERVAL)
    }

    pub fn with_interval(
        path: impl AsRef<Path>,
        callback: Option<ProgressFn>,
        interval: u64,
    ) -> Result<ChunkedFileSource, SourceError> {
        let path = path.as_ref().to_path_buf();
        let size = stat_path(&path)?;
        let _ = security::check_symlink(&path, true);
        Ok(ChunkedFileSource {
            path,
            size,
            interval: interval.max(1),
            callback,
        })
    }
}

impl LineSource for ChunkedFileSource {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("source_type".to_string(), "chunked_file".to_string()),
            ("path".to_string(), self.path.display().to_string()),
            ("name".to_string(), file_name(&self.path)),
            ("size_bytes".to_string(), self.size.to_string()),
            (
                "size_mb".to_string(),
                format!("{:.2}", self.size as f64 / (1024.0 * 1024.0)),
            ),
        ])
    }

    fn read_lines(self: Box<Self>) -> LineIter {
        match File::open(&self.path) {
            Ok(file) => Box::new(ChunkedLines {
                reader: BufReader::new(file),
                total_bytes: self.size,
                bytes_read: 0,
                lines_read: 0,
                interval: self.interval,
                callback: self.callback,
                done: false,
            }),
            Err(e) => Box::new(std::iter::once(Err(SourceError::Io(e)))),
        }
    }
}

/// Streaming standard input. Running totals are shared with the iterator so
/// `metadata()` reflects reads made so far.
pub struct StdinSource {
    reader: Box<dyn Read>,
    lines: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl StdinSource {
    pub fn new() -> StdinSource {
        Self::from_reader(io::stdin())
    }

    /// For testing: read from any reader.
    pub fn from_reader(reader: impl Read + 'static) -> StdinSource {
        StdinSource {
            reader: Box::new(reader),
            lines: Arc::new(AtomicU64::new(0)),
            bytes: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        StdinSource::new()
    }
}

impl LineSource for StdinSource {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("source_type".to_string(), "stdin".to_string()),
            ("path".to_string(), "<stdin>".to_string()),
            ("name".to_string(), "stdin".to_string()),
            (
                "lines_read".to_string(),
                self.lines.load(Ordering::Relaxed).to_string(),
            ),
            (
                "bytes_read".to_string(),
                self.bytes.load(Ordering::Relaxed).to_string(),
            ),
        ])
    }

    fn read_lines(self: Box<Self>) -> LineIter {
        Box::new(BufLines::with_counters(self.reader, self.lines, self.bytes))
    }
}

/// Stdin with a retained head: `peek()` reads and keeps the first N lines so
/// format detection can run before streaming; `read_lines()` replays them and
/// continues with the rest of the input.
pub struct PeekStdinSource {
    reader: Box<dyn Read>,
    peek_lines: usize,
    buffer: Vec<String>,
    peeked: bool,
    exhausted: bool,
    lines: Arc<AtomicU64>,
}

impl PeekStdinSource {
    pub fn new(peek_lines: usize) -> PeekStdinSource {
        Self::from_reader(io::stdin(), peek_lines)
    }

    /// For testing: read from any reader.
    pub fn from_reader(reader: impl Read + 'static, peek_lines: usize) -> PeekStdinSource {
        PeekStdinSource {
            reader: Box::new(reader),
            peek_lines,
            buffer: Vec::new(),
            peeked: false,
            exhausted: false,
            lines: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read and retain the first `peek_lines` lines. Consumes from the
    /// underlying input at most once; later calls return the same buffer.
    pub fn peek(&mut self) -> Result<&[String], SourceError> {
        if self.peeked {
            return Ok(&self.buffer);
        }
        self.peeked = true;
        for _ in 0..self.peek_lines {
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                match self.reader.read(&mut byte)? {
                    0 => break,
                    _ => {
                        buf.push(byte[0]);
                        if byte[0] == b'\n' {
                            break;
                        }
                    }
                }
            }
            if buf.is_empty() {
                self.exhausted = true;
                break;
            }
            self.buffer.push(decode_line(strip_line_ending(buf))?);
        }
        Ok(&self.buffer)
    }
}

impl LineSource for PeekStdinSource {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("source_type".to_string(), "stdin_buffered".to_string()),
            ("path".to_string(), "<stdin>".to_string()),
            ("name".to_string(), "stdin".to_string()),
            ("peek_lines".to_string(), self.peek_lines.to_string()),
            (
                "lines_read".to_string(),
                self.lines.load(Ordering::Relaxed).to_string(),
            ),
        ])
    }

    fn read_lines(self: Box<Self>) -> LineIter {
        let lines = self.lines.clone();
        lines.fetch_add(self.buffer.len() as u64, Ordering::Relaxed);
        let buffered = self.buffer.into_iter().map(Ok);
        if self.exhausted {
            return Box::new(buffered);
        }
        let bytes = Arc::new(AtomicU64::new(0));
        Box::new(buffered.chain(BufLines::with_counters(self.reader, lines, bytes)))
    }
}

/// Pick the right file source for a path: memory-mapped above the large-file
/// threshold, sequential below it.
pub fn open_path_source(path: &Path) -> Result<Box<dyn LineSource>, SourceError> {
    let size = stat_path(path)?;
    if size > MMAP_THRESHOLD {
        Ok(Box::new(LargeFileSource::open(path)?))
    } else {
        Ok(Box::new(FileSource::open(path)?))
    }
}
