//! Recording file layout (bincode 1.x, default options):
//!
//! ```text
//! [ manifest ]   one Manifest: ordered (element type, stream name) pairs
//! [ message ]*   Message: payload, timestamp, stream name
//! ```
//!
//! No length prefixes. End of recording is a clean EOF at a record boundary.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flow_api::{DataType, Message, OperatorError, StreamDecl, StreamView};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub data_type: DataType,
    pub name: String,
}

/// Header of a recording. Entry names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Result<Self, OperatorError> {
        let manifest = Self { entries };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_streams(view: &StreamView) -> Result<Self, OperatorError> {
        Self::new(
            view.streams()
                .iter()
                .map(|s| ManifestEntry {
                    data_type: s.data_type.clone(),
                    name: s.name.clone(),
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_streams(&self) -> Vec<StreamDecl> {
        self.entries
            .iter()
            .map(|e| StreamDecl::new(e.name.clone(), e.data_type.clone()))
            .collect()
    }

    fn validate(&self) -> Result<(), OperatorError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(OperatorError::format_err(format!(
                    "stream '{}' appears twice in manifest",
                    entry.name
                )));
            }
        }
        Ok(())
    }
}

fn codec_err(e: bincode::Error, what: &str) -> OperatorError {
    match *e {
        bincode::ErrorKind::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            OperatorError::format_err(format!("truncated {what}"))
        }
        bincode::ErrorKind::Io(io) => OperatorError::from(io),
        other => OperatorError::format_err(format!("malformed {what}: {other}")),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Writer
// ═══════════════════════════════════════════════════════════════

/// Append-only writer. Every record is flushed as soon as it is written.
pub struct RecordWriter<W: Write> {
    inner: BufWriter<W>,
    written: u64,
}

impl RecordWriter<File> {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OperatorError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| OperatorError::from(e).with_context(path.display()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            written: 0,
        }
    }

    pub fn write_manifest(&mut self, manifest: &Manifest) -> Result<(), OperatorError> {
        bincode::serialize_into(&mut self.inner, manifest).map_err(|e| codec_err(e, "manifest"))?;
        self.flush()
    }

    pub fn write_message(&mut self, msg: &Message) -> Result<(), OperatorError> {
        bincode::serialize_into(&mut self.inner, msg).map_err(|e| codec_err(e, "message"))?;
        self.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OperatorError> {
        self.inner.flush().map_err(OperatorError::from)
    }

    /// Messages written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

// ═══════════════════════════════════════════════════════════════
//  Reader
// ═══════════════════════════════════════════════════════════════

/// Sequential reader. Call [`read_manifest`](Self::read_manifest) once, then
/// [`next_message`](Self::next_message) until it yields `None`.
pub struct RecordReader<R: Read> {
    inner: BufReader<R>,
    read: u64,
}

impl RecordReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OperatorError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| OperatorError::from(e).with_context(path.display()))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            read: 0,
        }
    }

    pub fn read_manifest(&mut self) -> Result<Manifest, OperatorError> {
        let manifest: Manifest =
            bincode::deserialize_from(&mut self.inner).map_err(|e| codec_err(e, "manifest"))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Next message, `None` at a clean end of file. Bytes that stop short of
    /// a whole message are a `Format` error.
    pub fn next_message(&mut self) -> Result<Option<Message>, OperatorError> {
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let msg: Message = bincode::deserialize_from(&mut self.inner)
            .map_err(|e| codec_err(e, "message").with_context(format!("record #{}", self.read + 1)))?;
        self.read += 1;
        Ok(Some(msg))
    }

    /// Messages read so far.
    pub fn read(&self) -> u64 {
        self.read
    }
}
