use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::codec::FileFormat;
use crate::error::{Result, SortError};

/// A flat file to be sorted or reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    pub path: PathBuf,
    #[serde(default = "default_has_header")]
    pub has_header: bool,
    #[serde(default)]
    pub format: FileFormat,
}

fn default_has_header() -> bool {
    true
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            path: path.into(),
            has_header: true,
            format,
        }
    }

    pub fn delimited(path: impl Into<PathBuf>, delimiter: char) -> Self {
        Self::new(path, FileFormat::delimited(delimiter))
    }

    pub fn fixed_width(path: impl Into<PathBuf>, widths: Vec<usize>) -> Self {
        Self::new(path, FileFormat::fixed_width(widths))
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.is_file() {
            return Err(SortError::SourceNotFound(self.path.clone()));
        }
        self.format.validate()
    }

    /// `<folder>/<stem>_<suffix>.<ext>`, keeping the source extension.
    pub fn derived_path(&self, folder: &Path, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
            None => format!("{}_{}", stem, suffix),
        };
        folder.join(name)
    }

    pub fn open_lines(&self, buffer_size: usize) -> Result<LineReader> {
        LineReader::open(&self.path, buffer_size)
    }
}

/// Reads a file line by line, stripping `\n` and `\r\n` terminators.
pub struct LineReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_number: usize,
}

impl LineReader {
    pub fn open(path: &Path, buffer_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(buffer_size, file),
            buf: Vec::new(),
            line_number: 0,
        })
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        match std::str::from_utf8(&self.buf) {
            Ok(line) => Ok(Some(line.to_string())),
            Err(_) => {
                warn!("Line {} is not valid UTF-8, replacing invalid bytes", self.line_number);
                Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
            }
        }
    }
}
