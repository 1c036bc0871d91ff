//! Raw study record sources
//!
//! A source is any iterator of `SourceResult<RawStudy>`. [`JsonFileSource`]
//! reads either a JSON array of studies or JSON-lines (one study per line).
//! Either way a record that does not fit the study shape is reported on its
//! own and the records after it are still yielded.

use crate::model::RawStudy;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid study record at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid study record at array index {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Stream of raw study records
pub trait RecordSource: Iterator<Item = SourceResult<RawStudy>> {}

impl<I: Iterator<Item = SourceResult<RawStudy>>> RecordSource for I {}

enum Inner {
    Array(std::iter::Enumerate<std::vec::IntoIter<serde_json::Value>>),
    Lines {
        reader: Box<dyn BufRead + Send>,
        line: usize,
    },
    Failed(Option<SourceError>),
}

/// JSON array or JSON-lines study file
pub struct JsonFileSource {
    inner: Inner,
}

impl JsonFileSource {
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Sniff the format from the first non-whitespace byte: `[` means array.
    pub fn from_reader(reader: impl Read + Send + 'static) -> SourceResult<Self> {
        let mut reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(reader));
        let mut skipped_lines = 0usize;

        let is_array = loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break false;
            }
            match buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(pos) => {
                    skipped_lines += buf[..pos].iter().filter(|&&b| b == b'\n').count();
                    let first = buf[pos];
                    reader.consume(pos);
                    break first == b'[';
                }
                None => {
                    let len = buf.len();
                    skipped_lines += buf.iter().filter(|&&b| b == b'\n').count();
                    reader.consume(len);
                }
            }
        };

        let inner = if is_array {
            // Only the array syntax is checked here; elements are typed lazily.
            match serde_json::from_reader::<_, Vec<serde_json::Value>>(reader) {
                Ok(elements) => Inner::Array(elements.into_iter().enumerate()),
                Err(source) => Inner::Failed(Some(SourceError::Parse {
                    line: source.line() + skipped_lines,
                    source,
                })),
            }
        } else {
            Inner::Lines {
                reader,
                line: skipped_lines,
            }
        };
        Ok(Self { inner })
    }
}

impl Iterator for JsonFileSource {
    type Item = SourceResult<RawStudy>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Array(elements) => elements.next().map(|(index, value)| {
                serde_json::from_value(value).map_err(|source| SourceError::Element { index, source })
            }),
            Inner::Failed(err) => err.take().map(Err),
            Inner::Lines { reader, line } => loop {
                let mut buf = String::new();
                match reader.read_line(&mut buf) {
                    Ok(0) => return None,
                    Ok(_) => {
                        *line += 1;
                        if buf.trim().is_empty() {
                            continue;
                        }
                        return Some(serde_json::from_str(&buf).map_err(|source| SourceError::Parse {
                            line: *line,
                            source,
                        }));
                    }
                    Err(e) => return Some(Err(e.into())),
                }
            },
        }
    }
}
