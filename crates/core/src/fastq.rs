//! Paired-end FASTQ reading and writing, with transparent gzip based on the
//! file extension

use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// One paired-end read: an identifier plus both mates' sequences and
/// per-base quality strings. Within each mate, sequence and quality have the
/// same length.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadPair {
    pub id: String,
    pub seq1: String,
    pub qual1: String,
    pub seq2: String,
    pub qual2: String,
}

#[derive(Debug, Error)]
pub enum FastqError {
    #[error("Error opening {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error reading {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Truncated FASTQ record in {path:?}")]
    Truncated { path: PathBuf },

    #[error("Sequence and quality lengths differ for read `{id}`")]
    LengthMismatch { id: String },
}

/// Line-oriented reader over one (possibly gzipped) FASTQ file
struct RecordReader {
    path: PathBuf,
    reader: Box<dyn BufRead>,
}

impl RecordReader {
    fn open(path: &Path) -> Result<Self, FastqError> {
        let file = File::open(path).map_err(|source| FastqError::Open {
            path: path.to_owned(),
            source,
        })?;
        let reader: Box<dyn BufRead> =
            if path.extension().is_some_and(|ext| ext == "gz") {
                Box::new(BufReader::new(MultiGzDecoder::new(file)))
            } else {
                Box::new(BufReader::new(file))
            };
        Ok(Self {
            path: path.to_owned(),
            reader,
        })
    }

    /// Read one line with the terminator stripped; `None` at EOF
    fn line(&mut self) -> Result<Option<String>, FastqError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(|source| {
            FastqError::Read {
                path: self.path.clone(),
                source,
            }
        })?;
        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Read one four-line record; `None` at a clean end of file. EOF in the
    /// middle of a record is an error.
    fn record(
        &mut self,
    ) -> Result<Option<(String, String, String)>, FastqError> {
        let Some(id) = self.line()? else {
            return Ok(None);
        };
        let seq = self.required_line()?;
        self.required_line()?; // the '+' separator
        let qual = self.required_line()?;
        Ok(Some((id, seq, qual)))
    }

    fn required_line(&mut self) -> Result<String, FastqError> {
        self.line()?.ok_or_else(|| FastqError::Truncated {
            path: self.path.clone(),
        })
    }
}

/// Iterator over paired R1/R2 FASTQ files, yielding one [ReadPair] per
/// record. Iteration ends when either file is exhausted.
pub struct FastqReader {
    r1: RecordReader,
    r2: RecordReader,
    trim_tail: bool,
}

impl FastqReader {
    pub fn open(r1: &Path, r2: &Path) -> Result<Self, FastqError> {
        Ok(Self {
            r1: RecordReader::open(r1)?,
            r2: RecordReader::open(r2)?,
            trim_tail: false,
        })
    }

    /// If enabled, truncate everything in the header line after the first
    /// whitespace character
    #[must_use]
    pub fn trim_tail(mut self, trim_tail: bool) -> Self {
        self.trim_tail = trim_tail;
        self
    }
}

impl Iterator for FastqReader {
    type Item = Result<ReadPair, FastqError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id_line, seq1, qual1) = match self.r1.record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(error) => return Some(Err(error)),
        };
        let (_, seq2, qual2) = match self.r2.record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(error) => return Some(Err(error)),
        };

        let mut id = id_line.trim_start_matches('@').to_owned();
        if self.trim_tail {
            id = id
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_owned();
        }
        if seq1.len() != qual1.len() || seq2.len() != qual2.len() {
            return Some(Err(FastqError::LengthMismatch { id }));
        }
        Some(Ok(ReadPair {
            id,
            seq1,
            qual1,
            seq2,
            qual2,
        }))
    }
}

/// Writes paired-end reads to a pair of gzipped FASTQ files
pub struct FastqWriter {
    r1: BufWriter<GzEncoder<File>>,
    r2: BufWriter<GzEncoder<File>>,
}

impl FastqWriter {
    /// Create `<stub>.R1.fastq.gz` and `<stub>.R2.fastq.gz` in the output
    /// directory, truncating existing files
    pub fn create(
        output_dir: &Path,
        stub: &str,
    ) -> Result<Self, FastqError> {
        let open = |name: String| -> Result<_, FastqError> {
            let path = output_dir.join(name);
            let file =
                File::create(&path).map_err(|source| FastqError::Open {
                    path: path.clone(),
                    source,
                })?;
            // Low compression: these files are intermediate artifacts
            Ok(BufWriter::new(GzEncoder::new(
                file,
                Compression::new(3),
            )))
        };
        Ok(Self {
            r1: open(format!("{stub}.R1.fastq.gz"))?,
            r2: open(format!("{stub}.R2.fastq.gz"))?,
        })
    }

    /// Write a single pair, one record per output file
    pub fn write(&mut self, pair: &ReadPair) -> io::Result<()> {
        let ReadPair {
            id,
            seq1,
            qual1,
            seq2,
            qual2,
        } = pair;
        write!(self.r1, "@{id}\n{seq1}\n+\n{qual1}\n")?;
        write!(self.r2, "@{id}\n{seq2}\n+\n{qual2}\n")?;
        Ok(())
    }

    /// Flush both gzip streams and close the files. Dropping the writer
    /// without calling this produces truncated gzip output.
    pub fn finish(self) -> io::Result<()> {
        for writer in [self.r1, self.r2] {
            let encoder = writer
                .into_inner()
                .map_err(io::IntoInnerError::into_error)?;
            encoder.finish()?;
        }
        Ok(())
    }
}
