use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;

use crate::aggregate::Snapshot;
use crate::error::{Error, Result};

/// Receives the assembled grid from the coordinating worker once the run has
/// finished. A failure here fails the whole group.
pub trait GridWriter {
    fn write(&self, snapshot: &Snapshot) -> Result<()>;
}

/// On-disk format of the final grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// One grid row per line, each value with two decimals followed by a
    /// space.
    Text,
    /// The snapshot struct, CBOR-encoded.
    Cbor,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Format::Text),
            "cbor" => Ok(Format::Cbor),
            _ => Err(format!("unknown output format '{}' (expected text or cbor)", s)),
        }
    }
}

/// Writes the grid to a file in the given format.
#[derive(Clone, Debug)]
pub struct FileWriter {
    path: PathBuf,
    format: Format,
}

impl FileWriter {
    pub fn new<P: AsRef<Path>>(path: P, format: Format) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GridWriter for FileWriter {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let fail = |msg: String| Error::Output(format!("{}: {}", self.path.display(), msg));
        let file = File::create(&self.path).map_err(|e| fail(e.to_string()))?;
        let mut buffer = BufWriter::new(file);

        match self.format {
            Format::Text => write_text(&mut buffer, snapshot).map_err(|e| fail(e.to_string()))?,
            Format::Cbor => ciborium::ser::into_writer(snapshot, &mut buffer)
                .map_err(|e| fail(format!("{:?}", e)))?,
        }
        buffer.flush().map_err(|e| fail(e.to_string()))?;

        info!("Output written to {}", self.path.display());
        Ok(())
    }
}

/// Discards the grid. For runs that only care about timing.
pub struct NullWriter;

impl GridWriter for NullWriter {
    fn write(&self, _: &Snapshot) -> Result<()> {
        Ok(())
    }
}

/// Format the grid as text: one row per line, `{:.2}` values each followed
/// by a single space.
pub fn write_text<W: Write>(out: &mut W, snapshot: &Snapshot) -> std::io::Result<()> {
    for row in snapshot.rows() {
        for value in row {
            write!(out, "{:.2} ", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
