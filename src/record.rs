//! The acquisition output file: one CSV record per time step, written as chunks arrive.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What to do when the output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Ask,
    Overwrite,
    Refuse,
}

/// Creates `path` for writing, together with any missing parent directories. If the file exists,
/// `policy` decides; with `OverwritePolicy::Ask` the decision is left to `confirm`.
pub fn create_output_file<F>(path: &Path, policy: OverwritePolicy, confirm: F) -> Result<File>
        where F: FnOnce(&Path) -> io::Result<bool> {
    if path.exists() {
        let proceed = match policy {
            OverwritePolicy::Overwrite => true,
            OverwritePolicy::Refuse => false,
            OverwritePolicy::Ask => confirm(path)?,
        };
        if !proceed {
            return Err(Error::Declined(path.to_owned()))
        }
        log::warn!("overwriting {}", path.display());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// Asks on `output` whether `path` may be overwritten. Only an answer starting with `y`
/// counts as yes.
pub fn confirm_overwrite<R: BufRead, W: Write>(path: &Path, mut input: R, mut output: W)
        -> io::Result<bool> {
    write!(output, "{} already exists and will be overwritten! Continue anyway? (y/n) ",
           path.display())?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim_start().to_lowercase().starts_with('y'))
}

/// Writes interleaved samples as rows of `num_chans` values, in ascending channel order.
pub struct Recorder<W: Write> {
    writer: csv::Writer<W>,
    num_chans: usize,
    row: Vec<f64>,
    rows: u64,
    /// Rows per second, when a time column is written.
    time_base: Option<u32>,
}

impl<W: Write> Recorder<W> {
    pub fn new(sink: W, num_chans: usize) -> Result<Recorder<W>> {
        Self::with_time_base(sink, num_chans, None)
    }

    pub fn with_time_base(sink: W, num_chans: usize, time_base: Option<u32>)
            -> Result<Recorder<W>> {
        assert!(num_chans > 0);
        let mut writer = csv::Writer::from_writer(sink);
        let mut header = Vec::with_capacity(num_chans + 1);
        if time_base.is_some() {
            header.push("Time".to_owned());
        }
        header.extend((0..num_chans).map(|channel| format!("Channel {}", channel)));
        writer.write_record(&header)?;
        Ok(Recorder { writer, num_chans, row: Vec::with_capacity(num_chans), rows: 0, time_base })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Appends samples in channel-major order. A row is emitted once its last channel arrives;
    /// a row left incomplete is continued by the next call.
    pub fn push(&mut self, samples: &[f64]) -> Result<()> {
        for &sample in samples {
            self.row.push(sample);
            if self.row.len() == self.num_chans {
                self.write_row()?;
            }
        }
        Ok(())
    }

    fn write_row(&mut self) -> Result<()> {
        let mut record = csv::StringRecord::with_capacity(16 * (self.num_chans + 1), self.num_chans + 1);
        if let Some(rate) = self.time_base {
            record.push_field(&(self.rows as f64 / rate as f64).to_string());
        }
        for value in self.row.drain(..) {
            record.push_field(&value.to_string());
        }
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    /// Flushes the file and returns the number of rows written.
    pub fn finish(mut self) -> Result<u64> {
        if !self.row.is_empty() {
            log::warn!("dropping incomplete row of {} out of {} channels",
                       self.row.len(), self.num_chans);
            self.row.clear();
        }
        self.flush()?;
        Ok(self.rows)
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|error| {
            Error::Io(io::Error::new(error.error().kind(), error.error().to_string()))
        })
    }
}
