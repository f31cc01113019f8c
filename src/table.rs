//! Numeric CSV tables: pre-recorded stimulus and the snippets it is stitched from.

use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};
use crate::config::StitchConfiguration;

/// Number of zero rows that make up `seconds` of silence at `rate` rows per second.
pub fn silence_rows(seconds: f64, rate: u32) -> usize {
    (seconds * rate as f64).round() as usize
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    headers: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl SampleTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<f64>>) -> Result<SampleTable> {
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != headers.len()) {
            return Err(Error::InvalidData(format!(
                "row {} has {} values, expected {}", index, row.len(), headers.len())))
        }
        Ok(SampleTable { headers, rows })
    }

    pub fn read<R: io::Read>(reader: R) -> Result<SampleTable> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_owned).collect::<Vec<_>>();
        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let row = record.iter()
                .map(|field| field.trim().parse::<f64>().map_err(|error| {
                    Error::InvalidData(format!("row {}: {:?}: {}", index, field, error))
                }))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        SampleTable::new(headers, rows)
    }

    pub fn load(path: &Path) -> Result<SampleTable> {
        let table = SampleTable::read(std::fs::File::open(path)?)?;
        log::debug!("loaded {} rows of {:?} from {}", table.len(), table.headers, path.display());
        Ok(table)
    }

    pub fn write<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.write(std::fs::File::create(path)?)?;
        log::info!("wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.rows[row][column]
    }

    pub fn column(&self, column: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[column])
    }

    /// Concatenates `snippets`, separated by `silence` rows of zeros, then adds `offset` to
    /// every value. No silence follows the last snippet.
    pub fn stitch(snippets: &[SampleTable], silence: usize, offset: f64) -> Result<SampleTable> {
        let Some(first) = snippets.first() else {
            return Err(Error::InvalidData("nothing to stitch".into()))
        };
        if let Some(other) = snippets.iter().find(|snippet| snippet.headers != first.headers) {
            return Err(Error::InvalidData(format!(
                "header mismatch: {:?} vs {:?}", first.headers, other.headers)))
        }
        let width = first.width();
        let total = snippets.iter().map(SampleTable::len).sum::<usize>()
            + silence * (snippets.len() - 1);
        let mut rows = Vec::with_capacity(total);
        for (index, snippet) in snippets.iter().enumerate() {
            if index > 0 {
                rows.extend(std::iter::repeat_with(|| vec![0.0; width]).take(silence));
            }
            rows.extend(snippet.rows.iter().cloned());
        }
        if offset != 0.0 {
            rows.iter_mut().flatten().for_each(|value| *value += offset);
        }
        Ok(SampleTable { headers: first.headers.clone(), rows })
    }
}

fn snippet_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|extension| extension == "csv") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Stitches every `*.csv` snippet in `config.input_dir`, in file name order.
pub fn stitch_directory(config: &StitchConfiguration) -> Result<SampleTable> {
    let paths = snippet_paths(&config.input_dir)?;
    let output = std::fs::canonicalize(&config.output_path).ok();
    let mut snippets = Vec::with_capacity(paths.len());
    for path in paths {
        // re-running in place must not stitch the previous result
        if output.is_some() && std::fs::canonicalize(&path).ok() == output {
            log::warn!("skipping {}, it is the output file", path.display());
            continue
        }
        log::info!("reading {}", path.display());
        snippets.push(SampleTable::load(&path)?);
    }
    let silence = silence_rows(config.silence_secs, config.rate);
    log::debug!("{} snippets, {} rows of silence between each", snippets.len(), silence);
    SampleTable::stitch(&snippets, silence, config.offset)
}
