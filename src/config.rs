//! Run configuration in terms of physical quantities. Every field has the default a bench run
//! starts from; a TOML file only needs to name what it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::params::AnalogRange;
use crate::record::OverwritePolicy;
use crate::waveform::Waveform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfiguration {
    /// Points per channel per second.
    pub rate: u32,
    /// How long to record. Should outlast the stimulus played on the other board.
    pub scan_secs: f64,
    /// Channels to record, starting at channel 0; bounded by what the device has.
    pub channels: usize,
    /// Ring buffer length in seconds of data.
    pub buffer_secs: f64,
    /// The ring is drained in chunks of this fraction of its capacity.
    pub chunks_per_buffer: usize,
    /// Input range; the device's first supported range if unset.
    pub range: Option<AnalogRange>,
    pub output_path: PathBuf,
    pub overwrite: OverwritePolicy,
    /// Prefix every row with its time in seconds.
    pub time_column: bool,
    /// Wait between status polls while no chunk is ready; zero only yields the thread.
    pub poll_interval_ms: u64,
}

impl Default for InputConfiguration {
    fn default() -> Self {
        Self {
            rate: 500,
            scan_secs: 100.0,
            channels: 1,
            buffer_secs: 2.0,
            chunks_per_buffer: 10,
            range: None,
            output_path: PathBuf::from("Board1_Test.csv"),
            overwrite: OverwritePolicy::Ask,
            time_column: false,
            poll_interval_ms: 0,
        }
    }
}

impl InputConfiguration {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where `daq-data-output` finds its pre-recorded stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSource {
    pub path: PathBuf,
    /// Table columns played on output channels 0, 1, ... in that order.
    pub columns: Vec<usize>,
}

impl Default for TableSource {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Files_combined.csv"),
            columns: vec![1, 2, 3, 4], // column 0 is time, column 5 is the target
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfiguration {
    pub rate: u32,
    /// Length of generated waveforms; tables play for as many rows as they have.
    pub duration_secs: f64,
    pub channels: usize,
    pub range: Option<AnalogRange>,
    /// Status poll interval while waiting for the device to go idle.
    pub poll_interval_ms: u64,
    pub waveforms: Vec<Waveform>,
    pub table: TableSource,
}

impl Default for OutputConfiguration {
    fn default() -> Self {
        Self {
            rate: 500,
            duration_secs: 10.0,
            channels: 4,
            range: None,
            poll_interval_ms: 500,
            waveforms: vec![Waveform::default(); 4],
            table: TableSource::default(),
        }
    }
}

impl OutputConfiguration {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn points_per_channel(&self) -> usize {
        (self.duration_secs * self.rate as f64).round() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfiguration {
    /// Every `*.csv` file in here is a snippet.
    pub input_dir: PathBuf,
    pub output_path: PathBuf,
    /// Row rate of the snippets.
    pub rate: u32,
    /// Length of the 0 V gap between snippets.
    pub silence_secs: f64,
    /// Added to every value of the stitched table.
    pub offset: f64,
}

impl Default for StitchConfiguration {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_path: PathBuf::from("Files_combined.csv"),
            rate: 100,
            silence_secs: 0.2,
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfiguration {
    pub analog_inputs: usize,
    pub analog_outputs: usize,
    pub packet_size: usize,
    pub resolution: u32,
    /// Largest buffer the simulated driver agrees to allocate, in samples.
    pub max_buffer: usize,
    /// What the simulated inputs see, one waveform per channel.
    pub signal: Vec<Waveform>,
}

impl Default for SimulationConfiguration {
    fn default() -> Self {
        Self {
            analog_inputs: 8,
            analog_outputs: 4,
            packet_size: 1,
            resolution: 16,
            max_buffer: 16 << 20,
            signal: vec![Waveform::default()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub input: InputConfiguration,
    pub output: OutputConfiguration,
    pub stitch: StitchConfiguration,
    pub simulation: SimulationConfiguration,
}

impl Configuration {
    pub fn from_toml(text: &str) -> Result<Configuration> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Configuration> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::debug!("loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Loads `path` if given, otherwise starts from the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Configuration> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
