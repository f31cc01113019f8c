mod sys;
mod config;
mod params;
mod waveform;
mod capture;
mod record;
mod table;
mod drain;
mod device;

use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    NotSupported(&'static str),
    Allocation { samples: usize },
    Overrun { produced: u64, consumed: u64, capacity: usize },
    ScanHalted { consumed: u64 },
    InvalidState(String),
    Declined(PathBuf),
    InvalidConfig(String),
    InvalidData(String),
    Driver(String),
    Io(io::Error),
    Csv(csv::Error),
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl Error {
    /// Whether the error is a ring buffer overrun, as opposed to a device or configuration fault.
    pub fn is_overrun(&self) -> bool {
        matches!(self, Self::Overrun { .. })
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotSupported(function) =>
                write!(f, "the DAQ device does not support {}", function),
            Self::Allocation { samples } =>
                write!(f, "failed to allocate a driver buffer of {} samples", samples),
            Self::Overrun { produced, consumed, capacity } =>
                write!(f, "buffer overrun: {} samples produced, {} consumed, capacity {}",
                       produced, consumed, capacity),
            Self::ScanHalted { consumed } =>
                write!(f, "scan stopped unexpectedly after {} samples", consumed),
            Self::InvalidState(message) =>
                write!(f, "invalid state: {}", message),
            Self::Declined(path) =>
                write!(f, "not overwriting {}", path.display()),
            Self::InvalidConfig(message) =>
                write!(f, "invalid configuration: {}", message),
            Self::InvalidData(message) =>
                write!(f, "invalid data: {}", message),
            Self::Driver(message) =>
                write!(f, "driver error: {}", message),
            Self::Io(io_error) =>
                write!(f, "I/O error: {}", io_error),
            Self::Csv(csv_error) =>
                write!(f, "CSV error: {}", csv_error),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Io(ref io_error) => Some(io_error),
            &Self::Csv(ref csv_error) => Some(csv_error),
            _ => None
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) => Error::Io(error),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Error::Csv(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::InvalidConfig(error.to_string())
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::{
    Function,
    Status,
    ScanStatus,
    ScanOptions,
    ScanRequest,
    BufferKind,
    BufferHandle,
    AnalogInfo,
    BoardInfo,
    Driver,
};

pub use sys::sim::{
    Pacing,
    Signal,
    OutputEvent,
    SimulatedBoard,
};

pub use config::{
    InputConfiguration,
    OutputConfiguration,
    TableSource,
    StitchConfiguration,
    SimulationConfiguration,
    Configuration,
};

pub use params::{
    AnalogRange,
    InputParameters,
    OutputParameters,
};

pub use waveform::{
    Shape,
    Waveform,
};

pub use capture::{
    RingCursor,
    WriteChunk,
    is_overrun,
};

pub use record::{
    OverwritePolicy,
    Recorder,
    create_output_file,
    confirm_overwrite,
};

pub use table::{
    SampleTable,
    silence_rows,
    stitch_directory,
};

pub use drain::{
    DrainState,
    Step,
    Drain,
};

pub use device::{
    SampleSource,
    OutputReport,
    AcquisitionReport,
    Device,
};

pub type SimulatedDevice =
    device::Device<sys::sim::SimulatedBoard>;
