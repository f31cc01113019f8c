//! Boundary to the vendor DAQ driver.
//!
//! The driver owns all scan timing and the hardware-backed buffers; this crate only starts and
//! stops scans, polls their status, and moves data in and out of driver buffers.

use bitflags::bitflags;

use crate::Result;
use crate::params::AnalogRange;

pub mod sim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    AnalogInput,
    AnalogOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStatus {
    pub status: Status,
    /// Samples transferred since the scan was started, summed over all channels.
    pub count: u64,
    /// Buffer position of the most recently transferred sample.
    pub index: Option<usize>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanOptions: u32 {
        const Background = 1<<0;
        const Continuous = 1<<1;
        const ScaleData  = 1<<2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Device codes, used for output scans.
    Raw,
    /// Samples in volts, used for input scans with `ScanOptions::ScaleData`.
    Scaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub fn new(id: u32) -> BufferHandle {
        BufferHandle(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalogInfo {
    pub num_chans: usize,
    /// Some devices require scan buffers to be a multiple of this many points per channel.
    pub packet_size: usize,
    /// Converter resolution in bits.
    pub resolution: u32,
    pub supported_ranges: Vec<AnalogRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardInfo {
    pub product_name: String,
    pub unique_id: String,
    pub analog_input: Option<AnalogInfo>,
    pub analog_output: Option<AnalogInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanRequest {
    pub low_chan: usize,
    pub high_chan: usize,
    /// Buffer length in samples; for continuous scans, the ring capacity.
    pub count: usize,
    /// Points per channel per second.
    pub rate: u32,
    pub range: AnalogRange,
    pub options: ScanOptions,
}

impl ScanRequest {
    pub fn num_chans(&self) -> usize {
        self.high_chan - self.low_chan + 1
    }
}

pub trait Driver {
    fn board_info(&self) -> Result<BoardInfo>;

    fn alloc_buffer(&self, kind: BufferKind, count: usize) -> Result<BufferHandle>;
    fn free_buffer(&self, handle: BufferHandle) -> Result<()>;

    fn write_buffer(&self, handle: BufferHandle, first_point: usize, data: &[u16]) -> Result<()>;
    /// Copies `data.len()` samples starting at `first_point`. The range must not wrap around
    /// the end of the buffer.
    fn copy_scaled(&self, handle: BufferHandle, first_point: usize, data: &mut [f64]) -> Result<()>;

    /// Starts a background scan and returns without waiting for it to begin.
    fn start_scan(&self, function: Function, request: &ScanRequest, handle: BufferHandle) -> Result<()>;
    fn stop_scan(&self, function: Function) -> Result<()>;
    fn status(&self, function: Function) -> Result<ScanStatus>;

    fn v_out(&self, channel: usize, range: AnalogRange, volts: f64) -> Result<()>;

    fn from_eng_units(&self, range: AnalogRange, volts: f64) -> Result<u16>;
    fn to_eng_units(&self, range: AnalogRange, code: u16) -> Result<f64>;
}
