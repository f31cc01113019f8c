use std::io::Write;
use std::time::Duration;

use crate::{Error, Result};
use crate::config::{InputConfiguration, OutputConfiguration};
use crate::drain::{Drain, pause};
use crate::params::{AnalogRange, InputParameters, OutputParameters};
use crate::record::Recorder;
use crate::sys::{BoardInfo, BufferHandle, BufferKind, Driver, Function, ScanOptions, ScanRequest, Status};
use crate::table::SampleTable;
use crate::waveform::Waveform;

/// A driver buffer that is freed when dropped.
#[derive(Debug)]
struct DriverBuffer<'d, D: Driver> {
    driver: &'d D,
    handle: BufferHandle,
}

impl<'d, D: Driver> DriverBuffer<'d, D> {
    fn alloc(driver: &'d D, kind: BufferKind, count: usize) -> Result<DriverBuffer<'d, D>> {
        let handle = driver.alloc_buffer(kind, count)?;
        log::debug!("allocated {:?} buffer #{} of {} samples", kind, handle.id(), count);
        Ok(DriverBuffer { driver, handle })
    }

    fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl<'d, D: Driver> Drop for DriverBuffer<'d, D> {
    fn drop(&mut self) {
        match self.driver.free_buffer(self.handle) {
            Ok(()) => log::debug!("freed buffer #{}", self.handle.id()),
            Err(error) => log::warn!("failed to free buffer #{}: {}", self.handle.id(), error),
        }
    }
}

/// What the output scan plays.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSource {
    /// One generated waveform per output channel, lasting the configured duration.
    Functions(Vec<Waveform>),
    /// Selected columns of a table, one per output channel, one row per point.
    Table { table: SampleTable, columns: Vec<usize> },
}

impl SampleSource {
    fn points_per_channel(&self, config: &OutputConfiguration) -> usize {
        match self {
            SampleSource::Functions(_) => config.points_per_channel(),
            SampleSource::Table { table, .. } => table.len(),
        }
    }

    fn validate(&self, num_chans: usize) -> Result<()> {
        match self {
            SampleSource::Functions(waveforms) if waveforms.len() < num_chans =>
                Err(Error::InvalidConfig(format!(
                    "{} waveforms for {} output channels", waveforms.len(), num_chans))),
            SampleSource::Functions(_) => Ok(()),
            SampleSource::Table { columns, .. } if columns.len() < num_chans =>
                Err(Error::InvalidConfig(format!(
                    "{} table columns for {} output channels", columns.len(), num_chans))),
            SampleSource::Table { table, columns } => {
                match columns[..num_chans].iter().find(|&&column| column >= table.width()) {
                    Some(column) => Err(Error::InvalidConfig(format!(
                        "no column {} in a table of {}", column, table.width()))),
                    None => Ok(()),
                }
            }
        }
    }

    fn value(&self, channel: usize, point: usize, rate: u32) -> f64 {
        match self {
            SampleSource::Functions(waveforms) => waveforms[channel].value(point, rate),
            SampleSource::Table { table, columns } => table.value(point, columns[channel]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputReport {
    pub num_chans: usize,
    pub points_per_channel: usize,
    pub rate: u32,
}

impl OutputReport {
    pub fn secs(&self) -> f64 {
        self.points_per_channel as f64 / self.rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Samples drained from the ring, all channels together.
    pub samples: u64,
    pub rows: u64,
    pub num_chans: usize,
}

#[derive(Debug)]
pub struct Device<D: Driver> {
    driver: D,
}

impl<D: Driver> Device<D> {
    pub fn new(driver: D) -> Device<D> {
        Device { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn board_info(&self) -> Result<BoardInfo> {
        let info = self.driver.board_info()?;
        log::info!("active DAQ device: {} ({})", info.product_name, info.unique_id);
        Ok(info)
    }

    /// Sets every output channel below `num_chans` to 0 V.
    pub fn zero_outputs(&self, num_chans: usize, range: AnalogRange) -> Result<()> {
        for channel in 0..num_chans {
            self.driver.v_out(channel, range, 0.0)?;
        }
        log::debug!("outputs 0..{} set to 0 V", num_chans);
        Ok(())
    }

    pub fn wait_idle(&self, function: Function, interval: Duration) -> Result<()> {
        loop {
            let status = self.driver.status(function)?;
            if status.status == Status::Idle {
                return Ok(())
            }
            log::trace!("{:?} running, {} samples", function, status.count);
            pause(interval);
        }
    }

    /// Plays `source` once on the analog outputs and returns when the scan has finished.
    /// Every channel is held at 0 V before and after.
    pub fn play(&self, config: &OutputConfiguration, source: &SampleSource) -> Result<OutputReport> {
        let board = self.board_info()?;
        let params = OutputParameters::derive(&board, config, source.points_per_channel(config))?;
        source.validate(params.num_chans)?;
        log::info!("playing {} points on {} channels at {} Hz ({:.3} s)",
                   params.points_per_channel, params.num_chans, params.rate, params.sample_secs());

        let mut codes = Vec::with_capacity(params.total_count);
        for point in 0..params.points_per_channel {
            for channel in 0..params.num_chans {
                let volts = source.value(channel, point, params.rate);
                codes.push(self.driver.from_eng_units(params.range, volts)?);
            }
        }

        let buffer = DriverBuffer::alloc(&self.driver, BufferKind::Raw, params.total_count)?;
        self.driver.write_buffer(buffer.handle(), 0, &codes)?;

        self.zero_outputs(params.num_chans, params.range)?;
        self.wait_idle(Function::AnalogOutput, config.poll_interval())?;

        let request = ScanRequest {
            low_chan: params.low_chan,
            high_chan: params.high_chan,
            count: params.total_count,
            rate: params.rate,
            range: params.range,
            options: ScanOptions::Background,
        };
        self.driver.start_scan(Function::AnalogOutput, &request, buffer.handle())?;
        log::debug!("output scan started: {:?}", request);
        self.wait_idle(Function::AnalogOutput, config.poll_interval())?;
        log::info!("output scan finished");

        self.zero_outputs(params.num_chans, params.range)?;
        Ok(OutputReport {
            num_chans: params.num_chans,
            points_per_channel: params.points_per_channel,
            rate: params.rate,
        })
    }

    /// Records a continuous input scan into `sink` as CSV. Rows written before a failure
    /// are flushed to `sink` either way.
    pub fn acquire<W: Write>(&self, config: &InputConfiguration, sink: W) -> Result<AcquisitionReport> {
        let board = self.board_info()?;
        let params = InputParameters::derive(&board, config)?;
        log::info!("recording {} channels at {} Hz for {:.3} s, ring of {} samples",
                   params.num_chans, params.rate, params.scan_secs(), params.buffer_count);

        let buffer = DriverBuffer::alloc(&self.driver, BufferKind::Scaled, params.buffer_count)?;
        let time_base = config.time_column.then_some(params.rate);
        let mut recorder = Recorder::with_time_base(sink, params.num_chans, time_base)?;
        let mut drain = Drain::new(&self.driver, buffer.handle(), params, config.poll_interval());
        let result = drain.run(&mut recorder);
        let rows = recorder.finish();
        let samples = result?;
        Ok(AcquisitionReport { samples, rows: rows?, num_chans: params.num_chans })
    }
}
