//! A software stand-in for the DAQ board.
//!
//! Scans advance either with wall-clock time or only when told to, and input samples are written
//! into the scan buffer modulo its length like a real continuous scan. Nothing is written until
//! a status query (or an explicit `advance`) observes the progress, which keeps runs
//! deterministic without a producer thread.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::{Error, Result};
use crate::config::SimulationConfiguration;
use crate::params::AnalogRange;
use crate::waveform::Waveform;
use super::{AnalogInfo, BoardInfo, BufferHandle, BufferKind, Driver, Function};
use super::{ScanOptions, ScanRequest, ScanStatus, Status};

const DEFAULT_MAX_BUFFER: usize = 16 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Scans progress at their configured rate.
    RealTime,
    /// Scans progress only through `SimulatedBoard::advance`.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Every sample holds its own position in the scan: 0, 1, 2, ...
    Ramp,
    /// One waveform per input channel; channels without one read 0 V.
    Waveforms(Vec<Waveform>),
}

impl Signal {
    fn sample(&self, position: u64, low_chan: usize, num_chans: usize, rate: u32) -> f64 {
        match self {
            Signal::Ramp => position as f64,
            Signal::Waveforms(waveforms) => {
                let channel = low_chan + (position % num_chans as u64) as usize;
                let point = (position / num_chans as u64) as usize;
                waveforms.get(channel).map_or(0.0, |waveform| waveform.value(point, rate))
            }
        }
    }
}

/// Activity on the analog outputs, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Level { channel: usize, volts: f64 },
    ScanStarted { count: usize, rate: u32 },
    ScanCompleted { count: usize },
    ScanStopped { produced: u64 },
}

#[derive(Debug)]
enum Buffer {
    Raw(Vec<u16>),
    Scaled(Vec<f64>),
}

#[derive(Debug)]
struct Scan {
    handle: BufferHandle,
    low_chan: usize,
    num_chans: usize,
    count: usize,
    rate: u32,
    continuous: bool,
    started: Instant,
    produced: u64,
}

impl Scan {
    fn new(request: &ScanRequest, handle: BufferHandle) -> Scan {
        Scan {
            handle,
            low_chan: request.low_chan,
            num_chans: request.num_chans(),
            count: request.count,
            rate: request.rate,
            continuous: request.options.contains(ScanOptions::Continuous),
            started: Instant::now(),
            produced: 0,
        }
    }

    fn elapsed_samples(&self) -> u64 {
        let points = (self.started.elapsed().as_secs_f64() * self.rate as f64) as u64;
        points * self.num_chans as u64
    }

    fn limit(&self, target: u64) -> u64 {
        if self.continuous { target } else { target.min(self.count as u64) }
    }

    fn is_done(&self) -> bool {
        !self.continuous && self.produced >= self.count as u64
    }

    fn index(&self) -> Option<usize> {
        self.produced.checked_sub(1).map(|last| (last % self.count as u64) as usize)
    }
}

#[derive(Debug, Default)]
struct State {
    buffers: HashMap<u32, Buffer>,
    next_handle: u32,
    input: Option<Scan>,
    output: Option<Scan>,
    events: Vec<OutputEvent>,
    copy_advance: u64,
}

impl State {
    fn produce_input(&mut self, target: u64, signal: &Signal) {
        let State { input, buffers, .. } = self;
        let Some(scan) = input.as_mut() else { return };
        let target = scan.limit(target);
        if target <= scan.produced { return }
        let capacity = scan.count as u64;
        // only the newest `capacity` samples survive a jump
        let first = scan.produced.max(target.saturating_sub(capacity));
        if let Some(Buffer::Scaled(data)) = buffers.get_mut(&scan.handle.id()) {
            for position in first..target {
                data[(position % capacity) as usize] =
                    signal.sample(position, scan.low_chan, scan.num_chans, scan.rate);
            }
        }
        log::trace!("simulated input {} -> {}", scan.produced, target);
        scan.produced = target;
    }

    fn produce_output(&mut self, target: u64) {
        if let Some(scan) = self.output.as_mut() {
            scan.produced = scan.produced.max(scan.limit(target));
        }
    }
}

#[derive(Debug)]
pub struct SimulatedBoard {
    info: BoardInfo,
    resolution: u32,
    pacing: Pacing,
    signal: Signal,
    max_buffer: usize,
    state: Mutex<State>,
}

impl SimulatedBoard {
    pub fn new(info: BoardInfo) -> SimulatedBoard {
        let resolution = info.analog_output.as_ref()
            .or(info.analog_input.as_ref())
            .map_or(16, |analog| analog.resolution);
        SimulatedBoard {
            info,
            resolution,
            pacing: Pacing::RealTime,
            signal: Signal::Ramp,
            max_buffer: DEFAULT_MAX_BUFFER,
            state: Mutex::new(State::default()),
        }
    }

    pub fn from_configuration(config: &SimulationConfiguration) -> SimulatedBoard {
        let analog = |num_chans| (num_chans > 0).then(|| AnalogInfo {
            num_chans,
            packet_size: config.packet_size.max(1),
            resolution: config.resolution,
            supported_ranges: vec![AnalogRange::BIP10VOLTS, AnalogRange::BIP5VOLTS],
        });
        let info = BoardInfo {
            product_name: "Simulated DAQ".to_owned(),
            unique_id: "SIM-0000".to_owned(),
            analog_input: analog(config.analog_inputs),
            analog_output: analog(config.analog_outputs),
        };
        SimulatedBoard::new(info)
            .with_signal(Signal::Waveforms(config.signal.clone()))
            .with_max_buffer(config.max_buffer)
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> SimulatedBoard {
        self.pacing = pacing;
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> SimulatedBoard {
        self.signal = signal;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> SimulatedBoard {
        self.max_buffer = max_buffer;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::Driver("simulator state poisoned".into()))
    }

    /// Moves every running scan `samples` further along.
    pub fn advance(&self, samples: u64) -> Result<()> {
        let mut state = self.lock()?;
        let input_target = state.input.as_ref().map(|scan| scan.produced + samples);
        if let Some(target) = input_target {
            state.produce_input(target, &self.signal);
        }
        let output_target = state.output.as_ref().map(|scan| scan.produced + samples);
        if let Some(target) = output_target {
            state.produce_output(target);
        }
        Ok(())
    }

    /// Makes the input scan progress by `samples` during every buffer copy, as a producer
    /// racing the consumer would.
    pub fn set_copy_advance(&self, samples: u64) -> Result<()> {
        self.lock()?.copy_advance = samples;
        Ok(())
    }

    pub fn events(&self) -> Result<Vec<OutputEvent>> {
        Ok(self.lock()?.events.clone())
    }

    pub fn allocated_buffers(&self) -> Result<usize> {
        Ok(self.lock()?.buffers.len())
    }

    pub fn is_scanning(&self, function: Function) -> Result<bool> {
        let state = self.lock()?;
        Ok(match function {
            Function::AnalogInput => state.input.is_some(),
            Function::AnalogOutput => state.output.is_some(),
        })
    }

    fn analog_info(&self, function: Function) -> Result<&AnalogInfo> {
        match function {
            Function::AnalogInput =>
                self.info.analog_input.as_ref().ok_or(Error::NotSupported("analog input")),
            Function::AnalogOutput =>
                self.info.analog_output.as_ref().ok_or(Error::NotSupported("analog output")),
        }
    }

    fn sync(&self, state: &mut State) {
        if self.pacing != Pacing::RealTime { return }
        let input_target = state.input.as_ref().map(Scan::elapsed_samples);
        if let Some(target) = input_target {
            state.produce_input(target, &self.signal);
        }
        let output_target = state.output.as_ref().map(Scan::elapsed_samples);
        if let Some(target) = output_target {
            state.produce_output(target);
        }
    }
}

impl Driver for SimulatedBoard {
    fn board_info(&self) -> Result<BoardInfo> {
        Ok(self.info.clone())
    }

    fn alloc_buffer(&self, kind: BufferKind, count: usize) -> Result<BufferHandle> {
        if count == 0 || count > self.max_buffer {
            return Err(Error::Allocation { samples: count })
        }
        let mut state = self.lock()?;
        let id = state.next_handle;
        state.next_handle += 1;
        let buffer = match kind {
            BufferKind::Raw => Buffer::Raw(vec![0; count]),
            BufferKind::Scaled => Buffer::Scaled(vec![0.0; count]),
        };
        state.buffers.insert(id, buffer);
        log::trace!("allocated {:?} buffer #{} of {} samples", kind, id, count);
        Ok(BufferHandle::new(id))
    }

    fn free_buffer(&self, handle: BufferHandle) -> Result<()> {
        let mut state = self.lock()?;
        let in_use = [&state.input, &state.output].into_iter()
            .any(|scan| scan.as_ref().is_some_and(|scan| scan.handle == handle));
        if in_use {
            return Err(Error::Driver(format!("buffer #{} is in use by a scan", handle.id())))
        }
        match state.buffers.remove(&handle.id()) {
            Some(_) => {
                log::trace!("freed buffer #{}", handle.id());
                Ok(())
            }
            None => Err(Error::Driver(format!("no buffer #{}", handle.id()))),
        }
    }

    fn write_buffer(&self, handle: BufferHandle, first_point: usize, data: &[u16]) -> Result<()> {
        let mut state = self.lock()?;
        match state.buffers.get_mut(&handle.id()) {
            Some(Buffer::Raw(buffer)) if first_point + data.len() <= buffer.len() => {
                buffer[first_point..][..data.len()].copy_from_slice(data);
                Ok(())
            }
            Some(Buffer::Raw(buffer)) => Err(Error::Driver(format!(
                "write of {}+{} past end of buffer of {}", first_point, data.len(), buffer.len()))),
            Some(Buffer::Scaled(_)) => Err(Error::Driver("buffer holds scaled data".into())),
            None => Err(Error::Driver(format!("no buffer #{}", handle.id()))),
        }
    }

    fn copy_scaled(&self, handle: BufferHandle, first_point: usize, data: &mut [f64]) -> Result<()> {
        let mut state = self.lock()?;
        match state.buffers.get(&handle.id()) {
            Some(Buffer::Scaled(buffer)) if first_point + data.len() <= buffer.len() =>
                data.copy_from_slice(&buffer[first_point..][..data.len()]),
            Some(Buffer::Scaled(buffer)) => return Err(Error::Driver(format!(
                "copy of {}+{} past end of buffer of {}", first_point, data.len(), buffer.len()))),
            Some(Buffer::Raw(_)) => return Err(Error::Driver("buffer holds raw codes".into())),
            None => return Err(Error::Driver(format!("no buffer #{}", handle.id()))),
        }
        let copy_advance = state.copy_advance;
        if copy_advance > 0 {
            let target = state.input.as_ref().map(|scan| scan.produced + copy_advance);
            if let Some(target) = target {
                state.produce_input(target, &self.signal);
            }
        }
        Ok(())
    }

    fn start_scan(&self, function: Function, request: &ScanRequest, handle: BufferHandle) -> Result<()> {
        let info = self.analog_info(function)?;
        if request.low_chan > request.high_chan || request.high_chan >= info.num_chans {
            return Err(Error::Driver(format!("invalid channels {}..={} for {:?}",
                                             request.low_chan, request.high_chan, function)))
        }
        if request.rate == 0 || request.count == 0 {
            return Err(Error::Driver("scan needs a rate and a count".into()))
        }
        let mut state = self.lock()?;
        let expected_kind = match function {
            Function::AnalogInput => BufferKind::Scaled,
            Function::AnalogOutput => BufferKind::Raw,
        };
        match (state.buffers.get(&handle.id()), expected_kind) {
            (Some(Buffer::Scaled(buffer)), BufferKind::Scaled) if buffer.len() >= request.count => (),
            (Some(Buffer::Raw(buffer)), BufferKind::Raw) if buffer.len() >= request.count => (),
            (Some(_), _) => return Err(Error::Driver(format!(
                "buffer #{} does not fit a {:?} scan of {}", handle.id(), function, request.count))),
            (None, _) => return Err(Error::Driver(format!("no buffer #{}", handle.id()))),
        }
        let state = &mut *state;
        let slot = match function {
            Function::AnalogInput => &mut state.input,
            Function::AnalogOutput => &mut state.output,
        };
        if slot.is_some() {
            return Err(Error::Driver(format!("{:?} scan already running", function)))
        }
        *slot = Some(Scan::new(request, handle));
        if function == Function::AnalogOutput {
            state.events.push(OutputEvent::ScanStarted { count: request.count, rate: request.rate });
        }
        log::debug!("simulated {:?} scan started: {:?}", function, request);
        Ok(())
    }

    fn stop_scan(&self, function: Function) -> Result<()> {
        let mut state = self.lock()?;
        match function {
            Function::AnalogInput => {
                if let Some(scan) = state.input.take() {
                    log::debug!("simulated input scan stopped at {}", scan.produced);
                }
            }
            Function::AnalogOutput => {
                if let Some(scan) = state.output.take() {
                    state.events.push(OutputEvent::ScanStopped { produced: scan.produced });
                }
            }
        }
        Ok(())
    }

    fn status(&self, function: Function) -> Result<ScanStatus> {
        let mut state = self.lock()?;
        self.sync(&mut state);
        let state = &mut *state;
        let slot = match function {
            Function::AnalogInput => &mut state.input,
            Function::AnalogOutput => &mut state.output,
        };
        let status = match slot.take() {
            None =>
                ScanStatus { status: Status::Idle, count: 0, index: None },
            Some(scan) if scan.is_done() => {
                if function == Function::AnalogOutput {
                    state.events.push(OutputEvent::ScanCompleted { count: scan.count });
                }
                ScanStatus { status: Status::Idle, count: scan.produced, index: scan.index() }
            }
            Some(scan) => {
                let status = ScanStatus { status: Status::Running, count: scan.produced, index: scan.index() };
                *slot = Some(scan);
                status
            }
        };
        Ok(status)
    }

    fn v_out(&self, channel: usize, range: AnalogRange, volts: f64) -> Result<()> {
        let info = self.analog_info(Function::AnalogOutput)?;
        if channel >= info.num_chans {
            return Err(Error::Driver(format!("no output channel {}", channel)))
        }
        let code = self.from_eng_units(range, volts)?;
        let volts = self.to_eng_units(range, code)?;
        self.lock()?.events.push(OutputEvent::Level { channel, volts });
        Ok(())
    }

    fn from_eng_units(&self, range: AnalogRange, volts: f64) -> Result<u16> {
        range.volts_to_code(self.resolution, volts)
    }

    fn to_eng_units(&self, range: AnalogRange, code: u16) -> Result<f64> {
        range.code_to_volts(self.resolution, code)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn board() -> SimulatedBoard {
        SimulatedBoard::from_configuration(&SimulationConfiguration::default())
            .with_pacing(Pacing::Manual)
            .with_signal(Signal::Ramp)
    }

    fn input_request(count: usize) -> ScanRequest {
        ScanRequest {
            low_chan: 0,
            high_chan: 0,
            count,
            rate: 1000,
            range: AnalogRange::BIP10VOLTS,
            options: ScanOptions::Background | ScanOptions::Continuous | ScanOptions::ScaleData,
        }
    }

    #[test]
    fn test_ring_wraps() {
        let board = board();
        let handle = board.alloc_buffer(BufferKind::Scaled, 10).unwrap();
        board.start_scan(Function::AnalogInput, &input_request(10), handle).unwrap();
        board.advance(13).unwrap();
        let status = board.status(Function::AnalogInput).unwrap();
        assert_eq!(status, ScanStatus { status: Status::Running, count: 13, index: Some(2) });
        let mut data = [0.0; 10];
        board.copy_scaled(handle, 0, &mut data).unwrap();
        assert_eq!(data, [10.0, 11.0, 12.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_copy_out_of_bounds() {
        let board = board();
        let handle = board.alloc_buffer(BufferKind::Scaled, 10).unwrap();
        let mut data = [0.0; 4];
        assert!(board.copy_scaled(handle, 7, &mut data).is_err());
    }

    #[test]
    fn test_copy_advance() {
        let board = board();
        let handle = board.alloc_buffer(BufferKind::Scaled, 10).unwrap();
        board.start_scan(Function::AnalogInput, &input_request(10), handle).unwrap();
        board.set_copy_advance(5).unwrap();
        let mut data = [0.0; 2];
        board.copy_scaled(handle, 0, &mut data).unwrap();
        assert_eq!(board.status(Function::AnalogInput).unwrap().count, 5);
    }

    #[test]
    fn test_allocation_limits() {
        let board = board().with_max_buffer(100);
        assert!(matches!(board.alloc_buffer(BufferKind::Raw, 0), Err(Error::Allocation { samples: 0 })));
        assert!(matches!(board.alloc_buffer(BufferKind::Raw, 101), Err(Error::Allocation { samples: 101 })));
        let handle = board.alloc_buffer(BufferKind::Raw, 100).unwrap();
        assert_eq!(board.allocated_buffers().unwrap(), 1);
        board.free_buffer(handle).unwrap();
        assert_eq!(board.allocated_buffers().unwrap(), 0);
        assert!(board.free_buffer(handle).is_err());
    }

    #[test]
    fn test_buffer_in_use() {
        let board = board();
        let handle = board.alloc_buffer(BufferKind::Scaled, 10).unwrap();
        board.start_scan(Function::AnalogInput, &input_request(10), handle).unwrap();
        assert!(board.free_buffer(handle).is_err());
        board.stop_scan(Function::AnalogInput).unwrap();
        assert_eq!(board.status(Function::AnalogInput).unwrap().status, Status::Idle);
        board.free_buffer(handle).unwrap();
    }

    #[test]
    fn test_output_scan_completes() {
        let board = board();
        let handle = board.alloc_buffer(BufferKind::Raw, 8).unwrap();
        let request = ScanRequest {
            high_chan: 1,
            count: 8,
            options: ScanOptions::Background,
            ..input_request(8)
        };
        board.start_scan(Function::AnalogOutput, &request, handle).unwrap();
        board.advance(6).unwrap();
        assert_eq!(board.status(Function::AnalogOutput).unwrap().status, Status::Running);
        board.advance(6).unwrap();
        assert_eq!(board.status(Function::AnalogOutput).unwrap(),
                   ScanStatus { status: Status::Idle, count: 8, index: Some(7) });
        assert_eq!(board.events().unwrap(), [
            OutputEvent::ScanStarted { count: 8, rate: 1000 },
            OutputEvent::ScanCompleted { count: 8 },
        ]);
    }

    #[test]
    fn test_scan_validation() {
        let board = board();
        let raw = board.alloc_buffer(BufferKind::Raw, 10).unwrap();
        let scaled = board.alloc_buffer(BufferKind::Scaled, 10).unwrap();
        assert!(board.start_scan(Function::AnalogInput, &input_request(10), raw).is_err());
        assert!(board.start_scan(Function::AnalogInput, &input_request(11), scaled).is_err());
        let request = ScanRequest { high_chan: 8, ..input_request(10) };
        assert!(board.start_scan(Function::AnalogInput, &request, scaled).is_err());
        board.start_scan(Function::AnalogInput, &input_request(10), scaled).unwrap();
        assert!(board.start_scan(Function::AnalogInput, &input_request(10), scaled).is_err());
    }

    #[test]
    fn test_waveform_signal_is_channel_major() {
        let signal = Signal::Waveforms(vec![
            Waveform { shape: crate::waveform::Shape::Zero, ..Default::default() },
            Waveform::square(1.0, 2.0, 0.0, 0.5),
        ]);
        assert_eq!(signal.sample(0, 0, 2, 10), 0.0);
        assert_eq!(signal.sample(1, 0, 2, 10), 2.0);
        assert_eq!(signal.sample(11, 0, 2, 10), -2.0); // channel 1, point 5
        assert_eq!(signal.sample(4, 0, 3, 10), 2.0);   // channel 1, point 1
        assert_eq!(signal.sample(5, 0, 3, 10), 0.0);   // channel 2 has no waveform
    }
}
