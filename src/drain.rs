//! Drains a continuous input scan from the driver's ring buffer into a `Recorder`.
//!
//! The hardware keeps writing into the ring at the scan rate whether or not anything reads it.
//! The drain keeps its own tally of consumed samples and compares it against the cumulative
//! count the driver reports; once the producer is more than one ring ahead, unread samples
//! have been overwritten and the run cannot continue. The check is repeated after every copy,
//! since the producer may lap the reader while the copy is in progress.

use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::{Error, Result};
use crate::capture::{RingCursor, WriteChunk, is_overrun};
use crate::params::InputParameters;
use crate::record::Recorder;
use crate::sys::{BufferHandle, Driver, Function, ScanOptions, ScanRequest, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    NotStarted,
    ScanStarting,
    Draining,
    Completed,
    OverrunAborted,
}

/// Outcome of one drain iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Less than a chunk is available.
    Pending,
    /// A chunk of this many samples was written out.
    Copied(usize),
    /// All configured samples have been written out.
    Completed,
}

#[derive(Debug)]
pub struct Drain<'d, D: Driver> {
    driver: &'d D,
    handle: BufferHandle,
    params: InputParameters,
    poll_interval: Duration,
    state: DrainState,
    scanning: bool,
    chunk: WriteChunk,
    cursor: RingCursor,
    consumed: u64,
}

impl<'d, D: Driver> Drain<'d, D> {
    /// Prepares to drain into `handle`, which must hold `params.buffer_count` scaled samples.
    pub fn new(driver: &'d D, handle: BufferHandle, params: InputParameters, poll_interval: Duration)
            -> Drain<'d, D> {
        Drain {
            driver,
            handle,
            params,
            poll_interval,
            state: DrainState::NotStarted,
            scanning: false,
            chunk: WriteChunk::new(params.chunk_size),
            cursor: RingCursor::new(params.buffer_count),
            consumed: 0,
        }
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Samples copied out of the ring and handed to the recorder so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn cursor(&self) -> RingCursor {
        self.cursor
    }

    /// Starts the continuous scan and waits until the driver reports it running.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DrainState::NotStarted {
            return Err(Error::InvalidState(format!("cannot start a drain that is {:?}", self.state)))
        }
        let request = ScanRequest {
            low_chan: self.params.low_chan,
            high_chan: self.params.high_chan,
            count: self.params.buffer_count,
            rate: self.params.rate,
            range: self.params.range,
            options: ScanOptions::Background | ScanOptions::Continuous | ScanOptions::ScaleData,
        };
        self.driver.start_scan(Function::AnalogInput, &request, self.handle)?;
        self.scanning = true;
        self.state = DrainState::ScanStarting;
        log::debug!("input scan submitted: {:?}", request);

        wait_running(self.driver, Function::AnalogInput, self.poll_interval)?;
        self.state = DrainState::Draining;
        log::info!("input scan running, draining {} samples in chunks of {}",
                   self.params.total_samples, self.params.chunk_size);
        Ok(())
    }

    /// Runs one iteration: copies at most one chunk to `recorder`.
    pub fn step<W: Write>(&mut self, recorder: &mut Recorder<W>) -> Result<Step> {
        match self.state {
            DrainState::Draining => (),
            DrainState::Completed => return Ok(Step::Completed),
            state => return Err(Error::InvalidState(format!("cannot step a drain that is {:?}", state))),
        }

        let status = self.driver.status(Function::AnalogInput)?;
        if status.status == Status::Idle {
            self.scanning = false;
            return Err(Error::ScanHalted { consumed: self.consumed })
        }
        self.check_overrun(status.count)?;

        let count = (self.params.total_samples - self.consumed).min(self.params.chunk_size as u64) as usize;
        if status.count.saturating_sub(self.consumed) < count as u64 {
            return Ok(Step::Pending)
        }

        let (driver, handle) = (self.driver, self.handle);
        self.chunk.fill(self.cursor, count, |first_point, data| {
            driver.copy_scaled(handle, first_point, data)
        })?;

        // the producer may have lapped us while copying
        let status = self.driver.status(Function::AnalogInput)?;
        if let Err(error) = self.check_overrun(status.count) {
            log::debug!("discarding chunk of {} samples at {}", count, self.cursor.index());
            self.chunk.clear();
            return Err(error)
        }

        recorder.push(&self.chunk)?;
        recorder.flush()?;
        self.consumed += count as u64;
        self.cursor += count;
        log::debug!("drained {} samples, {}/{} total", count, self.consumed, self.params.total_samples);

        if self.consumed == self.params.total_samples {
            self.state = DrainState::Completed;
            self.stop()?;
            Ok(Step::Completed)
        } else {
            Ok(Step::Copied(count))
        }
    }

    /// Starts the scan and drains it until it completes or fails. The scan is stopped either way.
    pub fn run<W: Write>(&mut self, recorder: &mut Recorder<W>) -> Result<u64> {
        let result = self.start().and_then(|()| loop {
            match self.step(recorder)? {
                Step::Pending => pause(self.poll_interval),
                Step::Copied(_) => (),
                Step::Completed => break Ok(self.consumed),
            }
        });
        if let Err(error) = &result {
            log::error!("input scan failed after {} samples: {}", self.consumed, error);
            if let Err(stop_error) = self.stop() {
                log::warn!("failed to stop input scan: {}", stop_error);
            }
        } else {
            log::info!("input scan completed, {} samples", self.consumed);
        }
        result
    }

    fn check_overrun(&mut self, produced: u64) -> Result<()> {
        let capacity = self.params.buffer_count;
        if !is_overrun(produced, self.consumed, capacity) {
            return Ok(())
        }
        self.state = DrainState::OverrunAborted;
        if let Err(error) = self.stop() {
            log::warn!("failed to stop input scan after overrun: {}", error);
        }
        Err(Error::Overrun { produced, consumed: self.consumed, capacity })
    }

    fn stop(&mut self) -> Result<()> {
        if self.scanning {
            self.scanning = false;
            self.driver.stop_scan(Function::AnalogInput)?;
            log::debug!("input scan stopped");
        }
        Ok(())
    }
}

/// Waits `interval` between status polls, or only yields the thread if it is zero.
pub(crate) fn pause(interval: Duration) {
    if interval.is_zero() {
        thread::yield_now();
    } else {
        thread::sleep(interval);
    }
}

/// Polls until `function` has a scan running.
pub(crate) fn wait_running<D: Driver>(driver: &D, function: Function, interval: Duration) -> Result<()> {
    while driver.status(function)?.status == Status::Idle {
        pause(interval);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::AnalogRange;
    use crate::sys::sim::{Pacing, Signal, SimulatedBoard};
    use crate::config::SimulationConfiguration;

    fn params(buffer_count: usize, chunk_size: usize, total_samples: u64) -> InputParameters {
        InputParameters {
            low_chan: 0,
            high_chan: 0,
            num_chans: 1,
            rate: 1000,
            range: AnalogRange::BIP10VOLTS,
            buffer_count,
            chunk_size,
            total_samples,
        }
    }

    struct Fixture {
        board: SimulatedBoard,
        handle: BufferHandle,
    }

    impl Fixture {
        fn new(buffer_count: usize) -> Fixture {
            let board = SimulatedBoard::from_configuration(&SimulationConfiguration::default())
                .with_pacing(Pacing::Manual)
                .with_signal(Signal::Ramp);
            let handle = board.alloc_buffer(crate::sys::BufferKind::Scaled, buffer_count).unwrap();
            Fixture { board, handle }
        }

        fn drain(&self, params: InputParameters) -> Drain<'_, SimulatedBoard> {
            let mut drain = Drain::new(&self.board, self.handle, params, Duration::ZERO);
            drain.start().unwrap();
            drain
        }
    }

    fn recorded(recorder: Recorder<Vec<u8>>) -> Vec<f64> {
        let text = String::from_utf8(recorder.into_inner().unwrap()).unwrap();
        text.lines().skip(1).map(|line| line.parse().unwrap()).collect()
    }

    fn steps(drain: &mut Drain<SimulatedBoard>, recorder: &mut Recorder<Vec<u8>>, n: usize) {
        for _ in 0..n {
            assert!(matches!(drain.step(recorder).unwrap(), Step::Copied(_)));
        }
    }

    #[test]
    fn test_start_waits_for_running() {
        let fixture = Fixture::new(1000);
        let mut drain = Drain::new(&fixture.board, fixture.handle, params(1000, 100, 5000), Duration::ZERO);
        assert_eq!(drain.state(), DrainState::NotStarted);
        drain.start().unwrap();
        assert_eq!(drain.state(), DrainState::Draining);
        assert!(fixture.board.is_scanning(Function::AnalogInput).unwrap());
    }

    #[test]
    fn test_misuse_is_an_error() {
        let fixture = Fixture::new(1000);
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        let mut drain = Drain::new(&fixture.board, fixture.handle, params(1000, 100, 5000), Duration::ZERO);
        assert!(matches!(drain.step(&mut recorder), Err(Error::InvalidState(_))));
        drain.start().unwrap();
        assert!(matches!(drain.start(), Err(Error::InvalidState(_))));
        assert_eq!(drain.state(), DrainState::Draining);
        assert!(fixture.board.is_scanning(Function::AnalogInput).unwrap());
    }

    #[test]
    fn test_step_after_overrun_is_an_error() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(1001).unwrap();
        assert!(drain.step(&mut recorder).unwrap_err().is_overrun());
        assert!(matches!(drain.step(&mut recorder), Err(Error::InvalidState(_))));
        assert_eq!(drain.state(), DrainState::OverrunAborted);
        assert_eq!(recorder.rows(), 0);
    }

    #[test]
    fn test_pending_until_full_chunk() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(99).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Pending);
        fixture.board.advance(1).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Pending);
        assert_eq!(drain.consumed(), 100);
        assert_eq!(recorded(recorder), (0..100).map(|s| s as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_backlog_within_capacity_is_drained() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(950).unwrap();
        steps(&mut drain, &mut recorder, 9);
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Pending);
        assert_eq!(drain.consumed(), 900);
        // 1150 produced, 900 consumed: a backlog of 250 is well within the ring
        fixture.board.advance(200).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(drain.consumed(), 1000);
        assert_eq!(drain.cursor().index(), 0);
        assert_eq!(drain.state(), DrainState::Draining);
    }

    #[test]
    fn test_backlog_of_exactly_capacity_is_drained() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(1000).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(recorded(recorder), (0..100).map(|s| s as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_overrun_before_copy() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(950).unwrap();
        steps(&mut drain, &mut recorder, 9);
        fixture.board.advance(951).unwrap(); // 1901 produced, 900 consumed
        let error = drain.step(&mut recorder).unwrap_err();
        assert!(error.is_overrun());
        assert!(matches!(error, Error::Overrun { produced: 1901, consumed: 900, capacity: 1000 }));
        assert_eq!(drain.state(), DrainState::OverrunAborted);
        assert_eq!(drain.consumed(), 900);
        assert!(!fixture.board.is_scanning(Function::AnalogInput).unwrap());
        assert_eq!(recorder.rows(), 900);
    }

    #[test]
    fn test_overrun_during_copy_discards_chunk() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(500).unwrap();
        fixture.board.set_copy_advance(700).unwrap();
        let error = drain.step(&mut recorder).unwrap_err();
        assert!(matches!(error, Error::Overrun { produced: 1200, consumed: 0, capacity: 1000 }));
        assert_eq!(drain.state(), DrainState::OverrunAborted);
        assert_eq!(drain.consumed(), 0);
        assert_eq!(drain.cursor().index(), 0);
        assert_eq!(recorder.rows(), 0);
        assert!(!fixture.board.is_scanning(Function::AnalogInput).unwrap());
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 300, 3000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(950).unwrap();
        steps(&mut drain, &mut recorder, 3);
        fixture.board.advance(250).unwrap();
        steps(&mut drain, &mut recorder, 1); // 900..1200 straddles the end of the ring
        assert_eq!(drain.cursor().index(), 200);
        fixture.board.advance(1000).unwrap();
        steps(&mut drain, &mut recorder, 2);
        assert_eq!(drain.consumed(), 1800);
        assert_eq!(recorded(recorder), (0..1800).map(|s| s as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_completes_exactly() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 250));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(1000).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Completed);
        assert_eq!(drain.consumed(), 250);
        assert_eq!(drain.state(), DrainState::Completed);
        assert!(!fixture.board.is_scanning(Function::AnalogInput).unwrap());
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Completed);
        assert_eq!(drain.consumed(), 250);
        assert_eq!(recorded(recorder).len(), 250);
    }

    #[test]
    fn test_last_chunk_waits_only_for_remainder() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 150));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.advance(149).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Copied(100));
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Pending);
        fixture.board.advance(1).unwrap();
        assert_eq!(drain.step(&mut recorder).unwrap(), Step::Completed);
    }

    #[test]
    fn test_halted_scan() {
        let fixture = Fixture::new(1000);
        let mut drain = fixture.drain(params(1000, 100, 5000));
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        fixture.board.stop_scan(Function::AnalogInput).unwrap();
        assert!(matches!(drain.step(&mut recorder), Err(Error::ScanHalted { consumed: 0 })));
    }

    #[test]
    fn test_run_stops_scan_on_overrun() {
        let board = SimulatedBoard::from_configuration(&SimulationConfiguration::default())
            .with_pacing(Pacing::Manual)
            .with_signal(Signal::Ramp);
        let handle = board.alloc_buffer(crate::sys::BufferKind::Scaled, 100).unwrap();
        board.set_copy_advance(150).unwrap();
        let mut drain = Drain::new(&board, handle, params(100, 10, 1000), Duration::ZERO);
        let mut recorder = Recorder::new(Vec::new(), 1).unwrap();
        // the scan only exists once `run` starts it, so produce the first chunk from aside
        let result = std::thread::scope(|scope| {
            scope.spawn(|| {
                while !board.is_scanning(Function::AnalogInput).unwrap() {
                    std::thread::yield_now();
                }
                board.advance(20).unwrap();
            });
            drain.run(&mut recorder)
        });
        assert!(result.unwrap_err().is_overrun());
        assert_eq!(drain.state(), DrainState::OverrunAborted);
        assert!(!board.is_scanning(Function::AnalogInput).unwrap());
        board.free_buffer(handle).unwrap();
    }
}
