//! Scan parameters derived from a configuration and the capabilities the board reports.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use crate::config::{InputConfiguration, OutputConfiguration};
use crate::sys::{AnalogInfo, BoardInfo};

/// Minimum ring size per channel, whatever the rate.
const MIN_POINTS_PER_CHANNEL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogRange {
    pub min_volts: f64,
    pub max_volts: f64,
}

impl AnalogRange {
    pub const BIP10VOLTS: AnalogRange = AnalogRange { min_volts: -10.0, max_volts: 10.0 };
    pub const BIP5VOLTS:  AnalogRange = AnalogRange { min_volts:  -5.0, max_volts:  5.0 };
    pub const UNI10VOLTS: AnalogRange = AnalogRange { min_volts:   0.0, max_volts: 10.0 };

    pub fn span(self) -> f64 {
        self.max_volts - self.min_volts
    }

    fn is_valid(self) -> bool {
        self.min_volts.is_finite() && self.max_volts.is_finite() && self.min_volts < self.max_volts
    }

    /// Number of codes a converter of `resolution` bits has.
    fn code_count(resolution: u32) -> Result<f64> {
        if resolution == 0 || resolution > 16 {
            return Err(Error::InvalidConfig(format!(
                "unsupported converter resolution of {} bits", resolution)))
        }
        Ok((1u32 << resolution) as f64)
    }

    /// Converts `volts` to a converter code, saturating at both ends of the range. One code
    /// step is `span / 2^resolution`, so the midpoint of the range is exactly
    /// `2^(resolution - 1)`.
    pub fn volts_to_code(self, resolution: u32, volts: f64) -> Result<u16> {
        let code_count = Self::code_count(resolution)?;
        let code = ((volts - self.min_volts) / self.span() * code_count).round();
        Ok(code.clamp(0.0, code_count - 1.0) as u16)
    }

    pub fn code_to_volts(self, resolution: u32, code: u16) -> Result<f64> {
        Ok(self.min_volts + code as f64 / Self::code_count(resolution)? * self.span())
    }
}

fn bound_channels(requested: usize, info: &AnalogInfo) -> Result<usize> {
    let num_chans = requested.min(info.num_chans);
    if num_chans == 0 {
        return Err(Error::InvalidConfig(format!(
            "no channels to scan (requested {}, device has {})", requested, info.num_chans)))
    }
    Ok(num_chans)
}

fn select_range(configured: Option<AnalogRange>, info: &AnalogInfo) -> Result<AnalogRange> {
    match (configured, info.supported_ranges.first()) {
        (Some(range), _) if !range.is_valid() => Err(Error::InvalidConfig(format!(
            "range {} V..{} V is empty", range.min_volts, range.max_volts))),
        (Some(range), _) => Ok(range),
        (None, Some(&range)) => Ok(range),
        (None, None) => Err(Error::InvalidConfig("device reports no supported ranges".into())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputParameters {
    pub low_chan: usize,
    pub high_chan: usize,
    pub num_chans: usize,
    pub rate: u32,
    pub range: AnalogRange,
    /// Ring buffer capacity in samples, all channels together.
    pub buffer_count: usize,
    /// Samples copied out of the ring per drain iteration.
    pub chunk_size: usize,
    /// Samples to capture before the run completes.
    pub total_samples: u64,
}

impl InputParameters {
    pub fn derive(board: &BoardInfo, config: &InputConfiguration) -> Result<InputParameters> {
        let info = board.analog_input.as_ref().ok_or(Error::NotSupported("analog input"))?;
        if config.rate == 0 || !(config.scan_secs > 0.0) || !(config.buffer_secs > 0.0) {
            return Err(Error::InvalidConfig(
                "rate, scan time and buffer time must all be positive".into()))
        }
        if config.chunks_per_buffer == 0 {
            return Err(Error::InvalidConfig("chunks_per_buffer must be positive".into()))
        }

        let num_chans = bound_channels(config.channels, info)?;
        let mut points_per_channel = ((config.rate as f64 * config.buffer_secs).round() as usize)
            .max(MIN_POINTS_PER_CHANNEL);
        if info.packet_size > 1 {
            points_per_channel = points_per_channel.next_multiple_of(info.packet_size);
        }
        let buffer_count = points_per_channel * num_chans;
        let chunk_size = (buffer_count / config.chunks_per_buffer).max(1);
        let scan_points = (config.scan_secs * config.rate as f64).round() as u64;
        if scan_points == 0 {
            return Err(Error::InvalidConfig("scan is shorter than one sample".into()))
        }

        Ok(InputParameters {
            low_chan: 0,
            high_chan: num_chans - 1,
            num_chans,
            rate: config.rate,
            range: select_range(config.range, info)?,
            buffer_count,
            chunk_size,
            total_samples: scan_points * num_chans as u64,
        })
    }

    pub fn scan_secs(&self) -> f64 {
        self.total_samples as f64 / self.num_chans as f64 / self.rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputParameters {
    pub low_chan: usize,
    pub high_chan: usize,
    pub num_chans: usize,
    pub rate: u32,
    pub range: AnalogRange,
    pub points_per_channel: usize,
    pub total_count: usize,
}

impl OutputParameters {
    pub fn derive(board: &BoardInfo, config: &OutputConfiguration, points_per_channel: usize)
            -> Result<OutputParameters> {
        let info = board.analog_output.as_ref().ok_or(Error::NotSupported("analog output"))?;
        if config.rate == 0 {
            return Err(Error::InvalidConfig("rate must be positive".into()))
        }
        if points_per_channel == 0 {
            return Err(Error::InvalidConfig("nothing to output".into()))
        }
        let num_chans = bound_channels(config.channels, info)?;
        Ok(OutputParameters {
            low_chan: 0,
            high_chan: num_chans - 1,
            num_chans,
            rate: config.rate,
            range: select_range(config.range, info)?,
            points_per_channel,
            total_count: points_per_channel * num_chans,
        })
    }

    pub fn sample_secs(&self) -> f64 {
        self.points_per_channel as f64 / self.rate as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn board(ai_chans: usize, packet_size: usize) -> BoardInfo {
        let info = |num_chans| AnalogInfo {
            num_chans,
            packet_size,
            resolution: 16,
            supported_ranges: vec![AnalogRange::BIP10VOLTS, AnalogRange::BIP5VOLTS],
        };
        BoardInfo {
            product_name: "test".into(),
            unique_id: "0".into(),
            analog_input: Some(info(ai_chans)),
            analog_output: Some(info(2)),
        }
    }

    #[test]
    fn test_code_conversion() {
        let range = AnalogRange::BIP10VOLTS;
        assert_eq!(range.volts_to_code(16, -10.0).unwrap(), 0);
        assert_eq!(range.volts_to_code(16, 10.0).unwrap(), 65535);
        assert_eq!(range.volts_to_code(16, 0.0).unwrap(), 32768);
        assert_eq!(range.volts_to_code(16, 25.0).unwrap(), 65535);
        assert_eq!(range.volts_to_code(16, -25.0).unwrap(), 0);
        assert_eq!(range.volts_to_code(12, 0.0).unwrap(), 2048);
        assert_eq!(range.volts_to_code(12, 10.0).unwrap(), 4095);
        assert_eq!(range.code_to_volts(16, 32768).unwrap(), 0.0);
        assert_eq!(range.code_to_volts(16, 0).unwrap(), -10.0);
        assert_eq!(range.code_to_volts(16, 49152).unwrap(), 5.0);
        assert_eq!(AnalogRange::UNI10VOLTS.volts_to_code(16, 5.0).unwrap(), 32768);
    }

    #[test]
    fn test_unsupported_resolution() {
        let range = AnalogRange::BIP10VOLTS;
        assert!(matches!(range.volts_to_code(0, 0.0), Err(Error::InvalidConfig(_))));
        assert!(matches!(range.volts_to_code(24, 0.0), Err(Error::InvalidConfig(_))));
        assert!(matches!(range.code_to_volts(17, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_range_rejected() {
        for range in [AnalogRange { min_volts: 5.0, max_volts: 5.0 },
                      AnalogRange { min_volts: 10.0, max_volts: -10.0 },
                      AnalogRange { min_volts: f64::NAN, max_volts: 1.0 }] {
            let config = InputConfiguration { range: Some(range), ..Default::default() };
            assert!(matches!(InputParameters::derive(&board(1, 1), &config),
                             Err(Error::InvalidConfig(_))));
            let config = OutputConfiguration { range: Some(range), ..Default::default() };
            assert!(matches!(OutputParameters::derive(&board(1, 1), &config, 10),
                             Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_input_defaults() {
        let params = InputParameters::derive(&board(8, 1), &InputConfiguration::default()).unwrap();
        assert_eq!(params.num_chans, 1);
        assert_eq!(params.high_chan, 0);
        assert_eq!(params.buffer_count, 1000);
        assert_eq!(params.chunk_size, 100);
        assert_eq!(params.total_samples, 50_000);
        assert_eq!(params.range, AnalogRange::BIP10VOLTS);
        assert_eq!(params.scan_secs(), 100.0);
    }

    #[test]
    fn test_input_channels_bounded_by_device() {
        let config = InputConfiguration { channels: 6, ..Default::default() };
        let params = InputParameters::derive(&board(4, 1), &config).unwrap();
        assert_eq!(params.num_chans, 4);
        assert_eq!(params.high_chan, 3);
        assert_eq!(params.buffer_count, 4000);
        assert_eq!(params.total_samples, 200_000);
    }

    #[test]
    fn test_input_packet_rounding() {
        let config = InputConfiguration { rate: 3, buffer_secs: 1.0, ..Default::default() };
        // 3 points are raised to the minimum of 10, then to the next multiple of 64
        let params = InputParameters::derive(&board(1, 64), &config).unwrap();
        assert_eq!(params.buffer_count, 64);
        assert_eq!(params.chunk_size, 6);
    }

    #[test]
    fn test_input_not_supported() {
        let mut board = board(1, 1);
        board.analog_input = None;
        let error = InputParameters::derive(&board, &InputConfiguration::default()).unwrap_err();
        assert!(matches!(error, Error::NotSupported("analog input")));
    }

    #[test]
    fn test_input_zero_channels() {
        let config = InputConfiguration { channels: 0, ..Default::default() };
        assert!(matches!(InputParameters::derive(&board(4, 1), &config),
                         Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_output_bounded() {
        let config = OutputConfiguration { range: Some(AnalogRange::UNI10VOLTS), ..Default::default() };
        let params = OutputParameters::derive(&board(1, 1), &config, 5000).unwrap();
        assert_eq!(params.num_chans, 2);
        assert_eq!(params.total_count, 10_000);
        assert_eq!(params.range, AnalogRange::UNI10VOLTS);
        assert_eq!(params.sample_secs(), 10.0);
    }
}
