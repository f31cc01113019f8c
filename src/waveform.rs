//! Closed-form stimulus waveforms.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Sine,
    /// High for the first `duty` fraction of every period, low for the rest.
    Square { duty: f64 },
    /// Constant 0 V, regardless of amplitude and offset.
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Waveform {
    pub shape: Shape,
    /// In Hz.
    pub frequency: f64,
    /// Peak amplitude in volts.
    pub amplitude: f64,
    /// DC offset in volts.
    pub offset: f64,
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform { shape: Shape::Sine, frequency: 5.0, amplitude: 1.0, offset: 0.0 }
    }
}

impl Waveform {
    pub fn sine(frequency: f64, amplitude: f64, offset: f64) -> Waveform {
        Waveform { shape: Shape::Sine, frequency, amplitude, offset }
    }

    pub fn square(frequency: f64, amplitude: f64, offset: f64, duty: f64) -> Waveform {
        Waveform { shape: Shape::Square { duty }, frequency, amplitude, offset }
    }

    /// Value in volts of sample `index` when played at `rate` points per second.
    pub fn value(&self, index: usize, rate: u32) -> f64 {
        let cycles = self.frequency * index as f64 / rate as f64;
        match self.shape {
            Shape::Sine =>
                self.amplitude * (2.0 * PI * cycles).sin() + self.offset,
            Shape::Square { duty } => {
                let level = if cycles.rem_euclid(1.0) < duty { 1.0 } else { -1.0 };
                self.amplitude * level + self.offset
            }
            Shape::Zero =>
                0.0,
        }
    }
}
