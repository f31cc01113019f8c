//! Plays generated waveforms on the analog outputs of the stimulus board.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reservoir_daq::{Configuration, Device, SampleSource, SimulatedBoard};

#[derive(Parser, Debug)]
#[command(about = "Play sine, square or 0 V waveforms on the analog outputs", long_about = None)]
struct Args {
    /// TOML configuration; defaults apply to anything it leaves out
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Update rate per channel, in Hz
    #[arg(long)]
    rate: Option<u32>,

    /// Playback length, in seconds
    #[arg(long)]
    seconds: Option<f64>,
}

fn run(args: Args) -> reservoir_daq::Result<()> {
    let config = Configuration::load_or_default(args.config.as_deref())?;
    let mut output = config.output;
    if let Some(rate) = args.rate {
        output.rate = rate;
    }
    if let Some(seconds) = args.seconds {
        output.duration_secs = seconds;
    }
    for (channel, waveform) in output.waveforms.iter().enumerate().take(output.channels) {
        log::debug!("channel {}: {:?}", channel, waveform);
    }

    let device = Device::new(SimulatedBoard::from_configuration(&config.simulation));
    let source = SampleSource::Functions(output.waveforms.clone());
    let report = device.play(&output, &source)?;
    log::info!("played {:.3} s on {} channels", report.secs(), report.num_chans);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}
