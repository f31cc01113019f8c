//! Records the analog inputs of the acquisition board into a CSV file.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reservoir_daq::{Configuration, Device, OverwritePolicy, SimulatedBoard};

#[derive(Parser, Debug)]
#[command(about = "Stream the analog inputs into a CSV file", long_about = None)]
struct Args {
    /// TOML configuration; defaults apply to anything it leaves out
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File to record into
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Sample rate per channel, in Hz
    #[arg(long)]
    rate: Option<u32>,

    /// Recording length, in seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Overwrite an existing output file without asking
    #[arg(short, long)]
    yes: bool,
}

fn run(args: Args) -> reservoir_daq::Result<()> {
    let config = Configuration::load_or_default(args.config.as_deref())?;
    let mut input = config.input;
    if let Some(output) = args.output {
        input.output_path = output;
    }
    if let Some(rate) = args.rate {
        input.rate = rate;
    }
    if let Some(seconds) = args.seconds {
        input.scan_secs = seconds;
    }
    if args.yes {
        input.overwrite = OverwritePolicy::Overwrite;
    }

    let file = reservoir_daq::create_output_file(&input.output_path, input.overwrite, |path| {
        reservoir_daq::confirm_overwrite(path, io::stdin().lock(), io::stdout())
    })?;
    let device = Device::new(SimulatedBoard::from_configuration(&config.simulation));
    let report = device.acquire(&input, io::BufWriter::new(file))?;
    log::info!("wrote {} rows of {} channels to {}",
               report.rows, report.num_chans, input.output_path.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error @ reservoir_daq::Error::Declined(_)) => {
            log::warn!("{}, aborting", error);
            ExitCode::FAILURE
        }
        Err(error) => {
            log::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}
