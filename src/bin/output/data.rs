//! Plays columns of a pre-recorded CSV table on the analog outputs of the stimulus board.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reservoir_daq::{Configuration, Device, SampleSource, SampleTable, SimulatedBoard};

#[derive(Parser, Debug)]
#[command(about = "Play a CSV table on the analog outputs", long_about = None)]
struct Args {
    /// TOML configuration; defaults apply to anything it leaves out
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Table to play
    #[arg(value_name = "TABLE")]
    table: Option<PathBuf>,

    /// Row rate of the table, in Hz
    #[arg(long)]
    rate: Option<u32>,
}

fn run(args: Args) -> reservoir_daq::Result<()> {
    let config = Configuration::load_or_default(args.config.as_deref())?;
    let mut output = config.output;
    if let Some(table) = args.table {
        output.table.path = table;
    }
    if let Some(rate) = args.rate {
        output.rate = rate;
    }

    let table = SampleTable::load(&output.table.path)?;
    log::info!("{}: {} rows, columns {:?}", output.table.path.display(), table.len(),
               output.table.columns.iter().map(|&column| table.headers().get(column)).collect::<Vec<_>>());
    let device = Device::new(SimulatedBoard::from_configuration(&config.simulation));
    let source = SampleSource::Table { table, columns: output.table.columns.clone() };
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
