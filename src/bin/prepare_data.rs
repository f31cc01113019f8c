//! Stitches CSV snippets into one stimulus table, with silence between them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reservoir_daq::Configuration;

#[derive(Parser, Debug)]
#[command(about = "Concatenate CSV snippets with 0 V gaps between them", long_about = None)]
struct Args {
    /// TOML configuration; defaults apply to anything it leaves out
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the snippets
    #[arg(value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Stitched table
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Length of each gap, in seconds
    #[arg(long)]
    seconds: Option<f64>,
}

fn run(args: Args) -> reservoir_daq::Result<()> {
    let mut stitch = Configuration::load_or_default(args.config.as_deref())?.stitch;
    if let Some(input_dir) = args.input_dir {
        stitch.input_dir = input_dir;
    }
    if let Some(output) = args.output {
        stitch.output_path = output;
    }
    if let Some(seconds) = args.seconds {
        stitch.silence_secs = seconds;
    }

    let table = reservoir_daq::stitch_directory(&stitch)?;
    table.save(&stitch.output_path)
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
