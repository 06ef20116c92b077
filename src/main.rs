use anyhow::Result;
use clap::Parser;
use ocr_triage::cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        // Config errors can happen before logging is up, so not via tracing.
        eprintln!("ocr-triage: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
