use std::process::ExitCode;

use clap::Parser;
use lazyblue::cli_app::{Cli, run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lazyblue: {e}");
            ExitCode::FAILURE
        }
    }
}
