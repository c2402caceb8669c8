use std::process::ExitCode;

use clap::Parser;
use gama_setup::{
    cli::{Args, normalize_args, run},
    platform,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = platform::attach_console() {
        log::debug!("No parent console: {}", err);
    }

    let args = Args::parse_from(normalize_args(std::env::args_os()));

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
