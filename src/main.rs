use clap::Parser;
use geofix_core::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = cli::run(&cli) {
        eprintln!("error [{}]: {err}", err.code());
        std::process::exit(1);
    }
}
