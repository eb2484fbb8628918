// chimchain - tracker and node entry point

use chimchain::{Cli, CliHandler};
use clap::Parser;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = CliHandler::handle(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
