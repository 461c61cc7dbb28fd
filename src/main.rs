use std::io::{self, Write};
use std::process;

use clap::Parser;

use pagelight::cli::{self, Cli};
use pagelight::logging;

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = cli::run(cli, &mut out).and_then(|()| out.flush()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
