use clap::Parser;
use polrepo::cli::Cli;
use polrepo::errors::display_error;
use polrepo::tracing_init::init_tracing;
use polrepo::{cmd, version};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    info!(
        args = ?std::env::args().collect::<Vec<_>>(),
        version = version::version_long(),
        "polrepo started"
    );

    let verbose = cli.verbose;
    if let Err(err) = cmd::run(cli) {
        error!(error = ?err, "command failed");
        display_error(&err, verbose);
        std::process::exit(1);
    }
}
