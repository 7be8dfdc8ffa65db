//! tracerv CLI - offline replay of captured trace beats.

mod cli;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tracerv::{ClockInfo, FileReplay, NullMmio, TracerBridge};

use cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "tracerv=debug"
    } else if cli.silent {
        "tracerv=error"
    } else {
        "tracerv=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.parse().expect("directive")),
        )
        .with_target(false)
        .init();

    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let stream = match FileReplay::open(&cli.input) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, path = %cli.input.display(), "failed to open beat capture");
            return EXIT_FAILURE;
        }
    };

    let clock = ClockInfo::new("core", cli.clock_multiplier, cli.clock_divisor);
    let mut bridge = match TracerBridge::new(cli.to_config(), clock, stream, NullMmio) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "failed to construct bridge");
            return EXIT_FAILURE;
        }
    };

    bridge.init();

    loop {
        match bridge.tick() {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "transport error");
                return EXIT_FAILURE;
            }
        }
    }

    if let Err(e) = bridge.flush() {
        error!(error = %e, "flush failed");
        return EXIT_FAILURE;
    }

    info!("replay complete");
    EXIT_SUCCESS
}
