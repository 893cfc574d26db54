//! `mqsh`: thin entry point. Parses arguments, loads the optional config
//! overlay, builds the broker transport, and hands off to [`mqshlib::Shell`].

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use mqshlib::config::{ShellArgs, ShellConfig, ShellConfigFile};
use mqshlib::transport::{BrokerConfig, RumqttcTransport, SharedTransport};
use mqshlib::Shell;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let args = ShellArgs::parse();

    let overlay = match &args.config {
        Some(path) => match ShellConfigFile::load(path) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let config = match ShellConfig::from_file(overlay) {
        Ok(config) => config
            .with_single_threaded(args.single_threaded)
            .with_initial_subscriptions(args.subscribe.clone()),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let broker: BrokerConfig = (&args).into();

    let runtime = if *config.single_threaded() {
        tokio::runtime::Builder::new_current_thread()
    } else {
        tokio::runtime::Builder::new_multi_thread()
    }
    .enable_all()
    .build()
    .expect("failed to build the tokio runtime");

    runtime.block_on(run(config, broker))
}

async fn run(config: ShellConfig, broker: BrokerConfig) -> ExitCode {
    let transport: SharedTransport = match RumqttcTransport::connect(&broker) {
        Ok(transport) => Arc::new(Mutex::new(transport)),
        Err(e) => {
            eprintln!("error: could not set up broker connection: {e}");
            return ExitCode::FAILURE;
        }
    };

    let output = Arc::new(Mutex::new(std::io::stdout()));
    let mut shell = Shell::new(config, transport, output);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    match shell.run(stdin).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
