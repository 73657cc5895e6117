/// # formdrop
///
/// A small upload server for `multipart/form-data` forms.
///
/// The core is the [`multipart`] parser, which splits a buffered request body
/// into parts, writes file parts through a [`storage::StorageWriter`] and
/// collects the remaining fields. The other modules wrap it in a blocking
/// HTTP/1.1 server. [`run`] wires everything together from command-line
/// arguments and the optional configuration file.
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod multipart;
pub mod router;
pub mod server;
pub mod storage;
pub mod upload;

use crate::cli::Cli;
use crate::config::Config;
use clap::Parser;
use env_logger::Env;
use log::error;

/// Initializes the logger, parses command-line arguments, and starts the server.
///
/// `RUST_LOG` takes precedence over the level derived from the
/// configuration. Errors are logged and end the process with exit code 1.
pub fn run() {
    let cli = Cli::parse();

    // Precedence: CLI > INI > defaults
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let log_level = config.log_level();
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();
    log::debug!("Log level set to: {log_level}");

    if config.verbose {
        config.print_summary();
    }

    if let Err(e) = server::run_server_with_config(config) {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
