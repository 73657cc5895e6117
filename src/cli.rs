use clap::Parser;
use std::path::PathBuf;

// Command-line interface. Every field is optional so that values missing on
// the command line can come from the INI file or the built-in defaults.
#[derive(Parser, Clone, Debug, Default)]
#[command(
    version,
    about = "A small upload server that accepts multipart/form-data and stores the uploaded files.",
    long_about = "formdrop serves a static upload page and accepts multipart/form-data uploads on POST /upload.\n Uploaded files are written into the storage directory under their submitted filename, plain form fields are reported back in the JSON response.\n Settings can come from the command line, from an INI configuration file, or from built-in defaults, in that order of precedence.\n"
)]
pub struct Cli {
    /// Host address to listen on (e.g., "127.0.0.1" for local, "0.0.0.0" for everyone on the network)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Port number to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker threads handling connections
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Directory uploaded files are written to
    #[arg(short, long)]
    pub storage_dir: Option<PathBuf>,

    /// HTML page served on GET / and GET /index.html
    #[arg(short, long)]
    pub index_file: Option<PathBuf>,

    /// Maximum request body size in MB
    #[arg(long, value_parser = validate_body_size)]
    pub max_body_size: Option<u64>,

    /// Seconds allowed for writing all files of one upload
    #[arg(long, value_parser = validate_write_timeout)]
    pub write_timeout: Option<u64>,

    /// Enable verbose logging for debugging (log level: debug)
    #[arg(short, long)]
    pub verbose: Option<bool>,

    /// Enable more detailed logging (log level: info)
    #[arg(long)]
    pub detailed_logging: Option<bool>,

    /// Configuration file path (INI format). If not provided, looks for formdrop.ini in the current directory or ~/.config/formdrop/config.ini
    #[arg(long, value_parser = validate_config_file)]
    pub config_file: Option<String>,
}

/// Validate body size is within safe bounds (1-10240 MB)
fn validate_body_size(s: &str) -> Result<u64, String> {
    let size: u64 = s
        .parse()
        .map_err(|_| "Body size must be a positive number".to_string())?;

    if size == 0 {
        return Err("Body size must be greater than 0 MB".to_string());
    }

    if size > 10240 {
        return Err("Body size must not exceed 10240 MB (10 GB)".to_string());
    }

    Ok(size)
}

/// Validate write timeout is between 1 second and 1 hour
fn validate_write_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| "Write timeout must be a whole number of seconds".to_string())?;

    if !(1..=3600).contains(&secs) {
        return Err("Write timeout must be between 1 and 3600 seconds".to_string());
    }

    Ok(secs)
}

/// Validate config file path exists and is readable
fn validate_config_file(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Config file path cannot be empty".to_string());
    }

    let path = PathBuf::from(s);
    if !path.exists() {
        return Err(format!("Config file does not exist: {s}"));
    }
    if !path.is_file() {
        return Err(format!("Config path is not a file: {s}"));
    }

    match std::fs::File::open(&path) {
        Ok(_) => Ok(s.to_string()),
        Err(e) => Err(format!("Cannot read config file {s}: {e}")),
    }
}
