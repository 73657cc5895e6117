//! Configuration management for formdrop
//! Supports INI files with CLI argument overrides

pub mod ini_parser;

use crate::cli::Cli;
use crate::multipart::{DEFAULT_MAX_BODY_SIZE, DEFAULT_WRITE_TIMEOUT};
use ini_parser::IniConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LISTEN: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_THREADS: usize = 8;
const DEFAULT_STORAGE_DIR: &str = "storage";
const DEFAULT_INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // Server settings
    pub listen: String,
    pub port: u16,
    pub threads: usize,
    pub index_file: PathBuf,

    // Upload settings
    pub storage_dir: PathBuf,
    pub max_body_size: u64,
    pub write_timeout: Duration,

    // Logging settings
    pub verbose: bool,
    pub detailed_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            threads: DEFAULT_THREADS,
            index_file: PathBuf::from(DEFAULT_INDEX_FILE),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            verbose: false,
            detailed_logging: false,
        }
    }
}

impl Config {
    /// Load configuration with precedence: CLI args > INI file > Defaults
    pub fn load(cli: &Cli) -> Result<Self, String> {
        let ini = match Self::find_config_file(cli)? {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                IniConfig::load_file(&path)?
            }
            None => {
                log::info!("No configuration file found, using defaults and CLI overrides");
                IniConfig::new()
            }
        };

        Ok(Self::resolve(&ini, cli))
    }

    /// Merge an already parsed INI file with the command line.
    pub fn resolve(ini: &IniConfig, cli: &Cli) -> Self {
        let defaults = Self::default();

        Self {
            listen: cli
                .listen
                .clone()
                .or_else(|| ini.get_string("server", "listen"))
                .unwrap_or(defaults.listen),
            port: cli
                .port
                .or_else(|| ini.get_u16("server", "port"))
                .unwrap_or(defaults.port),
            threads: cli
                .threads
                .or_else(|| ini.get_usize("server", "threads"))
                .filter(|&threads| threads > 0)
                .unwrap_or(defaults.threads),
            index_file: cli
                .index_file
                .clone()
                .or_else(|| ini.get_string("server", "index_file").map(PathBuf::from))
                .unwrap_or(defaults.index_file),

            storage_dir: cli
                .storage_dir
                .clone()
                .or_else(|| ini.get_string("upload", "storage_dir").map(PathBuf::from))
                .unwrap_or(defaults.storage_dir),
            // CLI takes MB, the INI file takes a size with unit
            max_body_size: cli
                .max_body_size
                .map(|mb| mb * 1024 * 1024)
                .or_else(|| ini.get_size("upload", "max_body_size"))
                .unwrap_or(defaults.max_body_size),
            write_timeout: cli
                .write_timeout
                .map(Duration::from_secs)
                .or_else(|| ini.get_duration("upload", "write_timeout"))
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or(defaults.write_timeout),

            verbose: cli
                .verbose
                .or_else(|| ini.get_bool("logging", "verbose"))
                .unwrap_or(defaults.verbose),
            detailed_logging: cli
                .detailed_logging
                .or_else(|| ini.get_bool("logging", "detailed"))
                .unwrap_or(defaults.detailed_logging),
        }
    }

    /// Find configuration file in order of preference
    fn find_config_file(cli: &Cli) -> Result<Option<PathBuf>, String> {
        if let Some(ref config_path) = cli.config_file {
            let path = PathBuf::from(config_path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(format!(
                "Config file specified but not found: {config_path}"
            ));
        }

        let mut candidates = vec![PathBuf::from("formdrop.ini"), PathBuf::from("formdrop.conf")];
        if let Some(home_dir) = std::env::var_os("HOME") {
            candidates.push(
                Path::new(&home_dir)
                    .join(".config")
                    .join("formdrop")
                    .join("config.ini"),
            );
        }
        #[cfg(unix)]
        {
            candidates.push(PathBuf::from("/etc/formdrop/config.ini"));
        }

        Ok(candidates.into_iter().find(|path| path.exists()))
    }

    /// Default log filter for these settings
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.detailed_logging {
            "info"
        } else {
            "warn"
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Configuration Summary:");
        log::info!("  Server: {}:{}", self.listen, self.port);
        log::info!("  Threads: {}", self.threads);
        log::info!("  Index File: {}", self.index_file.display());
        log::info!("  Storage Directory: {}", self.storage_dir.display());
        log::info!(
            "  Max Body Size: {} MB",
            self.max_body_size / (1024 * 1024)
        );
        log::info!("  Write Timeout: {:?}", self.write_timeout);
        log::info!("  Verbose Logging: {}", self.verbose);
        log::info!("  Detailed Logging: {}", self.detailed_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn load_with_file(content: &str, cli: Cli) -> Config {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("test.ini");
        fs::write(&config_file, content).unwrap();

        let cli = Cli {
            config_file: Some(config_file.to_string_lossy().to_string()),
            ..cli
        };
        Config::load(&cli).unwrap()
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let config = Config::resolve(&IniConfig::new(), &Cli::default());
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.storage_dir, PathBuf::from("storage"));
        assert_eq!(config.max_body_size, 64 * 1024 * 1024);
        assert_eq!(config.write_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_load_with_ini_file() {
        let config = load_with_file(
            r#"
[server]
listen = 0.0.0.0
port = 9000
threads = 16
index_file = /srv/www/upload.html

[upload]
storage_dir = /srv/uploads
max_body_size = 5MB
write_timeout = 2m

[logging]
verbose = true
detailed = false
"#,
            Cli::default(),
        );

        assert_eq!(config.listen, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.threads, 16);
        assert_eq!(config.index_file, PathBuf::from("/srv/www/upload.html"));
        assert_eq!(config.storage_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.max_body_size, 5 * 1024 * 1024);
        assert_eq!(config.write_timeout, Duration::from_secs(120));
        assert!(config.verbose);
        assert!(!config.detailed_logging);
    }

    #[test]
    fn test_config_load_cli_overrides_ini() {
        let cli = Cli {
            listen: Some("192.168.1.1".to_string()),
            port: Some(7777),
            max_body_size: Some(2),
            verbose: Some(false),
            ..Cli::default()
        };
        let config = load_with_file(
            r#"
[server]
listen = 0.0.0.0
port = 9000
threads = 16

[upload]
max_body_size = 1GB

[logging]
verbose = true
"#,
            cli,
        );

        assert_eq!(config.listen, "192.168.1.1");
        assert_eq!(config.port, 7777);
        assert_eq!(config.max_body_size, 2 * 1024 * 1024);
        assert!(!config.verbose);
        // Not given on the command line
        assert_eq!(config.threads, 16);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = load_with_file(
            "[server]\nport = not-a-port\nthreads = 0\n[upload]\nwrite_timeout = 0\n",
            Cli::default(),
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn test_config_file_discovery_nonexistent() {
        let cli = Cli {
            config_file: Some("/nonexistent/path.ini".to_string()),
            ..Cli::default()
        };

        let result = Config::load(&cli);
        assert!(result
            .unwrap_err()
            .contains("Config file specified but not found"));
    }

    #[test]
    fn test_log_level() {
        let mut config = Config::default();
        assert_eq!(config.log_level(), "warn");
        config.detailed_logging = true;
        assert_eq!(config.log_level(), "info");
        config.verbose = true;
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_config_print_summary() {
        // Must not panic without a logger installed
        Config::default().print_summary();
    }
}
