use clap::Parser;
use formdrop::cli::Cli;
use formdrop::config::{Config, ini_parser::IniConfig};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("formdrop.ini");
    fs::write(&path, content).expect("Failed to write config");
    path.to_string_lossy().to_string()
}

#[test]
fn test_ini_parser_sections() {
    let ini_content = r#"
# This is a comment
[server]
listen = 0.0.0.0
port = 9000
threads = 16

[upload]
storage_dir = uploads ; relative to the working directory
max_body_size = 2GB
write_timeout = 45

[logging]
verbose = false
"#;

    let ini = IniConfig::parse(ini_content).expect("Failed to parse INI");

    assert_eq!(
        ini.get_string("server", "listen"),
        Some("0.0.0.0".to_string())
    );
    assert_eq!(ini.get_u16("server", "port"), Some(9000));
    assert_eq!(ini.get_usize("server", "threads"), Some(16));
    assert_eq!(
        ini.get_string("upload", "storage_dir"),
        Some("uploads".to_string())
    );
    assert_eq!(
        ini.get_size("upload", "max_body_size"),
        Some(2 * 1024 * 1024 * 1024)
    );
    assert_eq!(
        ini.get_duration("upload", "write_timeout"),
        Some(Duration::from_secs(45))
    );
    assert_eq!(ini.get_bool("logging", "verbose"), Some(false));
}

#[test]
fn test_command_line_over_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        &dir,
        r#"
[server]
port = 9000
index_file = /srv/www/index.html

[upload]
storage_dir = /srv/uploads
max_body_size = 8MB
write_timeout = 5s

[logging]
detailed = true
"#,
    );

    let cli = Cli::try_parse_from([
        "formdrop",
        "--config-file",
        config_path.as_str(),
        "--port",
        "4000",
        "--max-body-size",
        "32",
    ])
    .expect("Failed to parse arguments");
    let config = Config::load(&cli).expect("Failed to load config");

    assert_eq!(config.port, 4000);
    assert_eq!(config.max_body_size, 32 * 1024 * 1024);
    assert_eq!(config.storage_dir, PathBuf::from("/srv/uploads"));
    assert_eq!(config.index_file, PathBuf::from("/srv/www/index.html"));
    assert_eq!(config.write_timeout, Duration::from_secs(5));
    assert_eq!(config.listen, "127.0.0.1");
    assert!(config.detailed_logging);
    assert_eq!(config.log_level(), "info");
}

#[test]
fn test_config_file_must_exist() {
    let result = Cli::try_parse_from(["formdrop", "--config-file", "/nonexistent/formdrop.ini"]);
    assert!(result.is_err());
}

#[test]
fn test_broken_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "[server\nport = 1\n");

    let cli = Cli {
        config_file: Some(config_path),
        ..Cli::default()
    };
    let err = Config::load(&cli).unwrap_err();
    assert!(err.contains("line 1"), "{err}");
}
