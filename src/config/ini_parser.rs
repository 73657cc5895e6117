//! Minimal INI reader for the formdrop configuration file.
//!
//! Understands `[section]` headers, `key = value` pairs, full-line and
//! trailing `#`/`;` comments, plus typed getters for booleans, sizes
//! (`64MB`) and durations (`30s`).

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct IniConfig {
    /// Keys before the first section header live under ""
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config = Self::new();
        let mut current_section = String::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| format!("Unterminated section at line {line_number}: {line}"))?
                    .trim();
                if name.is_empty() {
                    return Err(format!("Empty section name at line {line_number}"));
                }
                current_section = name.to_string();
                config.sections.entry(current_section.clone()).or_default();
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("Invalid syntax at line {line_number}: {line}"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Empty key at line {line_number}: {line}"));
            }
            let value = strip_inline_comment(value).trim();

            config
                .sections
                .entry(current_section.clone())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }

        Ok(config)
    }

    /// Raw value; pass "" as section for keys above the first header
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section)?.get(key).cloned()
    }

    pub fn get_u16(&self, section: &str, key: &str) -> Option<u16> {
        self.get_string(section, key)?.parse().ok()
    }

    pub fn get_usize(&self, section: &str, key: &str) -> Option<usize> {
        self.get_string(section, key)?.parse().ok()
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get_string(section, key)?.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    /// Size in bytes; accepts plain numbers and KB/MB/GB suffixes
    pub fn get_size(&self, section: &str, key: &str) -> Option<u64> {
        parse_size(&self.get_string(section, key)?)
    }

    /// Duration; plain numbers are seconds, `ms`/`s`/`m` suffixes are accepted
    pub fn get_duration(&self, section: &str, key: &str) -> Option<Duration> {
        parse_duration(&self.get_string(section, key)?)
    }
}

fn strip_inline_comment(value: &str) -> &str {
    match value.find(['#', ';']) {
        Some(pos) => &value[..pos],
        None => value,
    }
}

/// Parses sizes like "1024", "512KB", "64MB" or "1.5GB"
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_uppercase();
    if let Ok(bytes) = value.parse::<u64>() {
        return Some(bytes);
    }

    const UNITS: [(&str, u64); 4] = [
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ];
    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| Some((value.strip_suffix(suffix)?, *multiplier)))?;
    let number = number.trim();

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }
    let fractional = number.parse::<f64>().ok()?;
    (fractional >= 0.0).then(|| (fractional * multiplier as f64) as u64)
}

fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = value.strip_suffix('m') {
        let mins: u64 = mins.trim().parse().ok()?;
        return mins.checked_mul(60).map(Duration::from_secs);
    }
    value.parse().ok().map(Duration::from_secs)
}
