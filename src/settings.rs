use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::constants::{DEFAULT_DATA_FILE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SHEET};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub data_file: PathBuf,
    pub sheet: String,
    pub host: IpAddr,
    pub port: u16,
    /// Reuse the parsed workbook until its modification time changes
    pub cache_dataset: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            sheet: DEFAULT_SHEET.to_string(),
            host: DEFAULT_HOST.parse().unwrap_or(IpAddr::from([127, 0, 0, 1])),
            port: DEFAULT_PORT,
            cache_dataset: true,
        }
    }
}

impl Settings {
    /// Loads `uranium_map.ini` next to the executable, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Settings::default());
        }

        let file = File::open(config_path).context("Failed to open config file")?;
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line.context("Failed to read line from config")?);
        }
        Ok(Self::parse(lines.iter().map(String::as_str)))
    }

    /// Parses `key = value` lines. `#` starts a comment line; bad values keep their default.
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut config_map = HashMap::new();
        for line in lines {
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }

        let mut settings = Settings::default();
        if let Some(data_file) = config_map.get("data_file").filter(|v| !v.is_empty()) {
            settings.data_file = PathBuf::from(data_file);
        }
        if let Some(sheet) = config_map.get("sheet").filter(|v| !v.is_empty()) {
            settings.sheet = sheet.clone();
        }
        parse_into(&config_map, "host", &mut settings.host);
        parse_into(&config_map, "port", &mut settings.port);
        parse_into(&config_map, "cache_dataset", &mut settings.cache_dataset);
        settings
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn config_path() -> PathBuf {
        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push("uranium_map.ini");
        path
    }
}

fn parse_into<T: FromStr>(config_map: &HashMap<String, String>, key: &str, slot: &mut T) {
    let Some(raw) = config_map.get(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = %raw, "Ignoring invalid setting"),
    }
}
