use crate::{Error, Result};
use std::time::Duration;
use url::Url;

/// Rows per bulk batch unless configured otherwise.
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 1000;

/// Table hint appended to the table references the engine generates.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub enum TableHint {
    None,
    #[default]
    NoLock,
    /// Raw hint list, rendered as `WITH (<hint>)`.
    Custom(String),
}

impl TableHint {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            TableHint::None
        } else if value.eq_ignore_ascii_case("nolock") {
            TableHint::NoLock
        } else {
            TableHint::Custom(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Keep the physical connection open between operations.
    pub keep_connection_alive: bool,
    /// Interpret timestamps read without a zone as UTC.
    pub force_date_times_to_utc: bool,
    pub command_timeout: Option<Duration>,
    pub bulk_chunk_size: usize,
    pub table_hint: TableHint,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            keep_connection_alive: false,
            force_date_times_to_utc: true,
            command_timeout: None,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            table_hint: TableHint::NoLock,
        }
    }
}

impl DatabaseConfig {
    /// Reads the engine settings from the query string of a connection url, for example
    /// `mssql://host/db?keep_alive=true&timeout=30&chunk_size=500&hint=none`.
    ///
    /// Unknown parameters are left for the driver.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| {
            Error::new(e).context(format!("Cannot parse the connection url `{url}`"))
        })?;
        let mut config = Self::default();
        for (key, value) in parsed.query_pairs() {
            let context = || format!("Invalid value `{value}` for connection parameter `{key}`");
            match &*key {
                "keep_alive" => {
                    config.keep_connection_alive =
                        parse_flag(&value).ok_or_else(|| Error::msg(context()))?
                }
                "utc" => {
                    config.force_date_times_to_utc =
                        parse_flag(&value).ok_or_else(|| Error::msg(context()))?
                }
                "timeout" => {
                    let seconds = value
                        .parse::<u64>()
                        .map_err(|e| Error::new(e).context(context()))?;
                    config.command_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
                }
                "chunk_size" => {
                    config.bulk_chunk_size = value
                        .parse::<usize>()
                        .ok()
                        .filter(|v| *v > 0)
                        .ok_or_else(|| Error::msg(context()))?;
                }
                "hint" => config.table_hint = TableHint::parse(&value),
                _ => {}
            }
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        v if v.eq_ignore_ascii_case("true") || v == "1" => Some(true),
        v if v.eq_ignore_ascii_case("false") || v == "0" => Some(false),
        _ => None,
    }
}
