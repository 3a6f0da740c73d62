use std::path::PathBuf;

use serde::Deserialize;

/// How an existing log file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    #[default]
    Append,
    Truncate,
}

/// Byte encoding of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf8")]
    Utf8,
    /// Non-ASCII characters are written as `\u{..}` escapes.
    Ascii,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSinkConfig {
    /// Line template. `{time}`, `{level}`, `{name}`, `{message}`.
    pub format: Option<String>,
    /// strftime format for `{time}`.
    pub date_format: Option<String>,
    pub console_output: bool,
    pub filename: Option<PathBuf>,
    pub file_mode: FileMode,
    pub encoding: Encoding,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            format: None,
            date_format: None,
            console_output: true,
            filename: None,
            file_mode: FileMode::default(),
            encoding: Encoding::default(),
        }
    }
}
