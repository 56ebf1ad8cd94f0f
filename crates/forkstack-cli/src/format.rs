use anyhow::{Context as _, Result, bail};
use serde::Serialize;
use std::str::FromStr;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text for people
    #[default]
    Text,
    /// JSON - machine-parseable
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Use: text or json"),
        }
    }
}

impl OutputFormat {
    /// Serialize data to the requested format
    pub fn serialize<T: Serialize>(self, data: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(data).context("JSON serialization failed"),
            // Text output is rendered by each command
            Self::Text => bail!("Text format should not use serialize()"),
        }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}
