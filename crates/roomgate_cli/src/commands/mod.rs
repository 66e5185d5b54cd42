//! CLI command implementations.

pub mod config;
pub mod pipeline;
pub mod policy;

/// Output format shared by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(format: &str) -> Result<Self, Box<dyn std::error::Error>> {
        match format {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected text or json)").into()),
        }
    }
}
