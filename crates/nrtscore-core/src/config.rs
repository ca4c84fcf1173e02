//! Session render options.
//!
//! Options can be built in code or read from TOML:
//!
//! ```toml
//! sample_rate = 48000
//! output_bus_channel_count = 2
//! header_format = "wav"
//! ```
//!
//! Missing keys fall back to the defaults below.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Audio format and bus layout for a non-realtime render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Number of hardware input channels read from the input file.
    pub input_bus_channel_count: u32,
    /// Number of hardware output channels written to the output file.
    pub output_bus_channel_count: u32,
    /// Output file header format (`aiff`, `wav`, ...).
    pub header_format: String,
    /// Output sample format (`int16`, `int24`, `float`, ...).
    pub sample_format: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            input_bus_channel_count: 8,
            output_bus_channel_count: 8,
            header_format: "aiff".to_string(),
            sample_format: "int24".to_string(),
        }
    }
}

impl SessionOptions {
    /// Options with explicit input/output channel counts and default format.
    pub fn with_channels(input_bus_channel_count: u32, output_bus_channel_count: u32) -> Self {
        Self {
            input_bus_channel_count,
            output_bus_channel_count,
            ..Self::default()
        }
    }

    /// Parse options from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        log::debug!("[CONFIG] Loaded session options from {:?}", path.as_ref());
        Self::from_toml_str(&content)
    }

    /// Serialize options to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Command-line arguments for scsynth's non-realtime mode.
    ///
    /// `scsynth -N <score> <input|_> <output> <rate> <header> <sample> -i <n> -o <n>`
    pub fn render_args(
        &self,
        score_path: &Path,
        input_path: Option<&Path>,
        output_path: &Path,
    ) -> Vec<String> {
        vec![
            "-N".to_string(),
            score_path.display().to_string(),
            input_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "_".to_string()),
            output_path.display().to_string(),
            self.sample_rate.to_string(),
            self.header_format.clone(),
            self.sample_format.clone(),
            "-i".to_string(),
            self.input_bus_channel_count.to_string(),
            "-o".to_string(),
            self.output_bus_channel_count.to_string(),
        ]
    }
}
