use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A pipeline file: the steps to run in order, plus run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Terminate the run if it is still going after this long
    #[serde(default)]
    pub cancel_after_ms: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Built-in integer steps. Each receives the previous step's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Replace the values with fixed ones
    Emit { values: Vec<i64> },
    /// Collapse the values into their sum
    Sum,
    /// Multiply every value
    Scale { factor: i64 },
    /// Pass values through after a pause
    Delay { ms: u64 },
    /// Fail the run
    Fail { message: String },
}

fn default_name() -> String {
    "pipeline".to_string()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse pipeline file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Deadline after which the run is terminated; `override_ms` wins over
    /// the file's own setting.
    pub fn cancel_after(&self, override_ms: Option<u64>) -> Option<Duration> {
        override_ms
            .or(self.cancel_after_ms)
            .map(Duration::from_millis)
    }
}
