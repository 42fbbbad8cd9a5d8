//! Loop configuration stored in `tddloop.toml`.
//!
//! Loaded once at startup and passed by value into the oracle, harness and
//! loop constructors; nothing mutates it afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::response::MarkerSet;
use crate::io::harness::HarnessSettings;
use crate::io::oracle::CommandOracle;
use crate::io::prompt::DEFAULT_DIAGNOSTICS_BUDGET_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "tddloop.toml";

/// Top-level configuration (TOML).
///
/// Missing fields default to the values the loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum number of generate/revise attempts per task.
    pub max_attempts: u32,

    pub harness: HarnessConfig,

    pub oracle: OracleConfig,

    pub prompt: PromptConfig,

    pub markers: MarkerSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter used to run test entries.
    pub interpreter: String,
    /// Hard wall-clock budget per test run in seconds.
    pub timeout_secs: u64,
    /// Truncate combined test output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Shared scratch directory; defaults to `$TMPDIR/tddloop`.
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Command receiving the prompt on stdin (e.g. `["ollama", "run", "llama3"]`).
    pub command: Vec<String>,
    /// Per-request budget in seconds.
    pub timeout_secs: u64,
    /// Truncate oracle responses beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Diagnostics fed back for revision are tail-truncated to this many bytes.
    pub diagnostics_budget_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            harness: HarnessConfig::default(),
            oracle: OracleConfig::default(),
            prompt: PromptConfig::default(),
            markers: MarkerSet::default(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 10,
            output_limit_bytes: 100_000,
            scratch_dir: None,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["ollama".to_string(), "run".to_string(), "llama3".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            diagnostics_budget_bytes: DEFAULT_DIAGNOSTICS_BUDGET_BYTES,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        if self.harness.interpreter.trim().is_empty() {
            return Err(anyhow!("harness.interpreter must be non-empty"));
        }
        if self.harness.timeout_secs == 0 {
            return Err(anyhow!("harness.timeout_secs must be > 0"));
        }
        if self.harness.output_limit_bytes == 0 {
            return Err(anyhow!("harness.output_limit_bytes must be > 0"));
        }
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.prompt.diagnostics_budget_bytes == 0 {
            return Err(anyhow!("prompt.diagnostics_budget_bytes must be > 0"));
        }
        self.markers.validate().context("invalid markers")?;
        Ok(())
    }

    pub fn harness_settings(&self) -> HarnessSettings {
        HarnessSettings {
            interpreter: self.harness.interpreter.clone(),
            scratch_dir: self
                .harness
                .scratch_dir
                .clone()
                .unwrap_or_else(|| HarnessSettings::default().scratch_dir),
            timeout: Duration::from_secs(self.harness.timeout_secs),
            output_limit_bytes: self.harness.output_limit_bytes,
        }
    }

    pub fn command_oracle(&self) -> Result<CommandOracle> {
        CommandOracle::new(
            self.oracle.command.clone(),
            Duration::from_secs(self.oracle.timeout_secs),
            self.oracle.output_limit_bytes,
        )
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.harness.timeout_secs, 10);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tddloop.toml");
        let cfg = LoopConfig {
            max_attempts: 5,
            harness: HarnessConfig {
                scratch_dir: Some(temp.path().join("scratch")),
                ..HarnessConfig::default()
            },
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tddloop.toml");
        fs::write(
            &path,
            "max_attempts = 2\n\n[oracle]\ncommand = [\"codex\", \"exec\", \"-\"]\n\n[markers]\ntests_begin = \"<tests>\"\ntests_end = \"</tests>\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.oracle.command, vec!["codex", "exec", "-"]);
        assert_eq!(cfg.oracle.timeout_secs, OracleConfig::default().timeout_secs);
        assert_eq!(cfg.markers.solution_begin, "[FUNCTION]");
        assert_eq!(cfg.markers.tests_begin, "<tests>");
        assert_eq!(cfg.harness, HarnessConfig::default());
    }

    #[test]
    fn validate_rejects_zero_attempts_and_bad_markers() {
        let cfg = LoopConfig {
            max_attempts: 0,
            ..LoopConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = LoopConfig {
            markers: MarkerSet {
                tests_end: "[/FUNCTION]".to_string(),
                ..MarkerSet::default()
            },
            ..LoopConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:#}").contains("invalid markers"));
    }

    #[test]
    fn harness_settings_follow_config() {
        let cfg = LoopConfig {
            harness: HarnessConfig {
                interpreter: "python3.12".to_string(),
                timeout_secs: 3,
                ..HarnessConfig::default()
            },
            ..LoopConfig::default()
        };
        let settings = cfg.harness_settings();
        assert_eq!(settings.interpreter, "python3.12");
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert!(settings.scratch_dir.ends_with("tddloop"));
    }
}
