//! Engine configurations and the named-engine manager file.
//!
//! An [`EngineConfig`] is the immutable identity and launch recipe of one
//! engine: how to start it, which protocol it speaks, and which options to
//! set. Transient per-tournament counters (strikes, resume scores) live in
//! the tournament state, keyed by engine name.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use engine_client::{EngineLaunch, Protocol};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    /// A configuration file contained invalid JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// `conf=` referenced a name the engine manager doesn't know.
    #[error("unknown engine configuration: {0}")]
    UnknownEngine(String),
    /// A command-line value failed validation.
    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },
    /// A required field is missing after all sources were applied.
    #[error("{0}")]
    Incomplete(String),
}

/// Whether the engine process is restarted between games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Respawn only after an error-terminated game or a reported
    /// variant/option change that requires a reset.
    #[default]
    Auto,
    /// Terminate and respawn between every two games.
    On,
    /// Never terminate between games.
    Off,
}

impl FromStr for RestartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RestartMode::Auto),
            "on" => Ok(RestartMode::On),
            "off" => Ok(RestartMode::Off),
            other => Err(format!("invalid restart mode: {}", other)),
        }
    }
}

/// A typed engine option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl OptionValue {
    /// Infers the type from a command-line string.
    pub fn infer(s: &str) -> Self {
        if s == "true" {
            OptionValue::Bool(true)
        } else if s == "false" {
            OptionValue::Bool(false)
        } else if let Ok(n) = s.parse::<i64>() {
            OptionValue::Int(n)
        } else {
            OptionValue::Text(s.to_string())
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named option override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOption {
    pub name: String,
    pub value: OptionValue,
}

/// Identity and launch recipe for one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Display name; falls back to the engine's own id when empty.
    pub name: String,
    /// Executable to run.
    pub command: String,
    /// Working directory for the process.
    pub working_directory: Option<PathBuf>,
    /// Extra command-line arguments.
    pub arguments: Vec<String>,
    /// Protocol the engine speaks.
    pub protocol: Protocol,
    /// Lines sent verbatim before the protocol handshake.
    pub init_strings: Vec<String>,
    /// Path capturing the engine's stderr (append mode).
    pub stderr_file: Option<PathBuf>,
    /// Variants the engine supports.
    pub variants: Vec<String>,
    /// Restart policy between games.
    pub restart_mode: RestartMode,
    /// Whether result claims from the engine are validated. `trust`
    /// switches this off and claims are accepted verbatim.
    pub validate_claims: bool,
    /// Engine reports scores from white's point of view.
    pub white_eval_pov: bool,
    /// Pondering enabled.
    pub ponder: bool,
    /// Nominal rating, used for initial Elo estimates.
    pub rating: Option<i32>,
    /// Typed option overrides.
    pub options: Vec<EngineOption>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            working_directory: None,
            arguments: Vec::new(),
            protocol: Protocol::Uci,
            init_strings: Vec::new(),
            stderr_file: None,
            variants: Vec::new(),
            restart_mode: RestartMode::Auto,
            validate_claims: true,
            white_eval_pov: false,
            ponder: false,
            rating: None,
            options: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Sets or replaces a named option.
    pub fn set_option(&mut self, name: &str, value: OptionValue) {
        if let Some(existing) = self.options.iter_mut().find(|o| o.name == name) {
            existing.value = value;
        } else {
            self.options.push(EngineOption {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Builds the launch recipe for one process.
    pub fn launch(&self) -> EngineLaunch {
        EngineLaunch {
            name: self.name.clone(),
            command: self.command.clone(),
            working_dir: self.working_directory.clone(),
            args: self.arguments.clone(),
            protocol: self.protocol,
            init_strings: self.init_strings.clone(),
            stderr_file: self.stderr_file.clone(),
            options: self
                .options
                .iter()
                .map(|o| (o.name.clone(), o.value.to_string()))
                .collect(),
            ponder: self.ponder,
        }
    }
}

impl PartialEq for EngineConfig {
    /// Two configs are equal iff all identity, launch, protocol, init,
    /// variant, behavior-toggle and rating fields match and their option
    /// sets are equal by (name, value), regardless of order.
    fn eq(&self, other: &Self) -> bool {
        let options_equal = || {
            let mut a: Vec<_> = self.options.iter().collect();
            let mut b: Vec<_> = other.options.iter().collect();
            a.sort_by(|x, y| x.name.cmp(&y.name));
            b.sort_by(|x, y| x.name.cmp(&y.name));
            a == b
        };
        self.name == other.name
            && self.command == other.command
            && self.working_directory == other.working_directory
            && self.arguments == other.arguments
            && self.protocol == other.protocol
            && self.init_strings == other.init_strings
            && self.stderr_file == other.stderr_file
            && self.variants == other.variants
            && self.restart_mode == other.restart_mode
            && self.validate_claims == other.validate_claims
            && self.white_eval_pov == other.white_eval_pov
            && self.ponder == other.ponder
            && self.rating == other.rating
            && options_equal()
    }
}

/// The named-engine manager: a JSON file of reusable configurations that
/// `conf=` pulls from.
#[derive(Debug, Default)]
pub struct EngineManager {
    engines: Vec<EngineConfig>,
}

impl EngineManager {
    /// Loads `engines.json` from the given path; a missing file yields an
    /// empty manager.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let engines: Vec<EngineConfig> = serde_json::from_str(&content)?;
        Ok(Self { engines })
    }

    pub fn get(&self, name: &str) -> Result<&EngineConfig, ConfigError> {
        self.engines
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ConfigError::UnknownEngine(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|e| e.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_mode_from_str() {
        assert_eq!(RestartMode::from_str("auto").unwrap(), RestartMode::Auto);
        assert_eq!(RestartMode::from_str("on").unwrap(), RestartMode::On);
        assert_eq!(RestartMode::from_str("off").unwrap(), RestartMode::Off);
        assert!(RestartMode::from_str("sometimes").is_err());
    }

    #[test]
    fn test_option_value_inference() {
        assert_eq!(OptionValue::infer("true"), OptionValue::Bool(true));
        assert_eq!(OptionValue::infer("false"), OptionValue::Bool(false));
        assert_eq!(OptionValue::infer("512"), OptionValue::Int(512));
        assert_eq!(OptionValue::infer("-30"), OptionValue::Int(-30));
        assert_eq!(
            OptionValue::infer("nn-small.bin"),
            OptionValue::Text("nn-small.bin".to_string())
        );
    }

    #[test]
    fn test_set_option_replaces() {
        let mut config = EngineConfig::default();
        config.set_option("Hash", OptionValue::Int(64));
        config.set_option("Hash", OptionValue::Int(128));
        assert_eq!(config.options.len(), 1);
        assert_eq!(config.options[0].value, OptionValue::Int(128));
    }

    #[test]
    fn test_equality_ignores_option_order() {
        let mut a = EngineConfig {
            name: "e".to_string(),
            command: "./e".to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        a.set_option("Hash", OptionValue::Int(64));
        a.set_option("Threads", OptionValue::Int(2));
        b.set_option("Threads", OptionValue::Int(2));
        b.set_option("Hash", OptionValue::Int(64));
        assert_eq!(a, b);

        b.set_option("Hash", OptionValue::Int(128));
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_considers_toggles() {
        let a = EngineConfig {
            name: "e".to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.validate_claims = false;
        assert_ne!(a, b);
    }

    #[test]
    fn test_launch_recipe_formats_options() {
        let mut config = EngineConfig {
            name: "e".to_string(),
            command: "./engine".to_string(),
            ponder: true,
            ..Default::default()
        };
        config.set_option("Hash", OptionValue::Int(64));
        config.set_option("OwnBook", OptionValue::Bool(false));

        let launch = config.launch();
        assert_eq!(launch.name, "e");
        assert!(launch.ponder);
        assert_eq!(
            launch.options,
            vec![
                ("Hash".to_string(), "64".to_string()),
                ("OwnBook".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_manager_missing_file_is_empty() {
        let manager = EngineManager::load("/nonexistent/engines.json").unwrap();
        assert!(manager.names().next().is_none());
        assert!(manager.get("any").is_err());
    }

    #[test]
    fn test_manager_parses_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engines.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "name": "sf",
                    "command": "/usr/bin/stockfish",
                    "protocol": "uci",
                    "workingDirectory": "/tmp",
                    "initStrings": ["setoption name Threads value 1"],
                    "restartMode": "off"
                },
                {
                    "name": "gnuchess",
                    "command": "gnuchess",
                    "protocol": "cecp"
                }
            ]"#,
        )
        .unwrap();

        let manager = EngineManager::load(&path).unwrap();
        let sf = manager.get("sf").unwrap();
        assert_eq!(sf.command, "/usr/bin/stockfish");
        assert_eq!(sf.protocol, Protocol::Uci);
        assert_eq!(sf.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(sf.restart_mode, RestartMode::Off);
        assert!(sf.validate_claims);

        let gnu = manager.get("gnuchess").unwrap();
        assert_eq!(gnu.protocol, Protocol::Cecp);
        assert!(manager.get("komodo").is_err());
    }
}
