//! The persisted tournament file: a JSON snapshot written atomically
//! after every completed pairing, and read back to resume a run.
//!
//! Field names are fixed for compatibility with external runners:
//! `tournamentSettings`, `engineSettings`, `matchProgress`, `strikes` and
//! `srand` at the top level, with the inner setting names the original
//! runner wrote (`gamesPerEncounter`, `Strikes`, `eloKfactor`, ...).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to access tournament file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tournament file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One completed (or in-flight) pairing in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub white: String,
    pub black: String,
    /// `1-0`, `0-1`, `1/2-1/2` or `*`.
    pub result: String,
    #[serde(rename = "terminationDetails", default)]
    pub termination_details: String,
}

impl ProgressEntry {
    /// Skipped pairings are terminal despite their `*` result.
    pub fn is_terminal(&self) -> bool {
        self.result != "*" || self.termination_details == "Skipped"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawAdjudicationDoc {
    pub movenumber: u32,
    pub movecount: u32,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResignAdjudicationDoc {
    pub movecount: u32,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SprtDoc {
    pub elo0: f64,
    pub elo1: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// Every configured tournament value that was set, under its wire name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDoc {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(rename = "eventDate", skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(rename = "gamesPerEncounter", skip_serializing_if = "Option::is_none")]
    pub games_per_encounter: Option<u32>,
    #[serde(rename = "roundMultiplier", skip_serializing_if = "Option::is_none")]
    pub round_multiplier: Option<u32>,
    #[serde(rename = "startDelay", skip_serializing_if = "Option::is_none")]
    pub start_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    #[serde(rename = "recoveryMode", skip_serializing_if = "Option::is_none")]
    pub recovery_mode: Option<bool>,
    #[serde(rename = "swapSides", skip_serializing_if = "Option::is_none")]
    pub swap_sides: Option<bool>,
    #[serde(rename = "openingRepetitions", skip_serializing_if = "Option::is_none")]
    pub opening_repetitions: Option<u32>,
    #[serde(rename = "maxMoves", skip_serializing_if = "Option::is_none")]
    pub max_moves: Option<u32>,
    #[serde(rename = "Strikes", skip_serializing_if = "Option::is_none")]
    pub strikes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<u32>,
    #[serde(rename = "bergerSchedule", skip_serializing_if = "Option::is_none")]
    pub berger_schedule: Option<bool>,
    #[serde(rename = "ratingInterval", skip_serializing_if = "Option::is_none")]
    pub rating_interval: Option<u32>,
    #[serde(rename = "eloKfactor", skip_serializing_if = "Option::is_none")]
    pub elo_kfactor: Option<f64>,
    #[serde(rename = "drawAdjudication", skip_serializing_if = "Option::is_none")]
    pub draw_adjudication: Option<DrawAdjudicationDoc>,
    #[serde(rename = "resignAdjudication", skip_serializing_if = "Option::is_none")]
    pub resign_adjudication: Option<ResignAdjudicationDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprt: Option<SprtDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tb: Option<String>,
    #[serde(rename = "tbPieces", skip_serializing_if = "Option::is_none")]
    pub tb_pieces: Option<u32>,
    #[serde(rename = "tbIgnore50", skip_serializing_if = "Option::is_none")]
    pub tb_ignore50: Option<bool>,
    #[serde(rename = "tbdrawonly", skip_serializing_if = "Option::is_none")]
    pub tb_draw_only: Option<bool>,
    #[serde(rename = "tcecAdjudication", skip_serializing_if = "Option::is_none")]
    pub tcec_adjudication: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmode: Option<String>,
    #[serde(rename = "pgnOutput", skip_serializing_if = "Option::is_none")]
    pub pgn_output: Option<String>,
    #[serde(rename = "pgnOutMode", skip_serializing_if = "Option::is_none")]
    pub pgn_out_mode: Option<String>,
    #[serde(rename = "pgnOutUnfinished", skip_serializing_if = "Option::is_none")]
    pub pgn_out_unfinished: Option<bool>,
    #[serde(rename = "livePgnOutput", skip_serializing_if = "Option::is_none")]
    pub live_pgn_output: Option<String>,
    #[serde(rename = "livePgnOutMode", skip_serializing_if = "Option::is_none")]
    pub live_pgn_out_mode: Option<String>,
    #[serde(rename = "pgnFormat", skip_serializing_if = "Option::is_none")]
    pub pgn_format: Option<bool>,
    #[serde(rename = "jsonFormat", skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
    #[serde(rename = "epdOutput", skip_serializing_if = "Option::is_none")]
    pub epd_output: Option<String>,
    #[serde(rename = "reloadConfiguration", skip_serializing_if = "Option::is_none")]
    pub reload_configuration: Option<bool>,
}

/// The engine argument lists exactly as the user supplied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettingsDoc {
    pub engines: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub each: Vec<String>,
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentFile {
    #[serde(rename = "tournamentSettings")]
    pub settings: SettingsDoc,
    #[serde(rename = "engineSettings")]
    pub engines: EngineSettingsDoc,
    #[serde(rename = "matchProgress", skip_serializing_if = "Vec::is_empty")]
    pub progress: Vec<ProgressEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub strikes: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srand: Option<u64>,
}

impl TournamentFile {
    /// Reads and migrates a tournament file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let value = schema::migrate(value);
        Ok(serde_json::from_value(value)?)
    }

    /// Writes the snapshot atomically: a temp sibling is written first
    /// and renamed over the target, so readers (including this process
    /// on resume) never observe a torn file. One retry on I/O failure,
    /// then the error is fatal to the tournament.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        match self.try_save(path) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!("tournament file write failed, retrying: {}", first);
                self.try_save(path)
            }
        }
    }

    fn try_save(&self, path: &Path) -> Result<(), PersistenceError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Drops everything from the first non-terminal entry on, so resume
    /// replays only settled pairings. `Skipped` entries are terminal and
    /// survive the cut.
    pub fn truncate_unterminated(&mut self) {
        if let Some(first) = self.progress.iter().position(|e| !e.is_terminal()) {
            self.progress.truncate(first);
        }
    }
}

mod schema {
    use serde_json::Value;

    /// Single migration point for persisted-schema bumps.
    ///
    /// v0 -> v1: `pgnOutMode` and `livePgnOutMode` were stored as the
    /// writer's enum integers (0 verbose, 1 minimal); they are strings
    /// now.
    pub fn migrate(mut value: Value) -> Value {
        if let Some(settings) = value
            .get_mut("tournamentSettings")
            .and_then(|v| v.as_object_mut())
        {
            for key in ["pgnOutMode", "livePgnOutMode"] {
                let migrated = match settings.get(key).and_then(|v| v.as_i64()) {
                    Some(0) => Some("verbose"),
                    Some(_) => Some("minimal"),
                    None => None,
                };
                if let Some(mode) = migrated {
                    settings.insert(key.to_string(), Value::from(mode));
                }
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TournamentFile {
        TournamentFile {
            settings: SettingsDoc {
                kind: Some("round-robin".to_string()),
                games_per_encounter: Some(2),
                round_multiplier: Some(1),
                strikes: Some(3),
                elo_kfactor: Some(32.0),
                event_date: Some("2026.08.02".to_string()),
                sprt: Some(SprtDoc {
                    elo0: 0.0,
                    elo1: 5.0,
                    alpha: 0.05,
                    beta: 0.05,
                }),
                ..Default::default()
            },
            engines: EngineSettingsDoc {
                engines: vec![
                    vec!["name=A".to_string(), "cmd=./a".to_string()],
                    vec!["name=B".to_string(), "cmd=./b".to_string()],
                ],
                each: vec!["proto=uci".to_string(), "tc=40/60".to_string()],
            },
            progress: vec![
                ProgressEntry {
                    white: "A".to_string(),
                    black: "B".to_string(),
                    result: "1-0".to_string(),
                    termination_details: "normal".to_string(),
                },
                ProgressEntry {
                    white: "B".to_string(),
                    black: "A".to_string(),
                    result: "*".to_string(),
                    termination_details: "Skipped".to_string(),
                },
                ProgressEntry {
                    white: "A".to_string(),
                    black: "B".to_string(),
                    result: "*".to_string(),
                    termination_details: String::new(),
                },
            ],
            strikes: [("A".to_string(), 0), ("B".to_string(), 2)]
                .into_iter()
                .collect(),
            srand: Some(123456789),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("tournamentSettings").is_some());
        assert!(value.get("engineSettings").is_some());
        assert!(value.get("matchProgress").is_some());
        assert!(value.get("strikes").is_some());
        assert_eq!(value["srand"], 123456789);

        let settings = &value["tournamentSettings"];
        assert_eq!(settings["type"], "round-robin");
        assert_eq!(settings["gamesPerEncounter"], 2);
        assert_eq!(settings["Strikes"], 3);
        assert_eq!(settings["eloKfactor"], 32.0);
        assert_eq!(settings["eventDate"], "2026.08.02");
        assert_eq!(settings["sprt"]["elo0"], 0.0);

        let entry = &value["matchProgress"][0];
        assert_eq!(entry["white"], "A");
        assert_eq!(entry["terminationDetails"], "normal");

        assert_eq!(value["engineSettings"]["each"][0], "proto=uci");
    }

    #[test]
    fn test_unset_values_are_omitted() {
        let value = serde_json::to_value(TournamentFile::default()).unwrap();
        let settings = value["tournamentSettings"].as_object().unwrap();
        assert!(settings.is_empty());
        assert!(value.get("matchProgress").is_none());
        assert!(value.get("srand").is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let file = sample();
        file.save(&path).unwrap();

        let loaded = TournamentFile::load(&path).unwrap();
        assert_eq!(loaded, file);

        // No leftover temp sibling.
        assert!(!dir.path().join("t.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let mut file = sample();
        file.save(&path).unwrap();

        file.progress.push(ProgressEntry {
            white: "B".to_string(),
            black: "A".to_string(),
            result: "0-1".to_string(),
            termination_details: "time forfeit".to_string(),
        });
        file.save(&path).unwrap();

        let loaded = TournamentFile::load(&path).unwrap();
        assert_eq!(loaded.progress.len(), 4);
    }

    #[test]
    fn test_truncation_keeps_skipped_entries() {
        let mut file = sample();
        file.truncate_unterminated();
        // The Skipped entry is terminal; the trailing "*" entry is not.
        assert_eq!(file.progress.len(), 2);
        assert_eq!(file.progress[1].termination_details, "Skipped");
    }

    #[test]
    fn test_progress_entry_terminality() {
        let done = ProgressEntry {
            white: "A".to_string(),
            black: "B".to_string(),
            result: "1/2-1/2".to_string(),
            termination_details: "stalemate".to_string(),
        };
        assert!(done.is_terminal());

        let skipped = ProgressEntry {
            result: "*".to_string(),
            termination_details: "Skipped".to_string(),
            ..done.clone()
        };
        assert!(skipped.is_terminal());

        let running = ProgressEntry {
            result: "*".to_string(),
            termination_details: String::new(),
            ..done
        };
        assert!(!running.is_terminal());
    }

    #[test]
    fn test_schema_migration_of_integer_pgn_modes() {
        let legacy = serde_json::json!({
            "tournamentSettings": {
                "type": "gauntlet",
                "pgnOutMode": 0,
                "livePgnOutMode": 1
            }
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, legacy.to_string()).unwrap();

        let file = TournamentFile::load(&path).unwrap();
        assert_eq!(file.settings.pgn_out_mode.as_deref(), Some("verbose"));
        assert_eq!(file.settings.live_pgn_out_mode.as_deref(), Some("minimal"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(matches!(
            TournamentFile::load("/nonexistent/t.json"),
            Err(PersistenceError::Io(_))
        ));
    }
}
