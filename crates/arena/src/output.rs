//! Game record artifacts: appended PGN and EPD files plus the live
//! PGN/JSON pair rewritten after every finished game.
//!
//! Moves are written in coordinate notation, which every engine and most
//! chess software accepts; SAN conversion is not a goal here.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::game::{PlayedGame, Termination};
use crate::tournament::Standing;

/// How much detail goes into the PGN movetext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PgnMode {
    /// Clock and evaluation comments on every engine move.
    #[default]
    Verbose,
    /// Bare movetext.
    Minimal,
}

impl PgnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PgnMode::Verbose => "verbose",
            PgnMode::Minimal => "minimal",
        }
    }
}

impl FromStr for PgnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verbose" => Ok(PgnMode::Verbose),
            "min" | "minimal" => Ok(PgnMode::Minimal),
            other => Err(format!("invalid pgn mode: {}", other)),
        }
    }
}

/// Tournament-level tags shared by every written game.
#[derive(Debug, Clone)]
pub struct OutputMeta {
    pub event: String,
    pub site: String,
    pub date: String,
}

/// Appends finished games to a single PGN file.
pub struct PgnOutput {
    path: PathBuf,
    mode: PgnMode,
    write_unfinished: bool,
}

impl PgnOutput {
    pub fn new(path: impl Into<PathBuf>, mode: PgnMode, write_unfinished: bool) -> Self {
        Self {
            path: path.into(),
            mode,
            write_unfinished,
        }
    }

    pub fn append(&self, game: &PlayedGame, meta: &OutputMeta) -> std::io::Result<()> {
        if !self.write_unfinished && !game.outcome.is_terminal() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(format_pgn(game, meta, self.mode).as_bytes())
    }
}

/// Appends each game's final position to an EPD file.
pub struct EpdOutput {
    path: PathBuf,
}

impl EpdOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, game: &PlayedGame) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        writeln!(file, "{}", game.final_fen)
    }
}

/// Live progress artifacts, rewritten in place after every game.
pub struct LiveOutput {
    path: PathBuf,
    mode: PgnMode,
    pgn: bool,
    json: bool,
}

#[derive(Serialize)]
struct LiveDoc<'a> {
    event: &'a str,
    site: &'a str,
    #[serde(rename = "gamesCompleted")]
    games_completed: usize,
    standings: Vec<LiveStanding<'a>>,
    #[serde(rename = "lastGame")]
    last_game: LastGame<'a>,
}

#[derive(Serialize)]
struct LiveStanding<'a> {
    name: &'a str,
    wins: u32,
    draws: u32,
    losses: u32,
    score: i64,
    elo: f64,
}

#[derive(Serialize)]
struct LastGame<'a> {
    white: &'a str,
    black: &'a str,
    result: &'a str,
    termination: &'a str,
}

impl LiveOutput {
    pub fn new(path: impl Into<PathBuf>, mode: PgnMode, pgn: bool, json: bool) -> Self {
        Self {
            path: path.into(),
            mode,
            pgn,
            json,
        }
    }

    /// Rewrites the live artifacts for the newest finished game.
    pub fn write(
        &self,
        game: &PlayedGame,
        standings: &[Standing],
        completed: usize,
        meta: &OutputMeta,
    ) -> std::io::Result<()> {
        if self.pgn {
            std::fs::write(&self.path, format_pgn(game, meta, self.mode))?;
        }
        if self.json {
            let doc = LiveDoc {
                event: &meta.event,
                site: &meta.site,
                games_completed: completed,
                standings: standings
                    .iter()
                    .map(|s| LiveStanding {
                        name: &s.name,
                        wins: s.wins,
                        draws: s.draws,
                        losses: s.losses,
                        score: s.score,
                        elo: s.elo,
                    })
                    .collect(),
                last_game: LastGame {
                    white: &game.white_name,
                    black: &game.black_name,
                    result: game.outcome.as_str(),
                    termination: game.termination.detail(),
                },
            };
            let body = serde_json::to_string_pretty(&doc)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(self.json_path(), body)?;
        }
        Ok(())
    }

    fn json_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }
}

/// Renders one game as PGN: seven-tag roster, position tags for book
/// starts, and an explicit termination tag for abnormal ends.
pub fn format_pgn(game: &PlayedGame, meta: &OutputMeta, mode: PgnMode) -> String {
    let mut pgn = String::with_capacity(1024);
    let result = game.outcome.as_str();

    pgn.push_str(&format!("[Event \"{}\"]\n", meta.event));
    pgn.push_str(&format!("[Site \"{}\"]\n", meta.site));
    pgn.push_str(&format!("[Date \"{}\"]\n", meta.date));
    pgn.push_str(&format!("[Round \"{}\"]\n", game.round));
    pgn.push_str(&format!("[White \"{}\"]\n", game.white_name));
    pgn.push_str(&format!("[Black \"{}\"]\n", game.black_name));
    pgn.push_str(&format!("[Result \"{}\"]\n", result));
    if let Some(fen) = &game.opening.fen {
        pgn.push_str("[SetUp \"1\"]\n");
        pgn.push_str(&format!("[FEN \"{}\"]\n", fen));
    }
    if !matches!(game.termination, Termination::Normal) {
        pgn.push_str(&format!(
            "[Termination \"{}\"]\n",
            game.termination.detail()
        ));
    }
    pgn.push('\n');

    let mut tokens: Vec<String> = Vec::new();
    let opening_plies = game.opening.moves.len();
    // Book starts from a FEN may begin with black to move.
    let black_starts = game
        .opening
        .fen
        .as_deref()
        .and_then(|fen| fen.split_whitespace().nth(1))
        .map(|stm| stm == "b")
        .unwrap_or(false);

    for (ply, mv) in game
        .opening
        .moves
        .iter()
        .chain(game.moves.iter().map(|m| &m.mv))
        .enumerate()
    {
        let absolute = ply + usize::from(black_starts);
        if absolute % 2 == 0 {
            tokens.push(format!("{}.", absolute / 2 + 1));
        } else if ply == 0 {
            tokens.push(format!("{}...", absolute / 2 + 1));
        }
        tokens.push(mv.clone());

        if mode == PgnMode::Verbose && ply >= opening_plies {
            let record = &game.moves[ply - opening_plies];
            let score = match record.score_cp {
                Some(cp) => format!("{:+.2}", f64::from(cp) / 100.0),
                None => "?".to_string(),
            };
            let depth = record.depth.unwrap_or(0);
            tokens.push(format!(
                "{{{}/{} {:.3}s}}",
                score,
                depth,
                record.time_ms as f64 / 1000.0
            ));
        }
    }
    tokens.push(result.to_string());

    // Wrap movetext near 80 columns on token boundaries.
    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + token.len() + 1 > 80 {
            pgn.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            pgn.push(' ');
            line_len += 1;
        }
        line_len += token.len();
        pgn.push_str(&token);
    }
    pgn.push_str("\n\n");
    pgn
}
