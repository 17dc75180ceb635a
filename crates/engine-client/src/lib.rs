//! Clients for external chess engines running as child processes.
//!
//! An engine is a separate program that talks a line-based text protocol
//! over its standard streams. Two protocols are supported:
//!
//! - [`Protocol::Uci`] - the Universal Chess Interface
//! - [`Protocol::Cecp`] - the Chess Engine Communication Protocol (xboard)
//!
//! Both are driven through the same handle, [`EngineProcess`]: spawn the
//! child, run the protocol handshake, feed it positions and moves, and
//! receive parsed [`EngineEvent`]s from a dedicated reader thread.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use engine_client::{EngineLaunch, EngineProcess, Protocol, SearchLimits};
//!
//! let launch = EngineLaunch::new("stockfish", "/usr/bin/stockfish", Protocol::Uci);
//! let mut engine = EngineProcess::spawn(&launch)?;
//! engine.handshake(Duration::from_secs(10))?;
//! engine.new_game(Duration::from_secs(10))?;
//! engine.begin_position(None, &[])?;
//! let limits = SearchLimits { movetime: Some(1000), ..Default::default() };
//! engine.request_move(&limits, true)?;
//! # Ok::<(), engine_client::EngineError>(())
//! ```

mod cecp;
mod process;
mod uci;

pub use process::{EngineLaunch, EngineProcess};
pub use uci::SearchInfo;

use thiserror::Error;

/// Wire protocol an engine speaks on its standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Universal Chess Interface.
    Uci,
    /// Chess Engine Communication Protocol (xboard).
    Cecp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Uci => "uci",
            Protocol::Cecp => "cecp",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uci" => Ok(Protocol::Uci),
            "cecp" | "xboard" => Ok(Protocol::Cecp),
            other => Err(format!("unsupported chess protocol: {}", other)),
        }
    }
}

/// Search bounds passed with a move request.
///
/// All fields are optional; the clock owner decides which ones to set.
/// Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchLimits {
    /// White time remaining.
    pub wtime: Option<u64>,
    /// Black time remaining.
    pub btime: Option<u64>,
    /// White increment per move.
    pub winc: Option<u64>,
    /// Black increment per move.
    pub binc: Option<u64>,
    /// Full moves to the next time control.
    pub movestogo: Option<u32>,
    /// Search for exactly this long.
    pub movetime: Option<u64>,
    /// Depth ceiling in plies.
    pub depth: Option<u32>,
    /// Node ceiling.
    pub nodes: Option<u64>,
    /// Search until told to stop.
    pub infinite: bool,
}

/// Parsed line from an engine, delivered through the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine finished searching and played a move.
    BestMove { mv: String, ponder: Option<String> },
    /// Search progress report.
    Info(SearchInfo),
    /// An option the engine declared during the handshake.
    OptionDeclared { name: String, default: Option<String> },
    /// Protocol negotiation finished (`uciok` / CECP `done=1`).
    ProtocolOk,
    /// Answer to a ready probe (`readyok` / `pong`).
    Ready,
    /// Engine identification.
    IdName(String),
    /// A game-result claim (CECP result lines and `resign`).
    ResultClaim { result: String, comment: String },
    /// The engine reported an error condition.
    Error(String),
    /// The engine's stdout closed; the process is gone or going.
    Exited,
}

/// Errors raised while launching or talking to an engine process.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to spawn the engine process or perform I/O on its streams.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    /// The engine did not answer a ready probe within two probe windows.
    #[error("engine {0} is not responding")]
    Hung(String),
    /// The handshake did not complete within the configured window.
    #[error("engine {0} failed the protocol handshake")]
    HandshakeTimeout(String),
    /// A response did not match the expected class for the last command.
    #[error("protocol violation from {name}: {detail}")]
    ProtocolViolation { name: String, detail: String },
    /// A second `go` was issued while one was still outstanding.
    #[error("engine {0} already has a pending move request")]
    GoPending(String),
    /// The engine process exited unexpectedly.
    #[error("engine {0} disconnected")]
    Disconnected(String),
}
