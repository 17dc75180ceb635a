//! Spawning and supervising a single engine process.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::cecp;
use crate::uci;
use crate::{EngineError, EngineEvent, Protocol, SearchLimits};

/// Everything needed to start one engine process.
///
/// This is the launch recipe only; tournament-level identity and policy
/// live with the caller.
#[derive(Debug, Clone)]
pub struct EngineLaunch {
    /// Display name, used in logs and errors.
    pub name: String,
    /// Executable to run.
    pub command: String,
    /// Working directory for the child, if different from ours.
    pub working_dir: Option<PathBuf>,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// Protocol the engine speaks.
    pub protocol: Protocol,
    /// Lines written verbatim to the engine before the protocol handshake.
    pub init_strings: Vec<String>,
    /// File that captures the engine's stderr, opened in append mode.
    pub stderr_file: Option<PathBuf>,
    /// Option overrides applied after the handshake, already formatted.
    pub options: Vec<(String, String)>,
    /// Whether pondering should be enabled.
    pub ponder: bool,
}

impl EngineLaunch {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            working_dir: None,
            args: Vec::new(),
            protocol,
            init_strings: Vec::new(),
            stderr_file: None,
            options: Vec::new(),
            ponder: false,
        }
    }
}

/// A running engine process and its protocol session.
///
/// The child's stdout is drained by a dedicated reader thread which parses
/// each line and forwards the resulting [`EngineEvent`]s through a
/// single-consumer channel. All sends go through the owning handle, so a
/// game coordinator that holds the handle serializes its own traffic.
///
/// # Lifecycle
///
/// 1. [`EngineProcess::spawn`]
/// 2. [`handshake`](Self::handshake), then per game: [`new_game`](Self::new_game),
///    [`begin_position`](Self::begin_position), alternating
///    [`push_move`](Self::push_move) / [`request_move`](Self::request_move)
/// 3. [`shutdown`](Self::shutdown) (or rely on [`Drop`], which kills)
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    events: Receiver<EngineEvent>,
    reader: Option<JoinHandle<()>>,
    name: String,
    protocol: Protocol,
    features: Arc<Mutex<cecp::Features>>,
    go_pending: bool,
    ping_counter: u64,
    start_fen: Option<String>,
    moves: Vec<String>,
    declared_options: Vec<String>,
    pending_options: Vec<(String, String)>,
    ponder: bool,
}

impl EngineProcess {
    /// Spawns the engine and starts its reader thread.
    ///
    /// Init strings from the launch recipe are written verbatim before any
    /// protocol negotiation. stderr goes to the configured capture file
    /// (append mode) or is discarded.
    pub fn spawn(launch: &EngineLaunch) -> Result<Self, EngineError> {
        let stderr = match &launch.stderr_file {
            Some(path) => {
                let file = OpenOptions::new().append(true).create(true).open(path)?;
                Stdio::from(file)
            }
            None => Stdio::null(),
        };

        let mut command = Command::new(&launch.command);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr);
        if let Some(dir) = &launch.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let mut stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stdin pipe")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stdout pipe")
        })?;

        for init in &launch.init_strings {
            tracing::trace!(engine = %launch.name, "> {}", init);
            writeln!(stdin, "{}", init)?;
        }
        stdin.flush()?;

        let features = Arc::new(Mutex::new(cecp::Features::default()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let reader = spawn_reader(
            launch.name.clone(),
            launch.protocol,
            BufReader::new(stdout),
            tx,
            Arc::clone(&features),
        )?;

        Ok(Self {
            child,
            stdin,
            events: rx,
            reader: Some(reader),
            name: launch.name.clone(),
            protocol: launch.protocol,
            features,
            go_pending: false,
            ping_counter: 0,
            start_fen: None,
            moves: Vec::new(),
            declared_options: Vec::new(),
            pending_options: launch.options.clone(),
            ponder: launch.ponder,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Option names the engine declared during the handshake.
    pub fn declared_options(&self) -> &[String] {
        &self.declared_options
    }

    /// Whether a move request is outstanding.
    pub fn go_pending(&self) -> bool {
        self.go_pending
    }

    fn send(&mut self, line: &str) -> Result<(), EngineError> {
        tracing::trace!(engine = %self.name, "> {}", line);
        writeln!(self.stdin, "{}", line)?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Runs the protocol negotiation, then a ready probe.
    ///
    /// The negotiation itself gets one `window`; the ready probe gets the
    /// two-window escalation of [`ready`](Self::ready). CECP engines that
    /// never acknowledge `protover 2` are treated as protocol version 1
    /// once the window elapses.
    pub fn handshake(&mut self, window: Duration) -> Result<(), EngineError> {
        match self.protocol {
            Protocol::Uci => {
                self.send("uci")?;
                let deadline = Instant::now() + window;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.recv_event(remaining) {
                        Some(EngineEvent::ProtocolOk) => break,
                        Some(EngineEvent::IdName(name)) => self.name = name,
                        Some(EngineEvent::OptionDeclared { name, .. }) => {
                            self.declared_options.push(name)
                        }
                        Some(EngineEvent::Exited) => {
                            return Err(EngineError::Disconnected(self.name.clone()))
                        }
                        Some(_) => {}
                        None => {
                            return Err(EngineError::HandshakeTimeout(self.name.clone()))
                        }
                    }
                }
            }
            Protocol::Cecp => {
                self.send("xboard")?;
                self.send("protover 2")?;
                let deadline = Instant::now() + window;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.recv_event(remaining) {
                        Some(EngineEvent::ProtocolOk) => break,
                        Some(EngineEvent::IdName(name)) => self.name = name,
                        Some(EngineEvent::OptionDeclared { name, .. }) => {
                            self.declared_options.push(name)
                        }
                        Some(EngineEvent::Exited) => {
                            return Err(EngineError::Disconnected(self.name.clone()))
                        }
                        Some(_) => {}
                        None => break, // protocol version 1, no feature list
                    }
                }
            }
        }

        self.configure()?;
        self.ready(window)
    }

    /// Applies the launch recipe's option overrides and pondering mode.
    fn configure(&mut self) -> Result<(), EngineError> {
        let options = std::mem::take(&mut self.pending_options);
        for (name, value) in &options {
            self.set_option(name, value)?;
        }
        let ponder = self.ponder;
        self.set_ponder(ponder)?;
        Ok(())
    }

    /// Sends one engine option.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        match self.protocol {
            Protocol::Uci => self.send(&format!("setoption name {} value {}", name, value)),
            Protocol::Cecp => self.send(&format!("option {}={}", name, value)),
        }
    }

    /// Enables or disables pondering.
    pub fn set_ponder(&mut self, on: bool) -> Result<(), EngineError> {
        match self.protocol {
            Protocol::Uci => self.set_option("Ponder", if on { "true" } else { "false" }),
            Protocol::Cecp => self.send(if on { "hard" } else { "easy" }),
        }
    }

    /// Probes the engine and waits for the answer.
    ///
    /// If the first probe goes unanswered within `window`, one more probe
    /// and window are granted; after that the engine counts as hung and the
    /// caller should kill it.
    pub fn ready(&mut self, window: Duration) -> Result<(), EngineError> {
        if self.protocol == Protocol::Cecp {
            let has_ping = self.features.lock().map(|f| f.ping).unwrap_or(false);
            if !has_ping {
                // No synchronization primitive in the engine's dialect.
                return Ok(());
            }
        }
        for attempt in 0..2 {
            self.send_ready_probe()?;
            let deadline = Instant::now() + window;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.recv_event(remaining) {
                    Some(EngineEvent::Ready) => return Ok(()),
                    Some(EngineEvent::Exited) => {
                        return Err(EngineError::Disconnected(self.name.clone()))
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            if attempt == 0 {
                tracing::warn!(engine = %self.name, "ready probe unanswered, retrying");
            }
        }
        Err(EngineError::Hung(self.name.clone()))
    }

    fn send_ready_probe(&mut self) -> Result<(), EngineError> {
        match self.protocol {
            Protocol::Uci => self.send("isready"),
            Protocol::Cecp => {
                self.ping_counter += 1;
                let n = self.ping_counter;
                self.send(&format!("ping {}", n))
            }
        }
    }

    /// Resets the engine for a new game and waits for it to settle.
    pub fn new_game(&mut self, window: Duration) -> Result<(), EngineError> {
        self.start_fen = None;
        self.moves.clear();
        self.go_pending = false;
        match self.protocol {
            Protocol::Uci => {
                self.send("ucinewgame")?;
            }
            Protocol::Cecp => {
                self.send("new")?;
                self.send("force")?;
                self.send("post")?;
            }
        }
        self.ready(window)
    }

    /// Sets the CECP session clock: `level` for classical controls.
    ///
    /// No-op for UCI, where clocks travel with each `go`.
    pub fn set_level(
        &mut self,
        moves_per_tc: u32,
        base_ms: u64,
        increment_ms: u64,
    ) -> Result<(), EngineError> {
        if self.protocol != Protocol::Cecp {
            return Ok(());
        }
        let base = format_clock(base_ms);
        let inc = increment_ms as f64 / 1000.0;
        self.send(&format!("level {} {} {}", moves_per_tc, base, inc))
    }

    /// Sets a fixed per-move search time (CECP `st`). No-op for UCI.
    pub fn set_fixed_time(&mut self, ms: u64) -> Result<(), EngineError> {
        if self.protocol != Protocol::Cecp {
            return Ok(());
        }
        self.send(&format!("st {}", (ms as f64 / 1000.0).max(0.001)))
    }

    /// Sets a depth ceiling (CECP `sd`). No-op for UCI.
    pub fn set_depth_limit(&mut self, plies: u32) -> Result<(), EngineError> {
        if self.protocol != Protocol::Cecp {
            return Ok(());
        }
        self.send(&format!("sd {}", plies))
    }

    /// Establishes the starting position and opening moves for this game.
    pub fn begin_position(
        &mut self,
        fen: Option<&str>,
        opening_moves: &[String],
    ) -> Result<(), EngineError> {
        self.start_fen = fen.map(|s| s.to_string());
        self.moves.clear();
        if self.protocol == Protocol::Cecp {
            if let Some(fen) = fen {
                let setboard = self.features.lock().map(|f| f.setboard).unwrap_or(false);
                if !setboard {
                    return Err(EngineError::ProtocolViolation {
                        name: self.name.clone(),
                        detail: "engine lacks setboard, cannot start from FEN".to_string(),
                    });
                }
                self.send(&format!("setboard {}", fen))?;
            }
        }
        for mv in opening_moves {
            self.push_move(mv)?;
        }
        Ok(())
    }

    /// Relays a move the opponent played.
    ///
    /// CECP engines hear it immediately; UCI engines get the full move list
    /// with the next `position`.
    pub fn push_move(&mut self, mv: &str) -> Result<(), EngineError> {
        self.moves.push(mv.to_string());
        if self.protocol == Protocol::Cecp {
            let usermove = self.features.lock().map(|f| f.usermove).unwrap_or(false);
            let line = if usermove {
                format!("usermove {}", mv)
            } else {
                mv.to_string()
            };
            self.send(&line)?;
        }
        Ok(())
    }

    /// Records a move this engine played itself, so UCI position rebuilds
    /// stay complete. Nothing is sent.
    pub fn record_own_move(&mut self, mv: &str) {
        self.moves.push(mv.to_string());
    }

    /// Asks the engine to search and play a move for the side to move.
    ///
    /// At most one request may be outstanding; a second is rejected before
    /// anything is written to the engine.
    pub fn request_move(
        &mut self,
        limits: &SearchLimits,
        white_to_move: bool,
    ) -> Result<(), EngineError> {
        if self.go_pending {
            return Err(EngineError::GoPending(self.name.clone()));
        }
        match self.protocol {
            Protocol::Uci => {
                let position = uci::format_position(self.start_fen.as_deref(), &self.moves);
                self.send(&position)?;
                self.send(&uci::format_go(limits))?;
            }
            Protocol::Cecp => {
                for cmd in cecp::format_go(limits, white_to_move) {
                    self.send(&cmd)?;
                }
            }
        }
        self.go_pending = true;
        Ok(())
    }

    /// Interrupts an outstanding search.
    pub fn halt(&mut self) -> Result<(), EngineError> {
        if !self.go_pending {
            return Ok(());
        }
        match self.protocol {
            Protocol::Uci => self.send("stop"),
            Protocol::Cecp => self.send("?"),
        }
    }

    /// Receives the next event, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout. A closed channel is reported as
    /// [`EngineEvent::Exited`]. Receiving the pending `bestmove` clears the
    /// outstanding-request flag and, for CECP, puts the engine back into
    /// force mode so relayed opponent moves don't trigger a reply.
    pub fn recv_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                if matches!(event, EngineEvent::BestMove { .. }) {
                    self.go_pending = false;
                    if self.protocol == Protocol::Cecp {
                        let _ = self.send("force");
                    }
                }
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(EngineEvent::Exited),
        }
    }

    /// Asks the engine to quit, waits up to `grace`, then kills it.
    ///
    /// Every spawned child is reaped on all paths.
    pub fn shutdown(&mut self, grace: Duration) {
        let _ = self.halt();
        let _ = self.send("quit");
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(25));
                }
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    /// Kills the process immediately and reaps it.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    /// Whether the child is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for EngineProcess {
    /// Ensures the engine process is terminated when the handle is dropped.
    fn drop(&mut self) {
        let _ = self.send("quit");
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn spawn_reader(
    name: String,
    protocol: Protocol,
    stdout: BufReader<std::process::ChildStdout>,
    tx: Sender<EngineEvent>,
    features: Arc<Mutex<cecp::Features>>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("engine-{}", name))
        .spawn(move || {
            for line in stdout.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::trace!(engine = %name, "< {}", line);
                match protocol {
                    Protocol::Uci => {
                        if let Some(event) = uci::parse_line(line) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Protocol::Cecp => {
                        let events = match features.lock() {
                            Ok(mut features) => cecp::parse_line(line, &mut features),
                            Err(_) => break,
                        };
                        for event in events {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            let _ = tx.send(EngineEvent::Exited);
        })
}

/// Formats milliseconds as `min:sec` the way `level` expects.
fn format_clock(ms: u64) -> String {
    let total_secs = ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if seconds == 0 {
        format!("{}", minutes)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
