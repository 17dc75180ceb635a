//! The per-game state machine coordinating two engine processes.
//!
//! A game moves through `Setup -> WaitingForMove(side) -> MoveReceived ->
//! [Adjudicate] -> {WaitingForMove(other) | Finished}`. The coordinator
//! serializes all traffic on each engine, consults the adjudicator after
//! every half-move, and keeps the clocks honest: the clock of the side to
//! move runs from `go` to `bestmove`, and expiry past the margin preempts
//! any other outcome.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chess::{Board, BoardStatus, ChessMove, Color, Piece};
use engine_client::{EngineEvent, EngineProcess, Protocol};

use crate::adjudicator::{AdjudicationReason, Adjudicator, PlyScore, TablebaseProbe};
use crate::clock::{GameClock, TimeControl};
use crate::config::{EngineConfig, RestartMode};
use crate::openings::Opening;

/// Final game outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
    Unterminated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::WhiteWins => "1-0",
            Outcome::BlackWins => "0-1",
            Outcome::Draw => "1/2-1/2",
            Outcome::Unterminated => "*",
        }
    }

    pub fn winner(&self) -> Option<Color> {
        match self {
            Outcome::WhiteWins => Some(Color::White),
            Outcome::BlackWins => Some(Color::Black),
            _ => None,
        }
    }

    pub fn for_winner(side: Color) -> Self {
        match side {
            Color::White => Outcome::WhiteWins,
            Color::Black => Outcome::BlackWins,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Unterminated)
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1-0" => Ok(Outcome::WhiteWins),
            "0-1" => Ok(Outcome::BlackWins),
            "1/2-1/2" => Ok(Outcome::Draw),
            "*" => Ok(Outcome::Unterminated),
            other => Err(format!("invalid outcome: {}", other)),
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Normal,
    Resignation,
    Stalemate,
    FiftyMoves,
    ThreefoldRepetition,
    InsufficientMaterial,
    Adjudication(AdjudicationReason),
    Timeout,
    IllegalMove,
    Disconnect,
    Crash,
    Skipped,
    Unterminated,
}

impl Termination {
    /// Stable string written to the persisted `terminationDetails` field.
    pub fn detail(&self) -> &'static str {
        match self {
            Termination::Normal => "normal",
            Termination::Resignation => "resignation",
            Termination::Stalemate => "stalemate",
            Termination::FiftyMoves => "fifty moves rule",
            Termination::ThreefoldRepetition => "threefold repetition",
            Termination::InsufficientMaterial => "insufficient material",
            Termination::Adjudication(AdjudicationReason::Draw) => "draw by adjudication",
            Termination::Adjudication(AdjudicationReason::Resign) => "resign by adjudication",
            Termination::Adjudication(AdjudicationReason::Tablebase) => "tablebase adjudication",
            Termination::Adjudication(AdjudicationReason::Tcec) => "TCEC adjudication",
            Termination::Adjudication(AdjudicationReason::MaxMoves) => "maximum game length",
            Termination::Timeout => "time forfeit",
            Termination::IllegalMove => "illegal move",
            Termination::Disconnect => "disconnects",
            Termination::Crash => "crashed",
            Termination::Skipped => "Skipped",
            Termination::Unterminated => "unterminated",
        }
    }

    /// Recovers the termination from a persisted detail string. Unknown
    /// strings fall back to a normal termination, which earns no strike.
    pub fn from_detail(detail: &str) -> Termination {
        match detail {
            "normal" => Termination::Normal,
            "resignation" => Termination::Resignation,
            "stalemate" => Termination::Stalemate,
            "fifty moves rule" => Termination::FiftyMoves,
            "threefold repetition" => Termination::ThreefoldRepetition,
            "insufficient material" => Termination::InsufficientMaterial,
            "draw by adjudication" => Termination::Adjudication(AdjudicationReason::Draw),
            "resign by adjudication" => Termination::Adjudication(AdjudicationReason::Resign),
            "tablebase adjudication" => Termination::Adjudication(AdjudicationReason::Tablebase),
            "TCEC adjudication" => Termination::Adjudication(AdjudicationReason::Tcec),
            "maximum game length" => Termination::Adjudication(AdjudicationReason::MaxMoves),
            "time forfeit" => Termination::Timeout,
            "illegal move" => Termination::IllegalMove,
            "disconnects" => Termination::Disconnect,
            "crashed" => Termination::Crash,
            "Skipped" => Termination::Skipped,
            "unterminated" => Termination::Unterminated,
            _ => Termination::Normal,
        }
    }

    /// Whether this termination counts a strike against the losing engine.
    pub fn earns_strike(&self) -> bool {
        matches!(
            self,
            Termination::Timeout
                | Termination::IllegalMove
                | Termination::Disconnect
                | Termination::Crash
        )
    }
}

/// One move as played, with the search report that accompanied it.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    /// Coordinate notation, e.g. `e2e4`.
    pub mv: String,
    /// Score in centipawns from the mover's point of view.
    pub score_cp: Option<i32>,
    pub depth: Option<u32>,
    pub time_ms: u64,
}

/// Everything needed to play one scheduled game.
#[derive(Debug, Clone)]
pub struct GameSpec {
    /// Position in the tournament's production order.
    pub game_number: usize,
    pub round: u32,
    pub white: EngineConfig,
    pub black: EngineConfig,
    pub white_tc: TimeControl,
    pub black_tc: TimeControl,
    pub opening: Opening,
    pub adjudicator: Adjudicator,
}

/// Windows for handshakes and shutdowns, independent of the game clock.
#[derive(Debug, Clone)]
pub struct GameTimeouts {
    pub handshake: Duration,
    pub shutdown: Duration,
}

impl Default for GameTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            shutdown: Duration::from_secs(5),
        }
    }
}

/// A finished (or aborted) game as published to the tournament.
#[derive(Debug, Clone)]
pub struct PlayedGame {
    pub game_number: usize,
    pub round: u32,
    pub white_name: String,
    pub black_name: String,
    pub outcome: Outcome,
    pub termination: Termination,
    pub moves: Vec<MoveRecord>,
    pub opening: Opening,
    pub final_fen: String,
    /// Clock time consumed per side, white first.
    pub time_used_ms: [u64; 2],
    /// A spawn or handshake failure ended this game before it began.
    pub launch_failure: bool,
}

impl PlayedGame {
    /// Synthetic result for a pairing skipped because a participant was
    /// eliminated. No process is spawned for these.
    pub fn skipped(game_number: usize, round: u32, white: &str, black: &str) -> Self {
        Self {
            game_number,
            round,
            white_name: white.to_string(),
            black_name: black.to_string(),
            outcome: Outcome::Unterminated,
            termination: Termination::Skipped,
            moves: Vec::new(),
            opening: Opening::startpos(),
            final_fen: Board::default().to_string(),
            time_used_ms: [0, 0],
            launch_failure: false,
        }
    }

    /// The engine that lost, when the outcome is decisive.
    pub fn loser(&self) -> Option<&str> {
        match self.outcome {
            Outcome::WhiteWins => Some(&self.black_name),
            Outcome::BlackWins => Some(&self.white_name),
            _ => None,
        }
    }
}

/// Engine processes kept alive between games, keyed by engine name.
///
/// Restart policy decides whether a process goes back into the cache when
/// its game ends: `off` always keeps it, `auto` keeps it unless the game
/// ended on an engine error, `on` never does.
#[derive(Default)]
pub struct ProcessCache {
    engines: HashMap<String, EngineProcess>,
}

impl ProcessCache {
    pub fn take(&mut self, config: &EngineConfig) -> Option<EngineProcess> {
        if config.restart_mode == RestartMode::On {
            if let Some(mut stale) = self.engines.remove(&config.name) {
                stale.shutdown(Duration::from_secs(2));
            }
            return None;
        }
        let mut engine = self.engines.remove(&config.name)?;
        if engine.is_alive() {
            Some(engine)
        } else {
            None
        }
    }

    pub fn store(&mut self, name: &str, engine: EngineProcess) {
        if let Some(mut old) = self.engines.insert(name.to_string(), engine) {
            old.shutdown(Duration::from_secs(2));
        }
    }

    /// Shuts down every cached process.
    pub fn clear(&mut self, grace: Duration) {
        for (_, mut engine) in self.engines.drain() {
            engine.shutdown(grace);
        }
    }
}

/// Runtime collaborators a game borrows from its scheduler slot.
pub struct GameContext<'a> {
    pub cache: &'a mut ProcessCache,
    pub probe: Option<&'a dyn TablebaseProbe>,
    pub timeouts: &'a GameTimeouts,
    pub stop: &'a AtomicBool,
}

/// Plays one game to completion.
///
/// Every error path resolves into a [`PlayedGame`]; game-local failures
/// never escape to the scheduler.
pub fn run_game(spec: &GameSpec, ctx: &mut GameContext<'_>) -> PlayedGame {
    let mut driver = match Driver::setup(spec, ctx) {
        Ok(driver) => driver,
        Err(failure) => return failure.into_played(spec),
    };
    let finish = driver.play(spec, ctx);
    driver.finalize(spec, ctx, finish)
}

/// The settled end of a game, before bookkeeping.
struct Finish {
    outcome: Outcome,
    termination: Termination,
}

/// A spawn or handshake failure; the game never started.
struct SetupFailure {
    side: Color,
    detail: String,
}

impl SetupFailure {
    fn into_played(self, spec: &GameSpec) -> PlayedGame {
        let offender = if self.side == Color::White {
            &spec.white.name
        } else {
            &spec.black.name
        };
        tracing::warn!(
            game = spec.game_number,
            engine = %offender,
            "launch failed: {}",
            self.detail
        );
        PlayedGame {
            game_number: spec.game_number,
            round: spec.round,
            white_name: spec.white.name.clone(),
            black_name: spec.black.name.clone(),
            outcome: Outcome::for_winner(!self.side),
            termination: Termination::Crash,
            moves: Vec::new(),
            opening: spec.opening.clone(),
            final_fen: Board::default().to_string(),
            time_used_ms: [0, 0],
            launch_failure: true,
        }
    }
}

struct Driver {
    /// White at index 0, black at index 1.
    engines: Vec<EngineProcess>,
    board: Board,
    clock: GameClock,
    moves: Vec<MoveRecord>,
    history: Vec<PlyScore>,
    position_counts: HashMap<u64, u32>,
    halfmove_clock: u32,
    opening_plies: u32,
    engine_error: [bool; 2],
}

fn idx(side: Color) -> usize {
    side.to_index()
}

impl Driver {
    /// Spawns (or reuses) both engines and sets up the starting position.
    fn setup(spec: &GameSpec, ctx: &mut GameContext<'_>) -> Result<Self, SetupFailure> {
        let mut engines: Vec<EngineProcess> = Vec::with_capacity(2);
        for (side, config) in [(Color::White, &spec.white), (Color::Black, &spec.black)] {
            let engine = match ctx.cache.take(config) {
                Some(engine) => engine,
                None => {
                    let mut engine =
                        EngineProcess::spawn(&config.launch()).map_err(|e| SetupFailure {
                            side,
                            detail: e.to_string(),
                        })?;
                    if let Err(e) = engine.handshake(ctx.timeouts.handshake) {
                        engine.kill();
                        return Err(SetupFailure {
                            side,
                            detail: e.to_string(),
                        });
                    }
                    engine
                }
            };
            engines.push(engine);
        }

        // Per-game setup: reset, clocks, starting position.
        for (i, tc) in [&spec.white_tc, &spec.black_tc].into_iter().enumerate() {
            let side = if i == 0 { Color::White } else { Color::Black };
            let engine = &mut engines[i];
            let result = (|| {
                engine.new_game(ctx.timeouts.handshake)?;
                if engine.protocol() == Protocol::Cecp {
                    if tc.is_classical() {
                        engine.set_level(tc.moves_per_tc, tc.time_per_tc_ms, tc.increment_ms)?;
                    } else if tc.is_per_move() {
                        engine.set_fixed_time(tc.time_per_move_ms)?;
                    }
                    if let Some(depth) = tc.ply_limit {
                        engine.set_depth_limit(depth)?;
                    }
                }
                engine.begin_position(spec.opening.fen.as_deref(), &spec.opening.moves)
            })();
            if let Err(e) = result {
                for engine in &mut engines {
                    engine.kill();
                }
                return Err(SetupFailure {
                    side,
                    detail: e.to_string(),
                });
            }
        }

        // Replay the opening on our own board; the rules collaborator is
        // the authority on legality.
        let mut board = match &spec.opening.fen {
            Some(fen) => Board::from_str(fen).map_err(|_| SetupFailure {
                side: Color::White,
                detail: format!("unparseable opening position {}", fen),
            })?,
            None => Board::default(),
        };
        let mut position_counts = HashMap::new();
        let mut halfmove_clock = 0;
        *position_counts.entry(board.get_hash()).or_insert(0) += 1;
        for mv in &spec.opening.moves {
            let parsed = ChessMove::from_str(mv).ok().filter(|m| board.legal(*m));
            let Some(parsed) = parsed else {
                for engine in &mut engines {
                    engine.kill();
                }
                return Err(SetupFailure {
                    side: Color::White,
                    detail: format!("illegal opening move {}", mv),
                });
            };
            halfmove_clock = next_halfmove_clock(&board, parsed, halfmove_clock);
            board = board.make_move_new(parsed);
            *position_counts.entry(board.get_hash()).or_insert(0) += 1;
        }

        Ok(Self {
            engines,
            board,
            clock: GameClock::new(spec.white_tc.clone(), spec.black_tc.clone()),
            moves: Vec::new(),
            history: Vec::new(),
            position_counts,
            halfmove_clock,
            opening_plies: spec.opening.moves.len() as u32,
            engine_error: [false, false],
        })
    }

    fn plies(&self) -> u32 {
        self.opening_plies + self.moves.len() as u32
    }

    /// The main move loop.
    fn play(&mut self, spec: &GameSpec, ctx: &mut GameContext<'_>) -> Finish {
        loop {
            if ctx.stop.load(Ordering::Relaxed) {
                return Finish {
                    outcome: Outcome::Unterminated,
                    termination: Termination::Unterminated,
                };
            }
            if let Some(finish) = self.board_verdict() {
                return finish;
            }

            let side = self.board.side_to_move();
            match self.one_move(spec, ctx, side) {
                Ok(()) => {}
                Err(finish) => return finish,
            }

            // Adjudication sees every half-move exactly once, in order,
            // before the next move request goes out.
            let repetitions = *self
                .position_counts
                .get(&self.board.get_hash())
                .unwrap_or(&1);
            if let Some(decision) = spec.adjudicator.adjudicate(
                &self.history,
                &self.board,
                self.plies(),
                repetitions,
                ctx.probe,
            ) {
                return Finish {
                    outcome: match decision.winner {
                        Some(side) => Outcome::for_winner(side),
                        None => Outcome::Draw,
                    },
                    termination: Termination::Adjudication(decision.reason),
                };
            }
        }
    }

    /// Terminal verdict from the rules collaborator, if the position is
    /// already decided.
    fn board_verdict(&self) -> Option<Finish> {
        let side = self.board.side_to_move();
        match self.board.status() {
            BoardStatus::Checkmate => {
                return Some(Finish {
                    outcome: Outcome::for_winner(!side),
                    termination: Termination::Normal,
                })
            }
            BoardStatus::Stalemate => {
                return Some(Finish {
                    outcome: Outcome::Draw,
                    termination: Termination::Stalemate,
                })
            }
            BoardStatus::Ongoing => {}
        }
        if self
            .position_counts
            .get(&self.board.get_hash())
            .is_some_and(|&n| n >= 3)
        {
            return Some(Finish {
                outcome: Outcome::Draw,
                termination: Termination::ThreefoldRepetition,
            });
        }
        if self.halfmove_clock >= 100 {
            return Some(Finish {
                outcome: Outcome::Draw,
                termination: Termination::FiftyMoves,
            });
        }
        if insufficient_material(&self.board) {
            return Some(Finish {
                outcome: Outcome::Draw,
                termination: Termination::InsufficientMaterial,
            });
        }
        None
    }

    /// Requests and applies one move from `side`. Errors are finishes.
    fn one_move(
        &mut self,
        spec: &GameSpec,
        ctx: &mut GameContext<'_>,
        side: Color,
    ) -> Result<(), Finish> {
        let limits = self.clock.search_limits(side);
        self.clock.start(side);
        if let Err(e) = self.engines[idx(side)].request_move(&limits, side == Color::White) {
            self.clock.stop();
            self.engine_error[idx(side)] = true;
            tracing::warn!(game = spec.game_number, "move request failed: {}", e);
            return Err(Finish {
                outcome: Outcome::for_winner(!side),
                termination: Termination::Disconnect,
            });
        }

        let config = if side == Color::White {
            &spec.white
        } else {
            &spec.black
        };
        let tc = self.clock.time_control(side).clone();
        let deadline = if tc.infinite || (!tc.is_classical() && !tc.is_per_move()) {
            None
        } else {
            let budget = self.clock.remaining(side).max(0) as u64 + tc.expiry_margin_ms;
            Some(Instant::now() + Duration::from_millis(budget))
        };

        let mut last_score: Option<i32> = None;
        let mut last_depth: Option<u32> = None;

        let best_move = loop {
            if ctx.stop.load(Ordering::Relaxed) {
                self.clock.stop();
                let _ = self.engines[idx(side)].halt();
                return Err(Finish {
                    outcome: Outcome::Unterminated,
                    termination: Termination::Unterminated,
                });
            }
            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        // Flag fell further than the margin allows.
                        self.clock.stop();
                        self.engine_error[idx(side)] = true;
                        let _ = self.engines[idx(side)].halt();
                        return Err(Finish {
                            outcome: Outcome::for_winner(!side),
                            termination: Termination::Timeout,
                        });
                    }
                    left.min(Duration::from_millis(200))
                }
                None => Duration::from_millis(200),
            };

            match self.engines[idx(side)].recv_event(slice) {
                None => continue,
                Some(EngineEvent::Info(info)) => {
                    if let Some(score) = info.centipawns() {
                        // Normalize to the mover's point of view.
                        let score = if config.white_eval_pov && side == Color::Black {
                            -score
                        } else {
                            score
                        };
                        last_score = Some(score);
                    }
                    if info.depth.is_some() {
                        last_depth = info.depth;
                    }
                }
                Some(EngineEvent::BestMove { mv, .. }) => break mv,
                Some(EngineEvent::ResultClaim { result, comment }) => {
                    self.clock.stop();
                    return Err(self.handle_claim(config, side, &result, &comment));
                }
                Some(EngineEvent::Error(detail)) => {
                    self.clock.stop();
                    self.engine_error[idx(side)] = true;
                    tracing::warn!(
                        game = spec.game_number,
                        engine = %config.name,
                        "protocol violation: {}",
                        detail
                    );
                    return Err(Finish {
                        outcome: Outcome::for_winner(!side),
                        termination: Termination::Crash,
                    });
                }
                Some(EngineEvent::Exited) => {
                    self.clock.stop();
                    self.engine_error[idx(side)] = true;
                    return Err(Finish {
                        outcome: Outcome::for_winner(!side),
                        termination: Termination::Disconnect,
                    });
                }
                Some(_) => {}
            }
        };

        let elapsed = self.clock.stop();
        self.clock.register_move(side);
        self.clock.grant_increment(side);

        // Clock expiry preempts any other outcome of this move.
        if self.clock.expired(side) {
            self.engine_error[idx(side)] = true;
            return Err(Finish {
                outcome: Outcome::for_winner(!side),
                termination: Termination::Timeout,
            });
        }

        if best_move.is_empty() || best_move == "(none)" || best_move == "0000" {
            // A null move in a position with legal moves left is a
            // protocol violation.
            self.engine_error[idx(side)] = true;
            return Err(Finish {
                outcome: Outcome::for_winner(!side),
                termination: Termination::Crash,
            });
        }

        let parsed = ChessMove::from_str(&best_move)
            .ok()
            .or_else(|| ChessMove::from_san(&self.board, &best_move).ok())
            .filter(|mv| self.board.legal(*mv));
        let Some(parsed) = parsed else {
            self.engine_error[idx(side)] = true;
            tracing::warn!(
                game = spec.game_number,
                engine = %config.name,
                "illegal move: {}",
                best_move
            );
            return Err(Finish {
                outcome: Outcome::for_winner(!side),
                termination: Termination::IllegalMove,
            });
        };

        self.halfmove_clock = next_halfmove_clock(&self.board, parsed, self.halfmove_clock);
        self.board = self.board.make_move_new(parsed);
        *self
            .position_counts
            .entry(self.board.get_hash())
            .or_insert(0) += 1;

        let coord = parsed.to_string();
        self.moves.push(MoveRecord {
            mv: coord.clone(),
            score_cp: last_score,
            depth: last_depth,
            time_ms: elapsed,
        });
        self.history.push(PlyScore {
            side,
            score_cp: last_score,
        });

        self.engines[idx(side)].record_own_move(&coord);
        if let Err(e) = self.engines[idx(!side)].push_move(&coord) {
            self.engine_error[idx(!side)] = true;
            tracing::warn!(game = spec.game_number, "relay failed: {}", e);
            return Err(Finish {
                outcome: Outcome::for_winner(side),
                termination: Termination::Disconnect,
            });
        }

        Ok(())
    }

    /// Resolves a CECP result claim or resignation from `side`.
    fn handle_claim(
        &mut self,
        config: &EngineConfig,
        side: Color,
        result: &str,
        comment: &str,
    ) -> Finish {
        if result == "resign" {
            return Finish {
                outcome: Outcome::for_winner(!side),
                termination: Termination::Resignation,
            };
        }
        let claimed = Outcome::from_str(result).unwrap_or(Outcome::Unterminated);
        if !config.validate_claims {
            // Trusted engines end the game with whatever they claim.
            return Finish {
                outcome: claimed,
                termination: Termination::Normal,
            };
        }
        // A claim is only honored when the rules collaborator agrees.
        let actual = match self.board.status() {
            BoardStatus::Checkmate => Outcome::for_winner(!self.board.side_to_move()),
            BoardStatus::Stalemate => Outcome::Draw,
            BoardStatus::Ongoing => Outcome::Unterminated,
        };
        if claimed == actual && claimed.is_terminal() {
            let termination = if actual == Outcome::Draw {
                Termination::Stalemate
            } else {
                Termination::Normal
            };
            return Finish {
                outcome: actual,
                termination,
            };
        }
        tracing::warn!(engine = %config.name, "false result claim {} ({})", result, comment);
        self.engine_error[idx(side)] = true;
        Finish {
            outcome: Outcome::for_winner(!side),
            termination: Termination::Crash,
        }
    }

    /// Publishes the result and returns engines to the cache or shuts
    /// them down, per restart policy.
    fn finalize(
        mut self,
        spec: &GameSpec,
        ctx: &mut GameContext<'_>,
        finish: Finish,
    ) -> PlayedGame {
        let mut time_used_ms = [0u64, 0];
        for (record, ply) in self.moves.iter().zip(self.history.iter()) {
            time_used_ms[idx(ply.side)] += record.time_ms;
        }
        let final_fen = self.board.to_string();

        let stopping = ctx.stop.load(Ordering::Relaxed);
        for (i, mut engine) in self.engines.drain(..).enumerate() {
            let config = if i == 0 { &spec.white } else { &spec.black };
            let keep = !stopping
                && !self.engine_error[i]
                && config.restart_mode != RestartMode::On
                && engine.is_alive();
            if keep {
                ctx.cache.store(&config.name, engine);
            } else {
                engine.shutdown(ctx.timeouts.shutdown);
            }
        }

        PlayedGame {
            game_number: spec.game_number,
            round: spec.round,
            white_name: spec.white.name.clone(),
            black_name: spec.black.name.clone(),
            outcome: finish.outcome,
            termination: finish.termination,
            moves: self.moves,
            opening: spec.opening.clone(),
            final_fen,
            time_used_ms,
            launch_failure: false,
        }
    }
}

/// Halfmove clock per the 50-move rule: reset on captures and pawn moves.
fn next_halfmove_clock(board: &Board, mv: ChessMove, clock: u32) -> u32 {
    let is_capture = board.piece_on(mv.get_dest()).is_some();
    let is_pawn_move = board.piece_on(mv.get_source()) == Some(Piece::Pawn);
    if is_capture || is_pawn_move {
        0
    } else {
        clock + 1
    }
}

/// Neither side can possibly deliver mate: bare kings, a lone minor
/// piece, or a same-colored bishop each.
pub fn insufficient_material(board: &Board) -> bool {
    let total = board.combined().popcnt();
    if total == 2 {
        return true;
    }
    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops = board.pieces(Piece::Bishop).popcnt();
    if total == 3 && knights + bishops == 1 {
        return true;
    }
    if total == 4 && bishops == 2 && knights == 0 {
        let bishops_bb = *board.pieces(Piece::Bishop);
        let per_side = (bishops_bb & *board.color_combined(Color::White)).popcnt();
        let squares: Vec<chess::Square> = bishops_bb.collect();
        let shade =
            |sq: chess::Square| (sq.get_rank().to_index() + sq.get_file().to_index()) % 2;
        return per_side == 1 && squares.len() == 2 && shade(squares[0]) == shade(squares[1]);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [
            Outcome::WhiteWins,
            Outcome::BlackWins,
            Outcome::Draw,
            Outcome::Unterminated,
        ] {
            assert_eq!(Outcome::from_str(outcome.as_str()).unwrap(), outcome);
        }
        assert!(Outcome::from_str("2-0").is_err());
    }

    #[test]
    fn test_outcome_winner() {
        assert_eq!(Outcome::WhiteWins.winner(), Some(Color::White));
        assert_eq!(Outcome::BlackWins.winner(), Some(Color::Black));
        assert_eq!(Outcome::Draw.winner(), None);
        assert_eq!(Outcome::for_winner(Color::Black), Outcome::BlackWins);
    }

    #[test]
    fn test_termination_detail_round_trip() {
        let all = [
            Termination::Normal,
            Termination::Resignation,
            Termination::Stalemate,
            Termination::FiftyMoves,
            Termination::ThreefoldRepetition,
            Termination::InsufficientMaterial,
            Termination::Adjudication(AdjudicationReason::Draw),
            Termination::Adjudication(AdjudicationReason::Resign),
            Termination::Adjudication(AdjudicationReason::Tablebase),
            Termination::Adjudication(AdjudicationReason::Tcec),
            Termination::Adjudication(AdjudicationReason::MaxMoves),
            Termination::Timeout,
            Termination::IllegalMove,
            Termination::Disconnect,
            Termination::Crash,
            Termination::Skipped,
            Termination::Unterminated,
        ];
        for termination in all {
            assert_eq!(Termination::from_detail(termination.detail()), termination);
        }
        assert_eq!(Termination::from_detail("who knows"), Termination::Normal);
    }

    #[test]
    fn test_strike_worthy_terminations() {
        assert!(Termination::Timeout.earns_strike());
        assert!(Termination::IllegalMove.earns_strike());
        assert!(Termination::Crash.earns_strike());
        assert!(Termination::Disconnect.earns_strike());
        assert!(!Termination::Normal.earns_strike());
        assert!(!Termination::Skipped.earns_strike());
        assert!(!Termination::Adjudication(AdjudicationReason::Resign).earns_strike());
    }

    #[test]
    fn test_skipped_result_shape() {
        let game = PlayedGame::skipped(7, 2, "a", "b");
        assert_eq!(game.outcome, Outcome::Unterminated);
        assert_eq!(game.termination, Termination::Skipped);
        assert_eq!(game.termination.detail(), "Skipped");
        assert!(game.moves.is_empty());
        assert_eq!(game.loser(), None);
    }

    #[test]
    fn test_loser_attribution() {
        let mut game = PlayedGame::skipped(0, 1, "alpha", "beta");
        game.outcome = Outcome::WhiteWins;
        assert_eq!(game.loser(), Some("beta"));
        game.outcome = Outcome::BlackWins;
        assert_eq!(game.loser(), Some("alpha"));
    }

    #[test]
    fn test_halfmove_clock_resets() {
        let board = Board::default();
        let pawn = ChessMove::from_str("e2e4").unwrap();
        assert_eq!(next_halfmove_clock(&board, pawn, 31), 0);

        let knight = ChessMove::from_str("g1f3").unwrap();
        assert_eq!(next_halfmove_clock(&board, knight, 31), 32);
    }

    #[test]
    fn test_insufficient_material() {
        let bare = Board::from_str("8/8/8/4k3/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(insufficient_material(&bare));

        let knight = Board::from_str("8/8/8/4k3/8/5N2/8/4K3 w - - 0 1").unwrap();
        assert!(insufficient_material(&knight));

        let rook = Board::from_str("8/8/8/4k3/8/5R2/8/4K3 w - - 0 1").unwrap();
        assert!(!insufficient_material(&rook));

        // Bishops on the same shade (c6 and d3 are both light) cannot mate.
        let same = Board::from_str("8/8/2b5/4k3/8/3B4/8/4K3 w - - 0 1").unwrap();
        assert!(insufficient_material(&same));

        // Opposite shades (c6 light, e3 dark) can.
        let opposite = Board::from_str("8/8/2b5/4k3/8/4B3/8/4K3 w - - 0 1").unwrap();
        assert!(!insufficient_material(&opposite));
    }
}
