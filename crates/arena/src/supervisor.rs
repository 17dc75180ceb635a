//! Top-level control: one tournament, one game manager, the interrupt
//! path and the process exit status.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::AppSetup;
use crate::game::{self, GameContext, GameSpec, PlayedGame, Termination};
use crate::manager::{Completed, GameManager};
use crate::output::{EpdOutput, LiveOutput, OutputMeta, PgnOutput};
use crate::persistence::TournamentFile;
use crate::tournament::sprt::SprtStatus;
use crate::tournament::{elo, NextGame, RecordAction, Tournament};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Clean finish, including an SPRT decision or a graceful interrupt.
    Clean,
    /// Configuration or startup failure; nothing was spawned.
    ConfigFailure,
    /// Unrecoverable runtime failure.
    RuntimeFailure,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::ConfigFailure => 1,
            ExitStatus::RuntimeFailure => 2,
        }
    }
}

/// Owns the tournament and its game manager for one run.
pub struct Supervisor {
    tournament: Tournament,
    manager: GameManager,
    concurrency: usize,
    pgn_out: Option<PgnOutput>,
    epd_out: Option<EpdOutput>,
    live_out: Option<LiveOutput>,
    meta: OutputMeta,
    tournament_file: Option<PathBuf>,
    file_doc: TournamentFile,
    resume_entries: Vec<crate::persistence::ProgressEntry>,
    rating_interval: u32,
    interrupted: Arc<AtomicBool>,
    in_flight: HashMap<usize, GameSpec>,
    production_done: bool,
    snapshot_failed: bool,
}

impl Supervisor {
    pub fn new(setup: AppSetup) -> Self {
        let manager = GameManager::new(
            setup.concurrency,
            setup.start_delay,
            setup.timeouts.clone(),
            None,
        );
        Self {
            tournament: setup.tournament,
            manager,
            concurrency: setup.concurrency,
            pgn_out: setup.pgn_out,
            epd_out: setup.epd_out,
            live_out: setup.live_out,
            meta: setup.meta,
            tournament_file: setup.tournament_file,
            file_doc: setup.file_doc,
            resume_entries: setup.resume_entries,
            rating_interval: setup.rating_interval,
            interrupted: Arc::new(AtomicBool::new(false)),
            in_flight: HashMap::new(),
            production_done: false,
            snapshot_failed: false,
        }
    }

    /// Wires the terminal interrupt to the graceful-drain path: running
    /// games see the stop flag, surrender within the grace window, and a
    /// final snapshot is written before exit.
    pub fn install_interrupt_handler(&self) {
        let interrupted = Arc::clone(&self.interrupted);
        let stop = self.manager.stop_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, stopping tournament...");
            interrupted.store(true, Ordering::Relaxed);
            stop.store(true, Ordering::Relaxed);
        }) {
            tracing::warn!("could not install interrupt handler: {}", e);
        }
    }

    /// Runs the tournament to its terminal status.
    pub fn run(&mut self) -> ExitStatus {
        self.replay_resume();
        // Snapshot immediately so the tournament file exists (and carries
        // the seed) before any engine is spawned.
        if self.snapshot().is_err() {
            return ExitStatus::RuntimeFailure;
        }

        let status = self.event_loop();

        if self.interrupted.load(Ordering::Relaxed) {
            self.manager.stop();
        } else {
            self.manager.drain();
        }
        if self.snapshot().is_err() {
            return ExitStatus::RuntimeFailure;
        }
        self.print_standings();
        self.print_sprt();
        status
    }

    /// Replays persisted results so the schedule, scores, strikes and
    /// opening cursor all arrive at the recorded position.
    fn replay_resume(&mut self) {
        let entries = std::mem::take(&mut self.resume_entries);
        for entry in &entries {
            let spec = match self.tournament.next_game() {
                NextGame::Ready(spec) | NextGame::Skip(spec) => spec,
                NextGame::Waiting | NextGame::Finished => {
                    tracing::warn!("tournament file has more results than the schedule");
                    break;
                }
            };
            if spec.white.name != entry.white || spec.black.name != entry.black {
                tracing::warn!(
                    game = spec.game_number,
                    "resumed pairing {} vs {} does not match recorded {} vs {}",
                    spec.white.name,
                    spec.black.name,
                    entry.white,
                    entry.black
                );
            }
            self.tournament.add_resume_result(spec.game_number, entry);
        }
        if !entries.is_empty() {
            println!("Resumed tournament after {} recorded games", entries.len());
        }
    }

    fn event_loop(&mut self) -> ExitStatus {
        loop {
            if self.interrupted.load(Ordering::Relaxed) {
                return ExitStatus::Clean;
            }
            self.dispatch();
            if self.snapshot_failed {
                return ExitStatus::RuntimeFailure;
            }
            if self.production_done && self.in_flight.is_empty() {
                return ExitStatus::Clean;
            }

            let completed = match self
                .manager
                .results()
                .recv_timeout(Duration::from_millis(100))
            {
                Ok(completed) => completed,
                Err(_) => continue,
            };
            match self.handle_result(completed) {
                Ok(()) => {}
                Err(status) => return status,
            }
        }
    }

    /// Keeps the manager fed up to the concurrency budget. Skipped
    /// pairings are settled inline without consuming a slot.
    fn dispatch(&mut self) {
        while self.in_flight.len() < self.concurrency
            && !self.production_done
            && !self.interrupted.load(Ordering::Relaxed)
        {
            match self.tournament.next_game() {
                NextGame::Ready(spec) => {
                    let ticket = spec.game_number;
                    self.in_flight.insert(ticket, spec.clone());
                    self.submit(ticket, spec);
                }
                NextGame::Skip(spec) => {
                    let skipped = PlayedGame::skipped(
                        spec.game_number,
                        spec.round,
                        &spec.white.name,
                        &spec.black.name,
                    );
                    println!(
                        "Skipped game {} ({} vs {})",
                        spec.game_number + 1,
                        spec.white.name,
                        spec.black.name
                    );
                    self.tournament.record_result(&skipped);
                    if self.snapshot().is_err() {
                        self.snapshot_failed = true;
                        break;
                    }
                }
                NextGame::Waiting => break,
                NextGame::Finished => {
                    self.production_done = true;
                    break;
                }
            }
        }
    }

    fn submit(&mut self, ticket: usize, spec: GameSpec) {
        self.manager.submit(
            ticket,
            Box::new(move |slot| {
                let mut ctx = GameContext {
                    cache: slot.cache,
                    probe: slot.probe,
                    timeouts: slot.timeouts,
                    stop: slot.stop,
                };
                game::run_game(&spec, &mut ctx)
            }),
        );
    }

    fn handle_result(&mut self, completed: Completed) -> Result<(), ExitStatus> {
        let Completed { ticket, game } = completed;
        let spec = self.in_flight.remove(&ticket);

        if game.termination == Termination::Unterminated
            && self.interrupted.load(Ordering::Relaxed)
        {
            // Cut short by the interrupt; the progress entry stays open.
            return Ok(());
        }

        if game.launch_failure && !self.tournament.settings().recovery_mode {
            eprintln!(
                "Engine launch failed in game {} ({} vs {}); aborting",
                ticket + 1,
                game.white_name,
                game.black_name
            );
            self.tournament.record_result(&game);
            let _ = self.snapshot();
            return Err(ExitStatus::RuntimeFailure);
        }

        match self.tournament.record_result(&game) {
            RecordAction::Requeue => {
                if let Some(spec) = spec {
                    self.in_flight.insert(ticket, spec.clone());
                    self.submit(ticket, spec);
                }
                return Ok(());
            }
            RecordAction::Recorded => {}
        }

        println!(
            "Finished game {} ({} vs {}): {} {{{}}}",
            ticket + 1,
            game.white_name,
            game.black_name,
            game.outcome.as_str(),
            game.termination.detail()
        );

        self.write_artifacts(&game);
        if self.snapshot().is_err() {
            return Err(ExitStatus::RuntimeFailure);
        }

        let completed_games = self.tournament.completed_games();
        if self.rating_interval > 0 && completed_games % self.rating_interval as usize == 0 {
            self.print_standings();
        }
        Ok(())
    }

    fn write_artifacts(&self, game: &PlayedGame) {
        if game.termination == Termination::Skipped {
            return;
        }
        if let Some(pgn) = &self.pgn_out {
            if let Err(e) = pgn.append(game, &self.meta) {
                tracing::warn!("failed to write PGN: {}", e);
            }
        }
        if let Some(epd) = &self.epd_out {
            if let Err(e) = epd.append(game) {
                tracing::warn!("failed to write EPD: {}", e);
            }
        }
        if let Some(live) = &self.live_out {
            let standings = self.tournament.standings();
            if let Err(e) = live.write(
                game,
                &standings,
                self.tournament.completed_games(),
                &self.meta,
            ) {
                tracing::warn!("failed to write live output: {}", e);
            }
        }
    }

    /// Writes the tournament file, atomically, if one is configured.
    fn snapshot(&mut self) -> Result<(), ()> {
        let Some(path) = &self.tournament_file else {
            return Ok(());
        };
        self.file_doc.progress = self.tournament.progress().to_vec();
        self.file_doc.strikes = self
            .tournament
            .strikes()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        match self.file_doc.save(path) {
            Ok(()) => Ok(()),
            Err(e) => {
                eprintln!("Cannot write tournament file {}: {}", path.display(), e);
                Err(())
            }
        }
    }

    fn print_standings(&self) {
        let standings = self.tournament.standings();
        println!(
            "Rank {:<24} {:>5} {:>4} {:>4} {:>4} {:>8}  Elo",
            "Name", "Score", "W", "D", "L", "Strikes"
        );
        for (rank, row) in standings.iter().enumerate() {
            let (diff, low, high) =
                elo::performance(row.wins.into(), row.losses.into(), row.draws.into());
            let elo = if diff.is_finite() {
                format!("{:+.0} [{:+.0}, {:+.0}]", diff, low, high)
            } else if diff > 0.0 {
                "+INF".to_string()
            } else {
                "-INF".to_string()
            };
            println!(
                "{:>4} {:<24} {:>5} {:>4} {:>4} {:>4} {:>8}  {}{}",
                rank + 1,
                row.name,
                row.score,
                row.wins,
                row.draws,
                row.losses,
                row.strikes,
                elo,
                if row.eliminated { "  (eliminated)" } else { "" }
            );
        }
    }

    fn print_sprt(&self) {
        let Some(sprt) = self.tournament.sprt() else {
            return;
        };
        let (wins, draws, losses) = sprt.counts();
        let params = sprt.params();
        let line = match self.tournament.sprt_decision() {
            Some(SprtStatus::AcceptH1) => format!("H1 (elo >= {}) was accepted", params.elo1),
            Some(SprtStatus::AcceptH0) => format!("H0 (elo <= {}) was accepted", params.elo0),
            _ => "inconclusive".to_string(),
        };
        println!(
            "SPRT: llr {:.2}, w/d/l {}/{}/{}: {}",
            sprt.llr(),
            wins,
            draws,
            losses,
            line
        );
    }
}
