//! Pairing production, score/strike bookkeeping, SPRT and Elo state for
//! one tournament run.
//!
//! The tournament owns the roster, the RNG, the opening-suite cursor and
//! all mutable aggregate state; games only ever see immutable snapshots
//! handed out in a [`GameSpec`]. Results are fed back one at a time, so
//! state mutation is single-writer.

pub mod elo;
pub mod schedule;
pub mod sprt;

use std::collections::{HashMap, HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::adjudicator::Adjudicator;
use crate::clock::TimeControl;
use crate::config::EngineConfig;
use crate::game::{GameSpec, Outcome, PlayedGame, Termination};
use crate::openings::{Opening, OpeningSuite};
use crate::persistence::ProgressEntry;

use self::elo::EloTracker;
use self::schedule::{
    Encounter, EncounterTally, NextEncounter, Schedule, ScheduleKind,
};
use self::sprt::{GamePoint, Sprt, SprtParams, SprtStatus};

/// Scale for cumulative scores: integer arithmetic, win = 2, draw = 1.
pub const WIN_POINTS: i64 = 2;
pub const DRAW_POINTS: i64 = 1;

/// Tournament-wide policy, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct TournamentSettings {
    pub kind: ScheduleKind,
    pub games_per_encounter: u32,
    pub round_multiplier: u32,
    pub swap_sides: bool,
    pub opening_repetitions: u32,
    /// Strike cap; 0 disables elimination.
    pub strikes: u32,
    pub seeds: u32,
    pub berger_schedule: bool,
    pub recovery_mode: bool,
    pub variant: String,
    pub event_name: String,
    pub site: String,
    pub event_date: String,
    pub kfactor: f64,
    pub rating_interval: u32,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            kind: ScheduleKind::RoundRobin,
            games_per_encounter: 1,
            round_multiplier: 1,
            swap_sides: true,
            opening_repetitions: 1,
            strikes: 0,
            seeds: 0,
            berger_schedule: false,
            recovery_mode: false,
            variant: "standard".to_string(),
            event_name: "?".to_string(),
            site: "?".to_string(),
            event_date: String::new(),
            kfactor: 32.0,
            rating_interval: 0,
        }
    }
}

/// What the scheduler should do with the next pairing.
pub enum NextGame {
    /// Dispatch this game to the game manager.
    Ready(GameSpec),
    /// A participant is eliminated: record a synthetic skipped result,
    /// spawn nothing.
    Skip(GameSpec),
    /// The schedule needs results before it can pair further.
    Waiting,
    /// No pairings remain (or a stopping rule fired).
    Finished,
}

/// The verdict on a recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Recorded,
    /// Crash before the first move with recovery on: play the pairing
    /// again (once).
    Requeue,
}

/// One engine's line in the standings table.
#[derive(Debug, Clone)]
pub struct Standing {
    pub name: String,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub score: i64,
    pub elo: f64,
    pub strikes: u32,
    pub eliminated: bool,
}

struct EncounterState {
    encounter: Encounter,
    games_total: u32,
    games_done: u32,
    tally: EncounterTally,
}

#[derive(Debug, Clone, Copy)]
struct GameMeta {
    encounter_index: usize,
    white_idx: usize,
    black_idx: usize,
}

struct PendingGame {
    spec: GameSpec,
    white_idx: usize,
    black_idx: usize,
}

pub struct Tournament {
    settings: TournamentSettings,
    roster: Vec<EngineConfig>,
    tcs: Vec<TimeControl>,
    adjudicator: Adjudicator,
    schedule: Schedule,
    rng: StdRng,
    srand: u64,
    suite: Option<OpeningSuite>,
    current_opening: Opening,
    opening_uses_left: u32,
    scores: Vec<i64>,
    wins: Vec<u32>,
    draws: Vec<u32>,
    losses: Vec<u32>,
    strikes: HashMap<String, u32>,
    eliminated: Vec<bool>,
    sprt: Option<Sprt>,
    sprt_decision: Option<SprtStatus>,
    elo: EloTracker,
    pending: VecDeque<PendingGame>,
    metas: HashMap<usize, GameMeta>,
    encounters: Vec<EncounterState>,
    produced_games: usize,
    completed_games: usize,
    progress: Vec<ProgressEntry>,
    requeued: HashSet<usize>,
}

impl Tournament {
    /// Builds a tournament over `roster` with per-engine time controls.
    ///
    /// `srand` seeds the RNG for the lifetime of the run; the same seed
    /// replays the same schedule and opening draw.
    pub fn new(
        roster: Vec<EngineConfig>,
        tcs: Vec<TimeControl>,
        settings: TournamentSettings,
        adjudicator: Adjudicator,
        srand: u64,
    ) -> Self {
        let k = roster.len();
        let mut rng = StdRng::seed_from_u64(srand);
        let schedule = Schedule::new(
            settings.kind,
            k,
            settings.round_multiplier,
            settings.berger_schedule,
            settings.seeds,
            &mut rng,
        );
        // The strike map carries every roster name from the start.
        let strikes = roster.iter().map(|e| (e.name.clone(), 0)).collect();
        let initial_elo = roster
            .iter()
            .map(|e| f64::from(e.rating.unwrap_or(0)))
            .collect();
        let kfactor = settings.kfactor;
        Self {
            settings,
            schedule,
            rng,
            srand,
            suite: None,
            current_opening: Opening::startpos(),
            opening_uses_left: 0,
            scores: vec![0; k],
            wins: vec![0; k],
            draws: vec![0; k],
            losses: vec![0; k],
            strikes,
            eliminated: vec![false; k],
            sprt: None,
            sprt_decision: None,
            elo: EloTracker::new(initial_elo, kfactor),
            pending: VecDeque::new(),
            metas: HashMap::new(),
            encounters: Vec::new(),
            produced_games: 0,
            completed_games: 0,
            progress: Vec::new(),
            requeued: HashSet::new(),
            roster,
            tcs,
            adjudicator,
        }
    }

    pub fn settings(&self) -> &TournamentSettings {
        &self.settings
    }

    pub fn roster(&self) -> &[EngineConfig] {
        &self.roster
    }

    pub fn srand(&self) -> u64 {
        self.srand
    }

    pub fn progress(&self) -> &[ProgressEntry] {
        &self.progress
    }

    pub fn strikes(&self) -> &HashMap<String, u32> {
        &self.strikes
    }

    pub fn completed_games(&self) -> usize {
        self.completed_games
    }

    pub fn set_opening_suite(&mut self, suite: OpeningSuite) {
        self.suite = Some(suite);
    }

    pub fn set_sprt(&mut self, params: SprtParams) {
        self.sprt = Some(Sprt::new(params));
    }

    pub fn sprt(&self) -> Option<&Sprt> {
        self.sprt.as_ref()
    }

    pub fn sprt_decision(&self) -> Option<SprtStatus> {
        self.sprt_decision
    }

    /// Whether every pairing so far (completed or skipped) is settled.
    pub fn all_recorded(&self) -> bool {
        self.progress.iter().all(|e| e.is_terminal())
    }

    /// Standings sorted by score, then name.
    pub fn standings(&self) -> Vec<Standing> {
        let mut rows: Vec<Standing> = (0..self.roster.len())
            .map(|i| {
                let name = self.roster[i].name.clone();
                Standing {
                    strikes: self.strikes.get(&name).copied().unwrap_or(0),
                    eliminated: self.eliminated[i],
                    wins: self.wins[i],
                    draws: self.draws[i],
                    losses: self.losses[i],
                    score: self.scores[i],
                    elo: self.elo.rating(i),
                    name,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        rows
    }

    /// The next opening per the distribution policy: `p` consecutive
    /// pairings share a line before the cursor advances.
    fn next_opening(&mut self) -> Opening {
        if self.opening_uses_left == 0 {
            self.current_opening = match &mut self.suite {
                Some(suite) => suite.next(&mut self.rng),
                None => Opening::startpos(),
            };
            self.opening_uses_left = self.settings.opening_repetitions.max(1);
        }
        self.opening_uses_left -= 1;
        self.current_opening.clone()
    }

    /// Produces the next scheduled game, expanding encounters lazily.
    pub fn next_game(&mut self) -> NextGame {
        loop {
            // An SPRT decision ends production immediately; Swiss alone
            // finishes the round already in flight.
            if self.sprt_decision.is_some() && self.settings.kind != ScheduleKind::Swiss {
                return NextGame::Finished;
            }
            if let Some(pending) = self.pending.pop_front() {
                if self.eliminated[pending.white_idx] || self.eliminated[pending.black_idx] {
                    return NextGame::Skip(pending.spec);
                }
                return NextGame::Ready(pending.spec);
            }
            match self
                .schedule
                .next(&self.scores, &self.eliminated, &mut self.rng)
            {
                NextEncounter::Ready(encounter) => self.expand(encounter),
                NextEncounter::WaitingForResults => return NextGame::Waiting,
                NextEncounter::Done => return NextGame::Finished,
            }
        }
    }

    /// Expands one encounter into its games, assigning colors and
    /// openings in production order.
    fn expand(&mut self, encounter: Encounter) {
        let encounter_index = self.encounters.len();
        let games = self.settings.games_per_encounter.max(1);
        self.encounters.push(EncounterState {
            encounter,
            games_total: games,
            games_done: 0,
            tally: EncounterTally::default(),
        });

        for game in 0..games {
            let first_has_white = !(self.settings.swap_sides && game % 2 == 1);
            let (white_idx, black_idx) = if first_has_white {
                (encounter.first, encounter.second)
            } else {
                (encounter.second, encounter.first)
            };
            let opening = self.next_opening();
            let game_number = self.produced_games;
            self.produced_games += 1;

            self.progress.push(ProgressEntry {
                white: self.roster[white_idx].name.clone(),
                black: self.roster[black_idx].name.clone(),
                result: "*".to_string(),
                termination_details: String::new(),
            });
            self.metas.insert(
                game_number,
                GameMeta {
                    encounter_index,
                    white_idx,
                    black_idx,
                },
            );
            self.pending.push_back(PendingGame {
                spec: GameSpec {
                    game_number,
                    round: encounter.round,
                    white: self.roster[white_idx].clone(),
                    black: self.roster[black_idx].clone(),
                    white_tc: self.tcs[white_idx].clone(),
                    black_tc: self.tcs[black_idx].clone(),
                    opening,
                    adjudicator: self.adjudicator.clone(),
                },
                white_idx,
                black_idx,
            });
        }
    }

    /// Records a live result.
    pub fn record_result(&mut self, played: &PlayedGame) -> RecordAction {
        self.record(played, true)
    }

    /// Replays a persisted result during resume. Strikes, scores, SPRT
    /// and schedule state are all recomputed from scratch; nothing is
    /// ever requeued.
    pub fn add_resume_result(&mut self, game_number: usize, entry: &ProgressEntry) {
        let outcome: Outcome = entry.result.parse().unwrap_or(Outcome::Unterminated);
        let termination = if entry.termination_details.is_empty() {
            Termination::Unterminated
        } else {
            Termination::from_detail(&entry.termination_details)
        };
        let played = PlayedGame {
            game_number,
            round: 0,
            white_name: entry.white.clone(),
            black_name: entry.black.clone(),
            outcome,
            termination,
            moves: Vec::new(),
            opening: Opening::startpos(),
            final_fen: String::new(),
            time_used_ms: [0, 0],
            launch_failure: false,
        };
        self.record(&played, false);
    }

    fn record(&mut self, played: &PlayedGame, allow_requeue: bool) -> RecordAction {
        let game_number = played.game_number;
        let Some(meta) = self.metas.get(&game_number).copied() else {
            tracing::warn!(game = game_number, "result for unknown game, ignoring");
            return RecordAction::Recorded;
        };

        let skipped = played.termination == Termination::Skipped;
        if !skipped && !played.outcome.is_terminal() {
            // Interrupted game: the progress entry stays open.
            return RecordAction::Recorded;
        }

        // Crash before the first move, recovery on: one retry.
        if allow_requeue
            && self.settings.recovery_mode
            && matches!(
                played.termination,
                Termination::Crash | Termination::Disconnect
            )
            && played.moves.is_empty()
            && !self.requeued.contains(&game_number)
        {
            self.requeued.insert(game_number);
            tracing::info!(game = game_number, "requeueing crashed pairing");
            return RecordAction::Requeue;
        }

        self.progress[game_number] = ProgressEntry {
            white: self.roster[meta.white_idx].name.clone(),
            black: self.roster[meta.black_idx].name.clone(),
            result: if skipped {
                "*".to_string()
            } else {
                played.outcome.as_str().to_string()
            },
            termination_details: played.termination.detail().to_string(),
        };

        if !skipped {
            self.apply_score(&meta, played);
            self.apply_strikes(&meta, played);
            self.apply_sprt(&meta, played);
        }
        self.apply_encounter(&meta, played, skipped);
        self.completed_games += 1;
        RecordAction::Recorded
    }

    fn apply_score(&mut self, meta: &GameMeta, played: &PlayedGame) {
        match played.outcome {
            Outcome::WhiteWins => {
                self.scores[meta.white_idx] += WIN_POINTS;
                self.wins[meta.white_idx] += 1;
                self.losses[meta.black_idx] += 1;
                self.elo.record(meta.white_idx, meta.black_idx, 1.0);
            }
            Outcome::BlackWins => {
                self.scores[meta.black_idx] += WIN_POINTS;
                self.wins[meta.black_idx] += 1;
                self.losses[meta.white_idx] += 1;
                self.elo.record(meta.white_idx, meta.black_idx, 0.0);
            }
            Outcome::Draw => {
                self.scores[meta.white_idx] += DRAW_POINTS;
                self.scores[meta.black_idx] += DRAW_POINTS;
                self.draws[meta.white_idx] += 1;
                self.draws[meta.black_idx] += 1;
                self.elo.record(meta.white_idx, meta.black_idx, 0.5);
            }
            Outcome::Unterminated => {}
        }
    }

    fn apply_strikes(&mut self, meta: &GameMeta, played: &PlayedGame) {
        if !played.termination.earns_strike() {
            return;
        }
        let Some(winner) = played.outcome.winner() else {
            return;
        };
        let loser_idx = if winner == chess::Color::White {
            meta.black_idx
        } else {
            meta.white_idx
        };
        let name = self.roster[loser_idx].name.clone();
        let strikes = self.strikes.entry(name.clone()).or_insert(0);
        *strikes += 1;
        let strikes = *strikes;
        tracing::info!(engine = %name, strikes, "strike recorded");
        if self.settings.strikes > 0
            && strikes >= self.settings.strikes
            && !self.eliminated[loser_idx]
        {
            self.eliminated[loser_idx] = true;
            tracing::warn!(engine = %name, "eliminated after {} strikes", strikes);
        }
    }

    fn apply_sprt(&mut self, meta: &GameMeta, played: &PlayedGame) {
        let Some(sprt) = self.sprt.as_mut() else {
            return;
        };
        // SPRT tracks the head-to-head of the first two roster entries,
        // from the first entry's point of view.
        let pair = (
            meta.white_idx.min(meta.black_idx),
            meta.white_idx.max(meta.black_idx),
        );
        if pair != (0, 1) {
            return;
        }
        let point = match (played.outcome.winner(), meta.white_idx) {
            (None, _) => GamePoint::Draw,
            (Some(chess::Color::White), 0) | (Some(chess::Color::Black), 1) => GamePoint::Win,
            _ => GamePoint::Loss,
        };
        sprt.add(point);
        let status = sprt.status();
        if status != SprtStatus::Continue && self.sprt_decision.is_none() {
            self.sprt_decision = Some(status);
            // Swiss finishes the round in flight instead of cutting it.
            self.schedule.stop_new_rounds();
            tracing::info!(?status, llr = sprt.llr(), "SPRT decision reached");
        }
    }

    fn apply_encounter(&mut self, meta: &GameMeta, played: &PlayedGame, skipped: bool) {
        let state = &mut self.encounters[meta.encounter_index];
        state.games_done += 1;

        let first_is_white = state.encounter.first == meta.white_idx;
        if skipped {
            // Skipped games score nothing, but bracket advancement still
            // needs a winner: the surviving side takes the points.
            let first_idx = if first_is_white {
                meta.white_idx
            } else {
                meta.black_idx
            };
            let second_idx = if first_is_white {
                meta.black_idx
            } else {
                meta.white_idx
            };
            if self.eliminated[second_idx] && !self.eliminated[first_idx] {
                state.tally.points[0] += WIN_POINTS;
            } else if self.eliminated[first_idx] && !self.eliminated[second_idx] {
                state.tally.points[1] += WIN_POINTS;
            }
        } else {
            match played.outcome {
                Outcome::WhiteWins => {
                    let slot = if first_is_white { 0 } else { 1 };
                    state.tally.points[slot] += WIN_POINTS;
                }
                Outcome::BlackWins => {
                    let slot = if first_is_white { 1 } else { 0 };
                    state.tally.points[slot] += WIN_POINTS;
                    state.tally.black_wins[slot] += 1;
                }
                Outcome::Draw => {
                    state.tally.points[0] += DRAW_POINTS;
                    state.tally.points[1] += DRAW_POINTS;
                }
                Outcome::Unterminated => {}
            }
        }

        if state.games_done == state.games_total {
            let encounter = state.encounter;
            let tally = state.tally;
            self.schedule.record(&encounter, &tally, &mut self.rng);
        }
    }
}
