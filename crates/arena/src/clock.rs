//! Time controls and the per-side game clock.

use std::str::FromStr;
use std::time::Instant;

use chess::Color;
use engine_client::SearchLimits;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClockError {
    #[error("invalid time control: {0}")]
    InvalidSpec(String),
}

/// A time control for one side of a game.
///
/// One of three modes: infinite, fixed time per move, or classical
/// (`moves_per_tc` moves in `time_per_tc_ms`, with an optional increment).
/// Ply and node ceilings are advisory search bounds the game enforces by
/// passing them with each move request; they can also stand alone as the
/// only bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeControl {
    pub infinite: bool,
    /// Fixed search time per move, 0 when unset.
    pub time_per_move_ms: u64,
    /// Moves per control period, 0 meaning the whole game.
    pub moves_per_tc: u32,
    /// Time per control period, 0 when unset.
    pub time_per_tc_ms: u64,
    /// Increment granted after each completed move.
    pub increment_ms: u64,
    /// How far past zero a clock may fall before it counts as expired.
    pub expiry_margin_ms: u64,
    /// Advisory depth ceiling in plies.
    pub ply_limit: Option<u32>,
    /// Advisory node ceiling.
    pub node_limit: Option<u64>,
}

impl TimeControl {
    /// A time control must carry at least one bound.
    pub fn is_valid(&self) -> bool {
        self.infinite
            || self.time_per_move_ms > 0
            || self.time_per_tc_ms > 0
            || self.ply_limit.is_some()
            || self.node_limit.is_some()
    }

    pub fn is_classical(&self) -> bool {
        self.time_per_tc_ms > 0
    }

    pub fn is_per_move(&self) -> bool {
        !self.infinite && self.time_per_tc_ms == 0 && self.time_per_move_ms > 0
    }
}

impl FromStr for TimeControl {
    type Err = ClockError;

    /// Parses `inf`, `<moves>/<time>[+<inc>]` or `<time>[+<inc>]`, where
    /// `<time>` is seconds (fractions allowed) or `M:SS`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        if spec == "inf" {
            return Ok(TimeControl {
                infinite: true,
                ..Default::default()
            });
        }

        let mut tc = TimeControl::default();
        let (main, inc) = match spec.split_once('+') {
            Some((main, inc)) => (main, Some(inc)),
            None => (spec, None),
        };

        let time = match main.split_once('/') {
            Some((moves, time)) => {
                tc.moves_per_tc = moves
                    .parse()
                    .map_err(|_| ClockError::InvalidSpec(spec.to_string()))?;
                time
            }
            None => main,
        };
        tc.time_per_tc_ms = parse_time_ms(time).ok_or_else(|| {
            ClockError::InvalidSpec(spec.to_string())
        })?;
        if let Some(inc) = inc {
            tc.increment_ms =
                parse_time_ms(inc).ok_or_else(|| ClockError::InvalidSpec(spec.to_string()))?;
        }

        if tc.time_per_tc_ms == 0 {
            return Err(ClockError::InvalidSpec(spec.to_string()));
        }
        Ok(tc)
    }
}

/// Parses a time value in seconds (fractional) or `M:SS` into milliseconds.
fn parse_time_ms(s: &str) -> Option<u64> {
    if let Some((minutes, seconds)) = s.split_once(':') {
        let minutes: u64 = minutes.parse().ok()?;
        if seconds.len() != 2 {
            return None;
        }
        let seconds: u64 = seconds.parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        return Some((minutes * 60 + seconds) * 1000);
    }
    let seconds: f64 = s.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * 1000.0).round() as u64)
}

/// Monotonic two-sided game clock.
///
/// The clock always reflects the side that last moved: `start` opens a
/// measurement for the side to move, `stop` closes it and charges the
/// elapsed time. Increments are granted only after a completed move, and
/// classical controls refill when a side finishes its period.
#[derive(Debug)]
pub struct GameClock {
    tc: [TimeControl; 2],
    remaining_ms: [i64; 2],
    moves_played: [u32; 2],
    active: Option<(Color, Instant)>,
}

fn idx(side: Color) -> usize {
    side.to_index()
}

impl GameClock {
    pub fn new(white: TimeControl, black: TimeControl) -> Self {
        let initial = |tc: &TimeControl| {
            if tc.is_classical() {
                tc.time_per_tc_ms as i64
            } else {
                tc.time_per_move_ms as i64
            }
        };
        let remaining_ms = [initial(&white), initial(&black)];
        Self {
            tc: [white, black],
            remaining_ms,
            moves_played: [0, 0],
            active: None,
        }
    }

    pub fn time_control(&self, side: Color) -> &TimeControl {
        &self.tc[idx(side)]
    }

    /// Starts measuring for `side`. Per-move mode resets the side's budget.
    pub fn start(&mut self, side: Color) {
        if self.tc[idx(side)].is_per_move() {
            self.remaining_ms[idx(side)] = self.tc[idx(side)].time_per_move_ms as i64;
        }
        self.active = Some((side, Instant::now()));
    }

    /// Stops the running measurement, charging the elapsed time.
    ///
    /// Returns the elapsed milliseconds, or 0 if no measurement was open.
    pub fn stop(&mut self) -> u64 {
        let Some((side, since)) = self.active.take() else {
            return 0;
        };
        let elapsed = since.elapsed().as_millis() as u64;
        self.remaining_ms[idx(side)] -= elapsed as i64;
        elapsed
    }

    /// Charges `ms` against `side` without a running measurement.
    pub fn deduct(&mut self, side: Color, ms: u64) {
        self.remaining_ms[idx(side)] -= ms as i64;
    }

    /// Grants the post-move increment, classical mode only.
    pub fn grant_increment(&mut self, side: Color) {
        let tc = &self.tc[idx(side)];
        if tc.is_classical() && tc.increment_ms > 0 {
            self.remaining_ms[idx(side)] += tc.increment_ms as i64;
        }
    }

    /// Records a completed move, refilling at each control boundary.
    pub fn register_move(&mut self, side: Color) {
        self.moves_played[idx(side)] += 1;
        let tc = &self.tc[idx(side)];
        if tc.is_classical()
            && tc.moves_per_tc > 0
            && self.moves_played[idx(side)] % tc.moves_per_tc == 0
        {
            self.remaining_ms[idx(side)] += tc.time_per_tc_ms as i64;
        }
    }

    pub fn remaining(&self, side: Color) -> i64 {
        self.remaining_ms[idx(side)]
    }

    pub fn moves_played(&self, side: Color) -> u32 {
        self.moves_played[idx(side)]
    }

    /// True once the side has fallen further below zero than its margin.
    pub fn expired(&self, side: Color) -> bool {
        let tc = &self.tc[idx(side)];
        if tc.infinite || (tc.time_per_move_ms == 0 && tc.time_per_tc_ms == 0) {
            return false;
        }
        self.remaining_ms[idx(side)] < -(tc.expiry_margin_ms as i64)
    }

    /// Builds the search bounds for the side to move.
    pub fn search_limits(&self, side_to_move: Color) -> SearchLimits {
        let tc = &self.tc[idx(side_to_move)];
        let mut limits = SearchLimits {
            depth: tc.ply_limit,
            nodes: tc.node_limit,
            ..Default::default()
        };
        if tc.infinite {
            limits.infinite = true;
            return limits;
        }
        if tc.is_per_move() {
            limits.movetime = Some(tc.time_per_move_ms);
            return limits;
        }
        if tc.is_classical() {
            limits.wtime = Some(self.remaining_ms[idx(Color::White)].max(0) as u64);
            limits.btime = Some(self.remaining_ms[idx(Color::Black)].max(0) as u64);
            if self.tc[idx(Color::White)].increment_ms > 0 {
                limits.winc = Some(self.tc[idx(Color::White)].increment_ms);
            }
            if self.tc[idx(Color::Black)].increment_ms > 0 {
                limits.binc = Some(self.tc[idx(Color::Black)].increment_ms);
            }
            if tc.moves_per_tc > 0 {
                let played = self.moves_played[idx(side_to_move)] % tc.moves_per_tc;
                limits.movestogo = Some(tc.moves_per_tc - played);
            }
        }
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_infinite() {
        let tc: TimeControl = "inf".parse().unwrap();
        assert!(tc.infinite);
        assert!(tc.is_valid());
    }

    #[test]
    fn test_parse_classical_with_moves_and_increment() {
        let tc: TimeControl = "40/60+0.6".parse().unwrap();
        assert_eq!(tc.moves_per_tc, 40);
        assert_eq!(tc.time_per_tc_ms, 60_000);
        assert_eq!(tc.increment_ms, 600);
        assert!(tc.is_classical());
        assert!(tc.is_valid());
    }

    #[test]
    fn test_parse_sudden_death() {
        let tc: TimeControl = "300".parse().unwrap();
        assert_eq!(tc.moves_per_tc, 0);
        assert_eq!(tc.time_per_tc_ms, 300_000);
        assert_eq!(tc.increment_ms, 0);
    }

    #[test]
    fn test_parse_minute_second_form() {
        let tc: TimeControl = "1:30+1".parse().unwrap();
        assert_eq!(tc.time_per_tc_ms, 90_000);
        assert_eq!(tc.increment_ms, 1_000);

        assert!("1:75".parse::<TimeControl>().is_err());
        assert!("1:3".parse::<TimeControl>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<TimeControl>().is_err());
        assert!("x/60".parse::<TimeControl>().is_err());
        assert!("40/".parse::<TimeControl>().is_err());
        assert!("0".parse::<TimeControl>().is_err());
        assert!("-5".parse::<TimeControl>().is_err());
    }

    #[test]
    fn test_validity_requires_a_bound() {
        assert!(!TimeControl::default().is_valid());

        let depth_only = TimeControl {
            ply_limit: Some(8),
            ..Default::default()
        };
        assert!(depth_only.is_valid());

        let nodes_only = TimeControl {
            node_limit: Some(50_000),
            ..Default::default()
        };
        assert!(nodes_only.is_valid());
    }

    fn classical(base_ms: u64, inc_ms: u64) -> TimeControl {
        TimeControl {
            time_per_tc_ms: base_ms,
            increment_ms: inc_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_deduct_and_increment() {
        let mut clock = GameClock::new(classical(60_000, 500), classical(60_000, 500));
        clock.deduct(Color::White, 1_200);
        assert_eq!(clock.remaining(Color::White), 58_800);

        clock.grant_increment(Color::White);
        assert_eq!(clock.remaining(Color::White), 59_300);
        assert_eq!(clock.remaining(Color::Black), 60_000);
    }

    #[test]
    fn test_per_move_resets_on_start() {
        let tc = TimeControl {
            time_per_move_ms: 1_000,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        clock.deduct(Color::White, 900);
        assert_eq!(clock.remaining(Color::White), 100);

        clock.start(Color::White);
        assert_eq!(clock.remaining(Color::White), 1_000);
        clock.stop();
    }

    #[test]
    fn test_per_move_gets_no_increment() {
        let tc = TimeControl {
            time_per_move_ms: 1_000,
            increment_ms: 500,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        clock.grant_increment(Color::White);
        assert_eq!(clock.remaining(Color::White), 1_000);
    }

    #[test]
    fn test_expiry_margin() {
        let tc = TimeControl {
            time_per_tc_ms: 1_000,
            expiry_margin_ms: 200,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        clock.deduct(Color::Black, 1_150);
        assert!(!clock.expired(Color::Black));

        clock.deduct(Color::Black, 100);
        assert!(clock.expired(Color::Black));
        assert!(!clock.expired(Color::White));
    }

    #[test]
    fn test_infinite_never_expires() {
        let tc = TimeControl {
            infinite: true,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        clock.deduct(Color::White, 10_000_000);
        assert!(!clock.expired(Color::White));
    }

    #[test]
    fn test_classical_refill_at_control_boundary() {
        let tc = TimeControl {
            moves_per_tc: 2,
            time_per_tc_ms: 10_000,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        clock.deduct(Color::White, 4_000);
        clock.register_move(Color::White);
        assert_eq!(clock.remaining(Color::White), 6_000);

        clock.deduct(Color::White, 4_000);
        clock.register_move(Color::White);
        // Second move completes the period and refills.
        assert_eq!(clock.remaining(Color::White), 12_000);
    }

    #[test]
    fn test_search_limits_classical() {
        let mut clock = GameClock::new(classical(60_000, 600), classical(60_000, 600));
        clock.deduct(Color::White, 5_000);
        let limits = clock.search_limits(Color::White);
        assert_eq!(limits.wtime, Some(55_000));
        assert_eq!(limits.btime, Some(60_000));
        assert_eq!(limits.winc, Some(600));
        assert_eq!(limits.binc, Some(600));
        assert_eq!(limits.movestogo, None);
        assert_eq!(limits.movetime, None);
    }

    #[test]
    fn test_search_limits_moves_to_go() {
        let tc = TimeControl {
            moves_per_tc: 40,
            time_per_tc_ms: 60_000,
            ..Default::default()
        };
        let mut clock = GameClock::new(tc.clone(), tc);
        assert_eq!(clock.search_limits(Color::White).movestogo, Some(40));
        clock.register_move(Color::White);
        clock.register_move(Color::White);
        assert_eq!(clock.search_limits(Color::White).movestogo, Some(38));
    }

    #[test]
    fn test_search_limits_per_move_and_ceilings() {
        let tc = TimeControl {
            time_per_move_ms: 500,
            ply_limit: Some(10),
            node_limit: Some(20_000),
            ..Default::default()
        };
        let clock = GameClock::new(tc.clone(), tc);
        let limits = clock.search_limits(Color::Black);
        assert_eq!(limits.movetime, Some(500));
        assert_eq!(limits.depth, Some(10));
        assert_eq!(limits.nodes, Some(20_000));
        assert_eq!(limits.wtime, None);
    }

    #[test]
    fn test_clock_conservation() {
        // Consumed time equals the sum of per-move deltas.
        let mut clock = GameClock::new(classical(10_000, 100), classical(10_000, 100));
        let deltas = [300u64, 450, 120, 980];
        let mut charged = 0i64;
        for delta in deltas {
            clock.deduct(Color::White, delta);
            clock.register_move(Color::White);
            clock.grant_increment(Color::White);
            charged += delta as i64 - 100;
        }
        assert_eq!(clock.remaining(Color::White), 10_000 - charged);
    }
}
