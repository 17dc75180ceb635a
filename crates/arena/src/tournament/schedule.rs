//! Pairing producers for the tournament schedule kinds.
//!
//! A schedule yields *encounters*: an ordered pair of roster indices plus
//! a round number, where the first engine takes white in the first game of
//! the encounter. Round numbers are nondecreasing in production order.
//! Knockout and Swiss schedules cannot pair ahead of the results they
//! depend on and report `WaitingForResults` instead.

use std::collections::HashSet;
use std::str::FromStr;

use rand::Rng;

/// The supported tournament formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    RoundRobin,
    Gauntlet,
    Knockout,
    Pyramid,
    Swiss,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::RoundRobin => "round-robin",
            ScheduleKind::Gauntlet => "gauntlet",
            ScheduleKind::Knockout => "knockout",
            ScheduleKind::Pyramid => "pyramid",
            ScheduleKind::Swiss => "swiss-tcec",
        }
    }

    /// Whether the format supports a user-defined round multiplier.
    pub fn can_set_round_multiplier(&self) -> bool {
        !matches!(self, ScheduleKind::Knockout)
    }
}

impl FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(ScheduleKind::RoundRobin),
            "gauntlet" => Ok(ScheduleKind::Gauntlet),
            "knockout" => Ok(ScheduleKind::Knockout),
            "pyramid" => Ok(ScheduleKind::Pyramid),
            "swiss-tcec" | "swiss" => Ok(ScheduleKind::Swiss),
            other => Err(format!("invalid tournament type: {}", other)),
        }
    }
}

/// One scheduled meeting between two engines. `first` has white in the
/// encounter's first game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encounter {
    pub first: usize,
    pub second: usize,
    pub round: u32,
}

/// What the schedule has to offer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextEncounter {
    Ready(Encounter),
    WaitingForResults,
    Done,
}

/// Aggregated result of one finished encounter, in encounter orientation
/// (`[first, second]`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EncounterTally {
    /// Points on the 2/1/0 scale.
    pub points: [i64; 2],
    /// Wins achieved with the black pieces, the first knockout tiebreak.
    pub black_wins: [u32; 2],
}

/// A pairing producer with per-format state.
pub enum Schedule {
    Listed(Listed),
    Knockout(Knockout),
    Swiss(Swiss),
}

impl Schedule {
    /// Builds the producer for `kind` over a roster of `k` engines.
    pub fn new<R: Rng>(
        kind: ScheduleKind,
        k: usize,
        rounds: u32,
        berger: bool,
        seed_count: u32,
        rng: &mut R,
    ) -> Self {
        match kind {
            ScheduleKind::RoundRobin => Schedule::Listed(Listed::round_robin(k, rounds, berger)),
            ScheduleKind::Gauntlet => Schedule::Listed(Listed::gauntlet(k, rounds)),
            ScheduleKind::Pyramid => Schedule::Listed(Listed::pyramid(k, rounds)),
            ScheduleKind::Knockout => Schedule::Knockout(Knockout::new(k, seed_count, rng)),
            ScheduleKind::Swiss => Schedule::Swiss(Swiss::new(k, rounds)),
        }
    }

    pub fn next<R: Rng>(
        &mut self,
        scores: &[i64],
        eliminated: &[bool],
        rng: &mut R,
    ) -> NextEncounter {
        match self {
            Schedule::Listed(listed) => listed.next(),
            Schedule::Knockout(knockout) => knockout.next(),
            Schedule::Swiss(swiss) => swiss.next(scores, eliminated, rng),
        }
    }

    /// Feeds back the tally of a completed encounter.
    pub fn record<R: Rng>(&mut self, encounter: &Encounter, tally: &EncounterTally, rng: &mut R) {
        match self {
            Schedule::Listed(_) => {}
            Schedule::Knockout(knockout) => knockout.record(encounter, tally, rng),
            Schedule::Swiss(swiss) => swiss.record(),
        }
    }

    /// Stops opening new rounds (Swiss only); the current round still
    /// completes. Used when SPRT has already decided the match.
    pub fn stop_new_rounds(&mut self) {
        if let Schedule::Swiss(swiss) = self {
            swiss.stop_new_rounds = true;
        }
    }
}

/// A fully precomputed encounter list (round-robin, gauntlet, pyramid).
pub struct Listed {
    encounters: Vec<Encounter>,
    cursor: usize,
}

impl Listed {
    fn next(&mut self) -> NextEncounter {
        match self.encounters.get(self.cursor) {
            Some(enc) => {
                self.cursor += 1;
                NextEncounter::Ready(*enc)
            }
            None => NextEncounter::Done,
        }
    }

    /// Circle-schedule round robin over `rounds` cycles; colors flip on
    /// every other cycle. The Berger option orders each cycle by the
    /// polygon-residue tables instead of plain rotation.
    fn round_robin(k: usize, rounds: u32, berger: bool) -> Self {
        let cycle = if berger {
            berger_rounds(k)
        } else {
            circle_rounds(k)
        };
        let per_cycle = cycle.len() as u32;
        let mut encounters = Vec::new();
        for c in 0..rounds {
            for (round_index, pairs) in cycle.iter().enumerate() {
                for &(a, b) in pairs {
                    let (first, second) = if c % 2 == 0 { (a, b) } else { (b, a) };
                    encounters.push(Encounter {
                        first,
                        second,
                        round: c * per_cycle + round_index as u32 + 1,
                    });
                }
            }
        }
        Self {
            encounters,
            cursor: 0,
        }
    }

    /// The first-listed engine plays every other engine.
    fn gauntlet(k: usize, rounds: u32) -> Self {
        let mut encounters = Vec::new();
        for c in 0..rounds {
            for i in 1..k {
                encounters.push(Encounter {
                    first: 0,
                    second: i,
                    round: c + 1,
                });
            }
        }
        Self {
            encounters,
            cursor: 0,
        }
    }

    /// Engine `i` climbs the roster, playing everyone below it.
    fn pyramid(k: usize, rounds: u32) -> Self {
        let per_cycle = k.saturating_sub(1) as u32;
        let mut encounters = Vec::new();
        for c in 0..rounds {
            for i in 1..k {
                for j in 0..i {
                    encounters.push(Encounter {
                        first: j,
                        second: i,
                        round: c * per_cycle + i as u32,
                    });
                }
            }
        }
        Self {
            encounters,
            cursor: 0,
        }
    }
}

/// Plain circle method: fix seat 0, rotate the rest one step per round.
fn circle_rounds(k: usize) -> Vec<Vec<(usize, usize)>> {
    let n = if k % 2 == 0 { k } else { k + 1 };
    let bye = n - 1;
    let mut seats: Vec<usize> = (0..n).collect();
    let mut rounds = Vec::new();
    for r in 0..n - 1 {
        let mut pairs = Vec::new();
        for i in 0..n / 2 {
            let a = seats[i];
            let b = seats[n - 1 - i];
            if k % 2 == 1 && (a == bye || b == bye) {
                continue;
            }
            // Alternate the fixed seat's color so it doesn't hog white.
            if i == 0 && r % 2 == 1 {
                pairs.push((b, a));
            } else {
                pairs.push((a, b));
            }
        }
        rounds.push(pairs);
        // Rotate all seats except the first.
        let last = seats.pop().unwrap_or(0);
        seats.insert(1, last);
    }
    rounds
}

/// Berger tables via the polygon-residue construction: in round `r`,
/// players `a` and `b` (both below `m`) meet iff `a + b = r (mod m)`, and
/// the anchor plays whoever is left.
fn berger_rounds(k: usize) -> Vec<Vec<(usize, usize)>> {
    let n = if k % 2 == 0 { k } else { k + 1 };
    let m = n - 1;
    let anchor = m;
    let mut rounds = Vec::new();
    for r in 0..m {
        let mut pairs = Vec::new();
        let mut used = vec![false; m];
        // The player whose double is r (mod m) meets the anchor.
        let lone = (0..m).find(|&x| (2 * x) % m == r % m).unwrap_or(0);
        used[lone] = true;
        if anchor < k {
            if r % 2 == 0 {
                pairs.push((lone, anchor));
            } else {
                pairs.push((anchor, lone));
            }
        }
        for a in 0..m {
            if used[a] {
                continue;
            }
            let b = (r + m - a % m) % m;
            if b == a || used[b] {
                continue;
            }
            used[a] = true;
            used[b] = true;
            pairs.push((a.min(b), a.max(b)));
        }
        rounds.push(pairs);
    }
    rounds
}

/// Single-elimination bracket.
pub struct Knockout {
    matches: Vec<KnockoutMatch>,
    round: u32,
    produced: usize,
    outstanding: usize,
}

struct KnockoutMatch {
    a: usize,
    b: Option<usize>,
    winner: Option<usize>,
}

impl Knockout {
    fn new<R: Rng>(k: usize, seed_count: u32, rng: &mut R) -> Self {
        let slots = bracket_slots(k, seed_count, rng);
        let matches = slots
            .chunks(2)
            .map(|chunk| {
                let (a, b) = match (chunk[0], chunk.get(1).copied().flatten()) {
                    (Some(a), b) => (a, b),
                    (None, Some(b)) => (b, None),
                    (None, None) => (0, None),
                };
                KnockoutMatch { a, b, winner: None }
            })
            .collect();
        Self {
            matches,
            round: 1,
            produced: 0,
            outstanding: 0,
        }
    }

    fn next(&mut self) -> NextEncounter {
        loop {
            while self.produced < self.matches.len() {
                let index = self.produced;
                self.produced += 1;
                let entry = &mut self.matches[index];
                match entry.b {
                    None => {
                        // Bye: advance without a game.
                        entry.winner = Some(entry.a);
                    }
                    Some(b) => {
                        self.outstanding += 1;
                        return NextEncounter::Ready(Encounter {
                            first: entry.a,
                            second: b,
                            round: self.round,
                        });
                    }
                }
            }
            if self.outstanding > 0 {
                return NextEncounter::WaitingForResults;
            }
            let winners: Vec<usize> = self.matches.iter().filter_map(|m| m.winner).collect();
            if winners.len() <= 1 {
                return NextEncounter::Done;
            }
            self.matches = winners
                .chunks(2)
                .map(|chunk| KnockoutMatch {
                    a: chunk[0],
                    b: chunk.get(1).copied(),
                    winner: None,
                })
                .collect();
            self.round += 1;
            self.produced = 0;
        }
    }

    /// Resolves a bracket match from the mini-match tally. Ties fall to
    /// the black-wins tiebreak, then to a coin flip from the tournament
    /// RNG.
    fn record<R: Rng>(&mut self, encounter: &Encounter, tally: &EncounterTally, rng: &mut R) {
        let Some(entry) = self.matches.iter_mut().find(|m| {
            m.winner.is_none() && m.a == encounter.first && m.b == Some(encounter.second)
        }) else {
            return;
        };
        let winner = if tally.points[0] != tally.points[1] {
            if tally.points[0] > tally.points[1] {
                encounter.first
            } else {
                encounter.second
            }
        } else if tally.black_wins[0] != tally.black_wins[1] {
            if tally.black_wins[0] > tally.black_wins[1] {
                encounter.first
            } else {
                encounter.second
            }
        } else if rng.gen_bool(0.5) {
            encounter.first
        } else {
            encounter.second
        };
        entry.winner = Some(winner);
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

/// Standard bracket slot order for a field of `k`, padded to a power of
/// two with byes. With `seed_count > 0` only that many top seeds keep
/// their slots; everyone else is shuffled over the remaining slots.
fn bracket_slots<R: Rng>(k: usize, seed_count: u32, rng: &mut R) -> Vec<Option<usize>> {
    let mut size = 1;
    while size < k {
        size *= 2;
    }
    let mut order = vec![0usize];
    while order.len() < size {
        let doubled = order.len() * 2;
        let mut next = Vec::with_capacity(doubled);
        for &s in &order {
            next.push(s);
            next.push(doubled - 1 - s);
        }
        order = next;
    }

    let mut slots: Vec<Option<usize>> = order
        .iter()
        .map(|&seed| if seed < k { Some(seed) } else { None })
        .collect();

    let seed_count = seed_count as usize;
    if seed_count > 0 && seed_count < k {
        let mut floaters: Vec<usize> = Vec::new();
        let mut open_slots: Vec<usize> = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(engine) = slot {
                if *engine >= seed_count {
                    floaters.push(*engine);
                    open_slots.push(i);
                }
            }
        }
        // Fisher-Yates over the unseeded engines.
        for i in (1..floaters.len()).rev() {
            let j = rng.gen_range(0..=i);
            floaters.swap(i, j);
        }
        for (slot, engine) in open_slots.into_iter().zip(floaters) {
            slots[slot] = Some(engine);
        }
    }
    slots
}

/// Score-group pairing with repeat avoidance and color balancing.
pub struct Swiss {
    k: usize,
    rounds: u32,
    round: u32,
    played: HashSet<(usize, usize)>,
    color_diff: Vec<i32>,
    queue: std::collections::VecDeque<Encounter>,
    outstanding: usize,
    stop_new_rounds: bool,
}

impl Swiss {
    fn new(k: usize, rounds: u32) -> Self {
        Self {
            k,
            rounds,
            round: 0,
            played: HashSet::new(),
            color_diff: vec![0; k],
            queue: std::collections::VecDeque::new(),
            outstanding: 0,
            stop_new_rounds: false,
        }
    }

    fn next<R: Rng>(
        &mut self,
        scores: &[i64],
        eliminated: &[bool],
        _rng: &mut R,
    ) -> NextEncounter {
        if let Some(enc) = self.queue.pop_front() {
            self.outstanding += 1;
            return NextEncounter::Ready(enc);
        }
        if self.outstanding > 0 {
            return NextEncounter::WaitingForResults;
        }
        if self.round >= self.rounds || self.stop_new_rounds {
            return NextEncounter::Done;
        }
        self.round += 1;
        self.pair_round(scores, eliminated);
        if self.queue.is_empty() {
            return NextEncounter::Done;
        }
        let enc = match self.queue.pop_front() {
            Some(enc) => enc,
            None => return NextEncounter::Done,
        };
        self.outstanding += 1;
        NextEncounter::Ready(enc)
    }

    fn pair_round(&mut self, scores: &[i64], eliminated: &[bool]) {
        // Standings order: score first, then the seed from roster order.
        let mut standing: Vec<usize> = (0..self.k)
            .filter(|&i| !eliminated.get(i).copied().unwrap_or(false))
            .collect();
        standing.sort_by_key(|&i| (std::cmp::Reverse(scores.get(i).copied().unwrap_or(0)), i));

        let mut paired = vec![false; self.k];
        for pos in 0..standing.len() {
            let a = standing[pos];
            if paired[a] {
                continue;
            }
            // Prefer the highest-standing opponent not met before; fall
            // back to a repeat only when the round cannot be completed
            // otherwise.
            let opponent = standing[pos + 1..]
                .iter()
                .copied()
                .find(|&b| !paired[b] && !self.played.contains(&pair_key(a, b)))
                .or_else(|| standing[pos + 1..].iter().copied().find(|&b| !paired[b]));
            let Some(b) = opponent else {
                break;
            };
            paired[a] = true;
            paired[b] = true;
            self.played.insert(pair_key(a, b));

            // Balanced colors where possible.
            let (white, black) = if self.color_diff[b] < self.color_diff[a] {
                (b, a)
            } else {
                (a, b)
            };
            self.color_diff[white] += 1;
            self.color_diff[black] -= 1;
            self.queue.push_back(Encounter {
                first: white,
                second: black,
                round: self.round,
            });
        }
    }

    fn record(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn drain_listed(schedule: &mut Schedule) -> Vec<Encounter> {
        let mut rng = StdRng::seed_from_u64(0);
        let mut out = Vec::new();
        loop {
            match schedule.next(&[], &[], &mut rng) {
                NextEncounter::Ready(enc) => out.push(enc),
                NextEncounter::Done => break,
                NextEncounter::WaitingForResults => panic!("listed schedules never wait"),
            }
        }
        out
    }

    #[test]
    fn test_schedule_kind_round_trip() {
        for kind in [
            ScheduleKind::RoundRobin,
            ScheduleKind::Gauntlet,
            ScheduleKind::Knockout,
            ScheduleKind::Pyramid,
            ScheduleKind::Swiss,
        ] {
            assert_eq!(ScheduleKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(ScheduleKind::from_str("ladder").is_err());
        assert!(!ScheduleKind::Knockout.can_set_round_multiplier());
        assert!(ScheduleKind::RoundRobin.can_set_round_multiplier());
    }

    #[test]
    fn test_round_robin_every_pair_once_per_cycle() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::RoundRobin, 4, 1, false, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        assert_eq!(encounters.len(), 6);

        let mut pairs: Vec<(usize, usize)> = encounters
            .iter()
            .map(|e| pair_key(e.first, e.second))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        assert_eq!(pairs.len(), 6);

        // Rounds are nondecreasing in production order.
        for window in encounters.windows(2) {
            assert!(window[0].round <= window[1].round);
        }
    }

    #[test]
    fn test_round_robin_odd_field_gets_byes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::RoundRobin, 5, 1, false, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        // C(5,2) pairs, one bye per round.
        assert_eq!(encounters.len(), 10);
        for enc in &encounters {
            assert!(enc.first < 5 && enc.second < 5);
            assert_ne!(enc.first, enc.second);
        }
    }

    #[test]
    fn test_round_robin_multiplier_flips_colors() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::RoundRobin, 2, 2, false, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        assert_eq!(encounters.len(), 2);
        assert_eq!((encounters[0].first, encounters[0].second), (0, 1));
        assert_eq!((encounters[1].first, encounters[1].second), (1, 0));
        assert!(encounters[0].round < encounters[1].round);
    }

    #[test]
    fn test_berger_rounds_cover_all_pairs() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::RoundRobin, 6, 1, true, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        assert_eq!(encounters.len(), 15);
        let mut pairs: Vec<(usize, usize)> = encounters
            .iter()
            .map(|e| pair_key(e.first, e.second))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        assert_eq!(pairs.len(), 15);
    }

    #[test]
    fn test_gauntlet_first_engine_always_participates() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::Gauntlet, 3, 1, false, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        assert_eq!(
            encounters,
            vec![
                Encounter {
                    first: 0,
                    second: 1,
                    round: 1
                },
                Encounter {
                    first: 0,
                    second: 2,
                    round: 1
                },
            ]
        );
    }

    #[test]
    fn test_pyramid_climbs_the_roster() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut schedule = Schedule::new(ScheduleKind::Pyramid, 4, 1, false, 0, &mut rng);
        let encounters = drain_listed(&mut schedule);
        let pairs: Vec<(usize, usize)> =
            encounters.iter().map(|e| (e.first, e.second)).collect();
        assert_eq!(
            pairs,
            vec![(0, 1), (0, 2), (1, 2), (0, 3), (1, 3), (2, 3)]
        );
    }

    #[test]
    fn test_knockout_semis_then_final() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut schedule = Schedule::new(ScheduleKind::Knockout, 4, 0, false, 0, &mut rng);

        let semi1 = match schedule.next(&[], &[], &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected first semi, got {:?}", other),
        };
        let semi2 = match schedule.next(&[], &[], &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected second semi, got {:?}", other),
        };
        assert_eq!(semi1.round, 1);
        assert_eq!(semi2.round, 1);
        // Top seeds are kept apart in round one.
        assert_eq!(pair_key(semi1.first, semi1.second), (0, 3));
        assert_eq!(pair_key(semi2.first, semi2.second), (1, 2));

        assert_eq!(
            schedule.next(&[], &[], &mut rng),
            NextEncounter::WaitingForResults
        );

        schedule.record(
            &semi1,
            &EncounterTally {
                points: [4, 0],
                black_wins: [1, 0],
            },
            &mut rng,
        );
        schedule.record(
            &semi2,
            &EncounterTally {
                points: [1, 3],
                black_wins: [0, 1],
            },
            &mut rng,
        );

        let final_match = match schedule.next(&[], &[], &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected final, got {:?}", other),
        };
        assert_eq!(final_match.round, 2);
        assert_eq!(pair_key(final_match.first, final_match.second), (0, 2));

        schedule.record(
            &final_match,
            &EncounterTally {
                points: [2, 2],
                black_wins: [1, 0],
            },
            &mut rng,
        );
        assert_eq!(schedule.next(&[], &[], &mut rng), NextEncounter::Done);
    }

    #[test]
    fn test_knockout_odd_field_byes() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut schedule = Schedule::new(ScheduleKind::Knockout, 3, 0, false, 0, &mut rng);
        // Seed 0 gets the bye; 1 vs 2 play the first round.
        let semi = match schedule.next(&[], &[], &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected a match, got {:?}", other),
        };
        assert_eq!(pair_key(semi.first, semi.second), (1, 2));
        schedule.record(
            &semi,
            &EncounterTally {
                points: [0, 2],
                black_wins: [0, 0],
            },
            &mut rng,
        );
        let final_match = match schedule.next(&[], &[], &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected final, got {:?}", other),
        };
        assert_eq!(pair_key(final_match.first, final_match.second), (0, 2));
    }

    #[test]
    fn test_swiss_waits_for_round_results() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut schedule = Schedule::new(ScheduleKind::Swiss, 4, 2, false, 0, &mut rng);
        let scores = [0i64; 4];
        let eliminated = [false; 4];

        let r1a = match schedule.next(&scores, &eliminated, &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected pairing, got {:?}", other),
        };
        let r1b = match schedule.next(&scores, &eliminated, &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected pairing, got {:?}", other),
        };
        assert_eq!(r1a.round, 1);
        assert_eq!(r1b.round, 1);
        assert_eq!(
            schedule.next(&scores, &eliminated, &mut rng),
            NextEncounter::WaitingForResults
        );

        schedule.record(&r1a, &EncounterTally::default(), &mut rng);
        schedule.record(&r1b, &EncounterTally::default(), &mut rng);

        let scores = [4i64, 2, 2, 0];
        let r2a = match schedule.next(&scores, &eliminated, &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected round-2 pairing, got {:?}", other),
        };
        assert_eq!(r2a.round, 2);
        // No repeat of a round-1 pairing.
        assert_ne!(
            pair_key(r2a.first, r2a.second),
            pair_key(r1a.first, r1a.second)
        );
        assert_ne!(
            pair_key(r2a.first, r2a.second),
            pair_key(r1b.first, r1b.second)
        );
    }

    #[test]
    fn test_swiss_skips_eliminated_players() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut schedule = Schedule::new(ScheduleKind::Swiss, 4, 1, false, 0, &mut rng);
        let scores = [0i64; 4];
        let eliminated = [false, true, false, false];

        let enc = match schedule.next(&scores, &eliminated, &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected pairing, got {:?}", other),
        };
        assert_ne!(enc.first, 1);
        assert_ne!(enc.second, 1);
    }

    #[test]
    fn test_swiss_stop_new_rounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut schedule = Schedule::new(ScheduleKind::Swiss, 2, 10, false, 0, &mut rng);
        let scores = [0i64; 2];
        let eliminated = [false; 2];

        let round1 = match schedule.next(&scores, &eliminated, &mut rng) {
            NextEncounter::Ready(enc) => enc,
            other => panic!("expected pairing, got {:?}", other),
        };
        schedule.stop_new_rounds();
        schedule.record(&round1, &EncounterTally::default(), &mut rng);
        assert_eq!(
            schedule.next(&scores, &eliminated, &mut rng),
            NextEncounter::Done
        );
    }
}
