//! Sequential Probability Ratio Test for early stopping of engine
//! comparisons.
//!
//! The log-likelihood ratio is computed from the head-to-head win/draw/
//! loss counts under a BayesElo model, with the draw rate estimated from
//! the observed results. H1 (`elo >= elo1`) is accepted when the LLR
//! crosses the upper bound, H0 (`elo <= elo0`) at the lower bound.

/// Hypothesis bounds and error rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprtParams {
    pub elo0: f64,
    pub elo1: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// Test state after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprtStatus {
    Continue,
    AcceptH0,
    AcceptH1,
}

/// One game result from the candidate's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePoint {
    Win,
    Draw,
    Loss,
}

/// Running SPRT over a single head-to-head comparison.
#[derive(Debug, Clone)]
pub struct Sprt {
    params: SprtParams,
    wins: u32,
    draws: u32,
    losses: u32,
}

impl Sprt {
    pub fn new(params: SprtParams) -> Self {
        Self {
            params,
            wins: 0,
            draws: 0,
            losses: 0,
        }
    }

    pub fn params(&self) -> SprtParams {
        self.params
    }

    pub fn counts(&self) -> (u32, u32, u32) {
        (self.wins, self.draws, self.losses)
    }

    pub fn add(&mut self, point: GamePoint) {
        match point {
            GamePoint::Win => self.wins += 1,
            GamePoint::Draw => self.draws += 1,
            GamePoint::Loss => self.losses += 1,
        }
    }

    /// The current log-likelihood ratio.
    ///
    /// Until at least one win, one draw and one loss are on the books the
    /// draw-rate estimate is degenerate and the LLR is held at zero.
    pub fn llr(&self) -> f64 {
        if self.wins == 0 || self.draws == 0 || self.losses == 0 {
            return 0.0;
        }
        let total = f64::from(self.wins + self.draws + self.losses);
        let p_win = f64::from(self.wins) / total;
        let p_loss = f64::from(self.losses) / total;

        let draw_elo =
            200.0 * ((1.0 - p_loss) / p_loss * (1.0 - p_win) / p_win).log10();

        let (w0, d0, l0) = bayeselo_probs(self.params.elo0, draw_elo);
        let (w1, d1, l1) = bayeselo_probs(self.params.elo1, draw_elo);

        f64::from(self.wins) * (w1 / w0).ln()
            + f64::from(self.draws) * (d1 / d0).ln()
            + f64::from(self.losses) * (l1 / l0).ln()
    }

    pub fn status(&self) -> SprtStatus {
        let lower = (self.params.beta / (1.0 - self.params.alpha)).ln();
        let upper = ((1.0 - self.params.beta) / self.params.alpha).ln();
        let llr = self.llr();
        if llr >= upper {
            SprtStatus::AcceptH1
        } else if llr <= lower {
            SprtStatus::AcceptH0
        } else {
            SprtStatus::Continue
        }
    }
}

/// Win/draw/loss probabilities for a given elo under the BayesElo model.
fn bayeselo_probs(elo: f64, draw_elo: f64) -> (f64, f64, f64) {
    let p_win = 1.0 / (1.0 + 10f64.powf((-elo + draw_elo) / 400.0));
    let p_loss = 1.0 / (1.0 + 10f64.powf((elo + draw_elo) / 400.0));
    let p_draw = 1.0 - p_win - p_loss;
    (p_win, p_draw, p_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params() -> SprtParams {
        SprtParams {
            elo0: 0.0,
            elo1: 5.0,
            alpha: 0.05,
            beta: 0.05,
        }
    }

    #[test]
    fn test_llr_is_zero_before_all_result_kinds() {
        let mut sprt = Sprt::new(params());
        for _ in 0..50 {
            sprt.add(GamePoint::Win);
        }
        assert_eq!(sprt.llr(), 0.0);
        assert_eq!(sprt.status(), SprtStatus::Continue);
    }

    #[test]
    fn test_llr_drifts_up_when_candidate_dominates() {
        let mut sprt = Sprt::new(params());
        sprt.add(GamePoint::Loss);
        sprt.add(GamePoint::Draw);
        let mut previous = sprt.llr();
        for _ in 0..30 {
            sprt.add(GamePoint::Win);
            let llr = sprt.llr();
            assert!(llr >= previous);
            previous = llr;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn test_llr_drifts_down_when_candidate_loses() {
        let mut sprt = Sprt::new(params());
        sprt.add(GamePoint::Win);
        sprt.add(GamePoint::Draw);
        for _ in 0..60 {
            sprt.add(GamePoint::Loss);
        }
        assert!(sprt.llr() < 0.0);
        assert_eq!(sprt.status(), SprtStatus::AcceptH0);
    }

    #[test]
    fn test_counts_track_updates() {
        let mut sprt = Sprt::new(params());
        sprt.add(GamePoint::Win);
        sprt.add(GamePoint::Win);
        sprt.add(GamePoint::Draw);
        sprt.add(GamePoint::Loss);
        assert_eq!(sprt.counts(), (2, 1, 1));
    }

    /// Simulated check of the power guarantee: with the true strength well
    /// inside H1, the test accepts H1.
    #[test]
    fn test_simulated_h1_acceptance() {
        let mut rng = StdRng::seed_from_u64(20260802);
        let true_elo: f64 = 50.0;
        let expected = 1.0 / (1.0 + 10f64.powf(-true_elo / 400.0));
        let draw_rate = 0.3;

        let mut accepted_h1 = 0;
        for _ in 0..20 {
            let mut sprt = Sprt::new(params());
            for _ in 0..100_000 {
                let roll: f64 = rng.gen();
                if roll < draw_rate {
                    sprt.add(GamePoint::Draw);
                } else if rng.gen::<f64>() < (expected - draw_rate / 2.0) / (1.0 - draw_rate) {
                    sprt.add(GamePoint::Win);
                } else {
                    sprt.add(GamePoint::Loss);
                }
                match sprt.status() {
                    SprtStatus::Continue => continue,
                    SprtStatus::AcceptH1 => {
                        accepted_h1 += 1;
                        break;
                    }
                    SprtStatus::AcceptH0 => break,
                }
            }
        }
        // beta = 0.05 and the margin is huge; near-every run must accept H1.
        assert!(accepted_h1 >= 18, "H1 accepted only {} / 20 times", accepted_h1);
    }
}
