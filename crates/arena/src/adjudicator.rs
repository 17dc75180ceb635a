//! Forced game results from score histories, game length and tablebases.
//!
//! The adjudicator is a pure policy object: the game feeds it the full
//! score history after every half-move and it answers with an optional
//! forced result. It keeps no state between games, so identical histories
//! always produce identical decisions.

use chess::{Board, Color};

/// One engine move with the score it reported, from the mover's point of
/// view. Opening-book moves carry no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyScore {
    pub side: Color,
    pub score_cp: Option<i32>,
}

/// Draw rule: from full move `move_number` on, a draw is called once the
/// last `move_count` plies of both sides all stayed within `score_cp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawThreshold {
    pub move_number: u32,
    pub move_count: u32,
    pub score_cp: i32,
}

/// Resign rule: a side resigns once its last `move_count` scores were all
/// at or below `-score_cp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResignThreshold {
    pub move_count: u32,
    pub score_cp: i32,
}

/// Verdict from an endgame tablebase probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TbVerdict {
    Win(Color),
    /// Won position that the 50-move rule turns into a draw.
    CursedWin(Color),
    Draw,
}

/// External tablebase collaborator.
///
/// The adjudicator only consults it when the piece count on the board is
/// within `max_pieces`; `probe` may still decline by returning `None`.
pub trait TablebaseProbe: Send + Sync {
    fn max_pieces(&self) -> u32;
    fn probe(&self, board: &Board) -> Option<TbVerdict>;
}

/// Why a game was adjudicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjudicationReason {
    Draw,
    Resign,
    Tablebase,
    Tcec,
    MaxMoves,
}

/// A forced result: `winner` of `None` means a drawn game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjudication {
    pub winner: Option<Color>,
    pub reason: AdjudicationReason,
}

/// The rule pack consulted after each half-move.
///
/// Rules are tried in a fixed order: tablebase first (if decisive), then
/// the TCEC repetition rule, resignation, the draw rule, and finally the
/// game-length cap.
#[derive(Debug, Clone, Default)]
pub struct Adjudicator {
    draw: Option<DrawThreshold>,
    resign: Option<ResignThreshold>,
    max_moves: u32,
    tb_enabled: bool,
    tb_draw_only: bool,
    tb_ignore50: bool,
    tcec: bool,
    repetition_limit: u32,
}

impl Adjudicator {
    pub fn set_draw_threshold(&mut self, move_number: u32, move_count: u32, score_cp: i32) {
        self.draw = Some(DrawThreshold {
            move_number,
            move_count,
            score_cp,
        });
    }

    pub fn set_resign_threshold(&mut self, move_count: u32, score_cp: i32) {
        self.resign = Some(ResignThreshold {
            move_count,
            score_cp,
        });
    }

    /// Caps the game at `max_moves` full moves; 0 disables the cap.
    pub fn set_maximum_game_length(&mut self, max_moves: u32) {
        self.max_moves = max_moves;
    }

    pub fn set_tablebase_adjudication(&mut self, enabled: bool, draw_only: bool) {
        self.tb_enabled = enabled;
        self.tb_draw_only = draw_only;
    }

    /// Disregards the 50-move counter when a probe reports a cursed win.
    pub fn set_tb_ignore50(&mut self, ignore: bool) {
        self.tb_ignore50 = ignore;
    }

    /// Enables the TCEC rule pack: tournament-operator defaults for the
    /// draw and resign rules plus a forced draw on repeated positions.
    /// Thresholds already set explicitly are left alone.
    pub fn set_tcec_adjudication(&mut self, enabled: bool) {
        self.tcec = enabled;
        if !enabled {
            return;
        }
        if self.draw.is_none() {
            self.draw = Some(DrawThreshold {
                move_number: 35,
                move_count: 8,
                score_cp: 8,
            });
        }
        if self.resign.is_none() {
            self.resign = Some(ResignThreshold {
                move_count: 8,
                score_cp: 1000,
            });
        }
        if self.repetition_limit == 0 {
            self.repetition_limit = 3;
        }
    }

    pub fn is_tcec(&self) -> bool {
        self.tcec
    }

    /// Consults the rule pack after a half-move.
    ///
    /// `history` holds every engine move in order, `plies` counts all
    /// half-moves including the opening line, and `repetitions` is how many
    /// times the current position has occurred.
    pub fn adjudicate(
        &self,
        history: &[PlyScore],
        board: &Board,
        plies: u32,
        repetitions: u32,
        probe: Option<&dyn TablebaseProbe>,
    ) -> Option<Adjudication> {
        if let Some(result) = self.tablebase_result(board, probe) {
            return Some(result);
        }
        if self.tcec && self.repetition_limit > 0 && repetitions >= self.repetition_limit {
            return Some(Adjudication {
                winner: None,
                reason: AdjudicationReason::Tcec,
            });
        }
        if let Some(result) = self.resign_result(history) {
            return Some(result);
        }
        if let Some(result) = self.draw_result(history, plies) {
            return Some(result);
        }
        if self.max_moves > 0 && plies >= self.max_moves * 2 {
            return Some(Adjudication {
                winner: None,
                reason: AdjudicationReason::MaxMoves,
            });
        }
        None
    }

    fn tablebase_result(
        &self,
        board: &Board,
        probe: Option<&dyn TablebaseProbe>,
    ) -> Option<Adjudication> {
        if !self.tb_enabled {
            return None;
        }
        let probe = probe?;
        if board.combined().popcnt() > probe.max_pieces() {
            return None;
        }
        let winner = match probe.probe(board)? {
            TbVerdict::Draw => None,
            TbVerdict::Win(side) => Some(side),
            TbVerdict::CursedWin(side) if self.tb_ignore50 => Some(side),
            TbVerdict::CursedWin(_) => None,
        };
        if winner.is_some() && self.tb_draw_only {
            return None;
        }
        Some(Adjudication {
            winner,
            reason: AdjudicationReason::Tablebase,
        })
    }

    fn resign_result(&self, history: &[PlyScore]) -> Option<Adjudication> {
        let rule = self.resign?;
        if rule.move_count == 0 {
            return None;
        }
        for side in [Color::White, Color::Black] {
            let scores: Vec<i32> = history
                .iter()
                .filter(|p| p.side == side)
                .rev()
                .take(rule.move_count as usize)
                .filter_map(|p| p.score_cp)
                .collect();
            if scores.len() == rule.move_count as usize
                && scores.iter().all(|&s| s <= -rule.score_cp)
            {
                let reason = if self.tcec {
                    AdjudicationReason::Tcec
                } else {
                    AdjudicationReason::Resign
                };
                return Some(Adjudication {
                    winner: Some(!side),
                    reason,
                });
            }
        }
        None
    }

    fn draw_result(&self, history: &[PlyScore], plies: u32) -> Option<Adjudication> {
        let rule = self.draw?;
        if rule.move_count == 0 || plies < rule.move_number * 2 {
            return None;
        }
        for side in [Color::White, Color::Black] {
            let scores: Vec<i32> = history
                .iter()
                .filter(|p| p.side == side)
                .rev()
                .take(rule.move_count as usize)
                .filter_map(|p| p.score_cp)
                .collect();
            if scores.len() < rule.move_count as usize
                || scores.iter().any(|&s| s.abs() > rule.score_cp)
            {
                return None;
            }
        }
        let reason = if self.tcec {
            AdjudicationReason::Tcec
        } else {
            AdjudicationReason::Draw
        };
        Some(Adjudication {
            winner: None,
            reason,
        })
    }
}
