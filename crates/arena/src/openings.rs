//! Opening suites: files of starting positions or move sequences used to
//! seed games.
//!
//! Two formats are supported. EPD files carry one position per line; PGN
//! files carry movetext which is converted to coordinate moves up to the
//! configured ply depth. Suites are walked sequentially or drawn at random
//! from the tournament RNG.

use std::path::Path;
use std::str::FromStr;

use chess::{Board, ChessMove};
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpeningError {
    #[error("failed to read opening suite: {0}")]
    Read(#[from] std::io::Error),
    #[error("opening suite {0} contains no usable openings")]
    Empty(String),
    #[error("invalid opening suite format: {0}")]
    Format(String),
}

/// File format of an opening suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteFormat {
    Epd,
    Pgn,
}

impl FromStr for SuiteFormat {
    type Err = OpeningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epd" => Ok(SuiteFormat::Epd),
            "pgn" => Ok(SuiteFormat::Pgn),
            other => Err(OpeningError::Format(other.to_string())),
        }
    }
}

/// Walk order over the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuiteOrder {
    #[default]
    Sequential,
    Random,
}

impl FromStr for SuiteOrder {
    type Err = OpeningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(SuiteOrder::Sequential),
            "random" => Ok(SuiteOrder::Random),
            other => Err(OpeningError::Format(format!("order {}", other))),
        }
    }
}

/// One opening: an optional starting position and the moves applied from
/// it before play begins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Opening {
    pub name: Option<String>,
    /// Starting FEN; `None` means the standard starting position.
    pub fen: Option<String>,
    /// Coordinate moves played out before the engines take over.
    pub moves: Vec<String>,
}

impl Opening {
    /// The standard starting position with no book moves.
    pub fn startpos() -> Self {
        Opening::default()
    }
}

/// An indexed opening suite with a walk cursor.
#[derive(Debug)]
pub struct OpeningSuite {
    entries: Vec<Opening>,
    order: SuiteOrder,
    cursor: usize,
}

impl OpeningSuite {
    /// Loads and indexes a suite.
    ///
    /// `plies` caps the depth of PGN lines; `start` is the 1-based entry to
    /// begin from in sequential order.
    pub fn load<P: AsRef<Path>>(
        path: P,
        format: SuiteFormat,
        order: SuiteOrder,
        plies: u32,
        start: usize,
    ) -> Result<Self, OpeningError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let entries = match format {
            SuiteFormat::Epd => parse_epd(&content),
            SuiteFormat::Pgn => parse_pgn(&content, plies),
        };
        if entries.is_empty() {
            return Err(OpeningError::Empty(path.display().to_string()));
        }
        let cursor = start.saturating_sub(1) % entries.len();
        Ok(Self {
            entries,
            order,
            cursor,
        })
    }

    /// Builds a suite from pre-parsed openings (used by tests and resume).
    pub fn from_entries(entries: Vec<Opening>, order: SuiteOrder) -> Self {
        Self {
            entries,
            order,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the sequential cursor, persisted across resume.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor % self.entries.len().max(1);
    }

    /// Yields the next opening per the configured order.
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> Opening {
        match self.order {
            SuiteOrder::Sequential => {
                let opening = self.entries[self.cursor % self.entries.len()].clone();
                self.cursor = (self.cursor + 1) % self.entries.len();
                opening
            }
            SuiteOrder::Random => {
                let index = rng.gen_range(0..self.entries.len());
                self.entries[index].clone()
            }
        }
    }
}

/// Parses EPD content: one position per line, opcodes after the fourth
/// field. Lines that don't form a legal position are skipped.
fn parse_epd(content: &str) -> Vec<Opening> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let fen = format!(
            "{} {} {} {} 0 1",
            fields[0], fields[1], fields[2], fields[3]
        );
        if Board::from_str(&fen).is_err() {
            tracing::warn!("skipping unparseable EPD line: {}", line);
            continue;
        }
        let name = line.split("id \"").nth(1).and_then(|rest| {
            rest.split('"').next().map(|s| s.to_string())
        });
        entries.push(Opening {
            name,
            fen: Some(fen),
            moves: Vec::new(),
        });
    }
    entries
}

/// Parses PGN content into move sequences, capped at `plies` half-moves.
fn parse_pgn(content: &str, plies: u32) -> Vec<Opening> {
    let mut entries = Vec::new();
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut movetext = String::new();
    let mut in_moves = false;

    let mut flush = |headers: &mut Vec<(String, String)>, movetext: &mut String| {
        if !movetext.trim().is_empty() {
            if let Some(opening) = opening_from_movetext(headers, movetext, plies) {
                entries.push(opening);
            }
        }
        headers.clear();
        movetext.clear();
    };

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            if in_moves {
                flush(&mut headers, &mut movetext);
                in_moves = false;
            }
            if let Some((key, value)) = parse_header(line) {
                headers.push((key, value));
            }
        } else if !line.is_empty() {
            in_moves = true;
            movetext.push(' ');
            movetext.push_str(line);
        }
    }
    flush(&mut headers, &mut movetext);
    entries
}

fn parse_header(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (key, rest) = inner.split_once(' ')?;
    let value = rest.trim().trim_matches('"');
    Some((key.to_string(), value.to_string()))
}

fn opening_from_movetext(
    headers: &[(String, String)],
    movetext: &str,
    plies: u32,
) -> Option<Opening> {
    let header = |key: &str| {
        headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    let fen = header("FEN");
    let name = header("Opening").or_else(|| header("ECO"));

    let mut board = match &fen {
        Some(fen) => Board::from_str(fen).ok()?,
        None => Board::default(),
    };

    let mut moves = Vec::new();
    let mut depth = 0;
    let mut comment_depth = 0u32;
    for token in movetext.split_whitespace() {
        if depth >= plies {
            break;
        }
        // Comments may span several tokens.
        if token.starts_with('{') {
            comment_depth += 1;
        }
        if token.ends_with('}') {
            comment_depth = comment_depth.saturating_sub(1);
            continue;
        }
        if comment_depth > 0 {
            continue;
        }
        if matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*") {
            break;
        }
        // Strip move numbers and annotation glyphs.
        if token.starts_with('$') || token.starts_with('(') || token.ends_with(')') {
            continue;
        }
        let san = token
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
            .trim_end_matches(['+', '#', '!', '?']);
        if san.is_empty() {
            continue;
        }
        let mv = ChessMove::from_san(&board, san).ok()?;
        moves.push(mv.to_string());
        board = board.make_move_new(mv);
        depth += 1;
    }

    if moves.is_empty() && fen.is_none() {
        return None;
    }
    Some(Opening { name, fen, moves })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_epd_positions() {
        let content = "\
rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - id \"Sicilian\";
rnbqkbnr/pppp1ppp/4p3/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -
# a comment line
not a position at all
";
        let entries = parse_epd(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name.as_deref(), Some("Sicilian"));
        assert!(entries[0].fen.as_deref().unwrap().ends_with("0 1"));
        assert!(entries[1].name.is_none());
    }

    #[test]
    fn test_parse_pgn_movetext() {
        let content = "\
[Event \"suite\"]
[Opening \"King's Pawn\"]

1. e4 e5 2. Nf3 Nc6 *

[Event \"suite\"]

1. d4 d5 1/2-1/2
";
        let entries = parse_pgn(content, 16);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name.as_deref(), Some("King's Pawn"));
        assert_eq!(entries[0].moves, vec!["e2e4", "e7e5", "g1f3", "b8c6"]);
        assert_eq!(entries[1].moves, vec!["d2d4", "d7d5"]);
    }

    #[test]
    fn test_parse_pgn_respects_ply_cap() {
        let content = "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 *\n";
        let entries = parse_pgn(content, 3);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].moves, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_sequential_order_wraps() {
        let mut suite = OpeningSuite::from_entries(
            vec![
                Opening {
                    name: Some("a".to_string()),
                    ..Default::default()
                },
                Opening {
                    name: Some("b".to_string()),
                    ..Default::default()
                },
            ],
            SuiteOrder::Sequential,
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(suite.next(&mut rng).name.as_deref(), Some("a"));
        assert_eq!(suite.next(&mut rng).name.as_deref(), Some("b"));
        assert_eq!(suite.next(&mut rng).name.as_deref(), Some("a"));
    }

    #[test]
    fn test_random_order_is_seed_deterministic() {
        let entries: Vec<Opening> = (0..10)
            .map(|i| Opening {
                name: Some(format!("op{}", i)),
                ..Default::default()
            })
            .collect();

        let mut first = OpeningSuite::from_entries(entries.clone(), SuiteOrder::Random);
        let mut second = OpeningSuite::from_entries(entries, SuiteOrder::Random);
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            assert_eq!(first.next(&mut rng_a), second.next(&mut rng_b));
        }
    }

    #[test]
    fn test_load_epd_with_start_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.epd");
        std::fs::write(
            &path,
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - id \"one\";\n\
             rnbqkbnr/pppp1ppp/4p3/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - id \"two\";\n",
        )
        .unwrap();

        let mut suite =
            OpeningSuite::load(&path, SuiteFormat::Epd, SuiteOrder::Sequential, 1024, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(suite.next(&mut rng).name.as_deref(), Some("two"));
        assert_eq!(suite.next(&mut rng).name.as_deref(), Some("one"));
    }

    #[test]
    fn test_load_rejects_empty_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.epd");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(
            OpeningSuite::load(&path, SuiteFormat::Epd, SuiteOrder::Sequential, 1024, 1),
            Err(OpeningError::Empty(_))
        ));
    }

    #[test]
    fn test_format_and_order_from_str() {
        assert_eq!(SuiteFormat::from_str("epd").unwrap(), SuiteFormat::Epd);
        assert_eq!(SuiteFormat::from_str("pgn").unwrap(), SuiteFormat::Pgn);
        assert!(SuiteFormat::from_str("abk").is_err());
        assert_eq!(
            SuiteOrder::from_str("sequential").unwrap(),
            SuiteOrder::Sequential
        );
        assert_eq!(SuiteOrder::from_str("random").unwrap(), SuiteOrder::Random);
        assert!(SuiteOrder::from_str("shuffled").is_err());
    }
}
