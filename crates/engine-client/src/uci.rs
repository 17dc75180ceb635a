//! UCI codec: command formatting and engine-output parsing.

use crate::{EngineEvent, SearchLimits};

/// Information extracted from UCI `info` lines during engine search.
///
/// Captures the search metrics engines report while calculating: depth,
/// score, nodes, time and the principal variation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SearchInfo {
    /// The search depth reached (in plies).
    pub depth: Option<u32>,
    /// The score in centipawns from the mover's point of view.
    pub score_cp: Option<i32>,
    /// Mate score: positive means mating in N, negative means getting mated.
    pub score_mate: Option<i32>,
    /// Number of nodes searched.
    pub nodes: Option<u64>,
    /// Time spent searching in milliseconds.
    pub time_ms: Option<u64>,
    /// Principal variation - the expected best line of play.
    pub pv: Vec<String>,
}

impl SearchInfo {
    /// Parses a UCI `info` line.
    ///
    /// Returns `None` if the line doesn't start with `info ` or carries no
    /// depth (which indicates it's not a substantive search report).
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with("info ") {
            return None;
        }

        let mut info = SearchInfo::default();
        let parts: Vec<&str> = line.split_whitespace().collect();
        let mut i = 1;

        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    info.depth = parts.get(i).and_then(|s| s.parse().ok());
                }
                "score" => {
                    i += 1;
                    match parts.get(i) {
                        Some(&"cp") => {
                            i += 1;
                            info.score_cp = parts.get(i).and_then(|s| s.parse().ok());
                        }
                        Some(&"mate") => {
                            i += 1;
                            info.score_mate = parts.get(i).and_then(|s| s.parse().ok());
                        }
                        _ => {}
                    }
                }
                "nodes" => {
                    i += 1;
                    info.nodes = parts.get(i).and_then(|s| s.parse().ok());
                }
                "time" => {
                    i += 1;
                    info.time_ms = parts.get(i).and_then(|s| s.parse().ok());
                }
                "pv" => {
                    info.pv = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                    break;
                }
                _ => {}
            }
            i += 1;
        }

        if info.depth.is_some() {
            Some(info)
        } else {
            None
        }
    }

    /// Score in centipawns, folding mate announcements into +/-32000.
    pub fn centipawns(&self) -> Option<i32> {
        match (self.score_cp, self.score_mate) {
            (Some(cp), _) => Some(cp),
            (None, Some(m)) if m > 0 => Some(32000),
            (None, Some(_)) => Some(-32000),
            _ => None,
        }
    }
}

/// Maps one line of engine output to an event.
pub(crate) fn parse_line(line: &str) -> Option<EngineEvent> {
    if line == "uciok" {
        return Some(EngineEvent::ProtocolOk);
    }
    if line == "readyok" {
        return Some(EngineEvent::Ready);
    }
    if let Some(name) = line.strip_prefix("id name ") {
        return Some(EngineEvent::IdName(name.trim().to_string()));
    }
    if let Some(rest) = line.strip_prefix("bestmove") {
        let mut words = rest.split_whitespace();
        let mv = words.next().unwrap_or("").to_string();
        let ponder = match (words.next(), words.next()) {
            (Some("ponder"), Some(p)) => Some(p.to_string()),
            _ => None,
        };
        return Some(EngineEvent::BestMove { mv, ponder });
    }
    if let Some(rest) = line.strip_prefix("option name ") {
        // "option name <N> type <T> [default <D>] ..."
        let name = rest.split(" type ").next().unwrap_or(rest).trim().to_string();
        let default = rest
            .split_whitespace()
            .skip_while(|w| *w != "default")
            .nth(1)
            .map(|s| s.to_string());
        return Some(EngineEvent::OptionDeclared { name, default });
    }
    if let Some(info) = SearchInfo::parse(line) {
        return Some(EngineEvent::Info(info));
    }
    None
}

/// Formats a `go` command for the given limits.
pub(crate) fn format_go(limits: &SearchLimits) -> String {
    let mut cmd = String::from("go");
    if limits.infinite {
        cmd.push_str(" infinite");
        return cmd;
    }
    if let Some(t) = limits.wtime {
        cmd.push_str(&format!(" wtime {}", t));
    }
    if let Some(t) = limits.btime {
        cmd.push_str(&format!(" btime {}", t));
    }
    if let Some(t) = limits.winc {
        cmd.push_str(&format!(" winc {}", t));
    }
    if let Some(t) = limits.binc {
        cmd.push_str(&format!(" binc {}", t));
    }
    if let Some(m) = limits.movestogo {
        cmd.push_str(&format!(" movestogo {}", m));
    }
    if let Some(t) = limits.movetime {
        cmd.push_str(&format!(" movetime {}", t));
    }
    if let Some(d) = limits.depth {
        cmd.push_str(&format!(" depth {}", d));
    }
    if let Some(n) = limits.nodes {
        cmd.push_str(&format!(" nodes {}", n));
    }
    cmd
}

/// Formats a `position` command from an optional FEN and a move list.
pub(crate) fn format_position(fen: Option<&str>, moves: &[String]) -> String {
    let mut cmd = match fen {
        Some(fen) => format!("position fen {}", fen),
        None => String::from("position startpos"),
    };
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_info_parse_basic() {
        let line = "info depth 20 score cp 35 nodes 1234567 time 1500 pv e2e4 e7e5 g1f3";
        let info = SearchInfo::parse(line).unwrap();
        assert_eq!(info.depth, Some(20));
        assert_eq!(info.score_cp, Some(35));
        assert_eq!(info.score_mate, None);
        assert_eq!(info.nodes, Some(1234567));
        assert_eq!(info.time_ms, Some(1500));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_search_info_parse_mate() {
        let info = SearchInfo::parse("info depth 15 score mate 3 pv e2e4").unwrap();
        assert_eq!(info.score_mate, Some(3));
        assert_eq!(info.centipawns(), Some(32000));

        let info = SearchInfo::parse("info depth 12 score mate -5 pv a2a3").unwrap();
        assert_eq!(info.centipawns(), Some(-32000));
    }

    #[test]
    fn test_search_info_parse_invalid() {
        assert!(SearchInfo::parse("bestmove e2e4").is_none());
        assert!(SearchInfo::parse("info string Loading weights").is_none());
        assert!(SearchInfo::parse("info currmove e2e4 currmovenumber 1").is_none());
    }

    #[test]
    fn test_parse_line_handshake() {
        assert_eq!(parse_line("uciok"), Some(EngineEvent::ProtocolOk));
        assert_eq!(parse_line("readyok"), Some(EngineEvent::Ready));
        assert_eq!(
            parse_line("id name Stockfish 16"),
            Some(EngineEvent::IdName("Stockfish 16".to_string()))
        );
    }

    #[test]
    fn test_parse_line_bestmove() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            Some(EngineEvent::BestMove {
                mv: "e2e4".to_string(),
                ponder: Some("e7e5".to_string()),
            })
        );
        assert_eq!(
            parse_line("bestmove (none)"),
            Some(EngineEvent::BestMove {
                mv: "(none)".to_string(),
                ponder: None,
            })
        );
    }

    #[test]
    fn test_parse_line_option() {
        let event = parse_line("option name Hash type spin default 16 min 1 max 4096").unwrap();
        assert_eq!(
            event,
            EngineEvent::OptionDeclared {
                name: "Hash".to_string(),
                default: Some("16".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_line_ignores_noise() {
        assert_eq!(parse_line("id author someone"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_format_go_classical() {
        let limits = SearchLimits {
            wtime: Some(60000),
            btime: Some(58000),
            winc: Some(600),
            binc: Some(600),
            movestogo: Some(12),
            ..Default::default()
        };
        assert_eq!(
            format_go(&limits),
            "go wtime 60000 btime 58000 winc 600 binc 600 movestogo 12"
        );
    }

    #[test]
    fn test_format_go_infinite_wins() {
        let limits = SearchLimits {
            movetime: Some(1000),
            infinite: true,
            ..Default::default()
        };
        assert_eq!(format_go(&limits), "go infinite");
    }

    #[test]
    fn test_format_go_fixed_and_ceilings() {
        let limits = SearchLimits {
            movetime: Some(500),
            depth: Some(12),
            nodes: Some(100000),
            ..Default::default()
        };
        assert_eq!(format_go(&limits), "go movetime 500 depth 12 nodes 100000");
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(None, &[]), "position startpos");
        assert_eq!(
            format_position(None, &["e2e4".to_string(), "e7e5".to_string()]),
            "position startpos moves e2e4 e7e5"
        );
        assert_eq!(
            format_position(Some("8/8/8/8/8/8/8/K1k5 w - - 0 1"), &[]),
            "position fen 8/8/8/8/8/8/8/K1k5 w - - 0 1"
        );
    }
}
