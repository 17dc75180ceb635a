//! CECP (xboard) codec: feature negotiation, command formatting and
//! engine-output parsing.
//!
//! The engine is kept in force mode; moves are relayed as they happen and
//! `go` hands it the side to move. Clock updates travel as `time`/`otim`
//! in centiseconds.

use crate::{EngineEvent, SearchLimits};

/// Features announced by the engine during `protover 2` negotiation.
///
/// Only the ones the client acts on are retained.
#[derive(Debug, Clone, Default)]
pub(crate) struct Features {
    pub usermove: bool,
    pub setboard: bool,
    pub ping: bool,
    pub done: bool,
}

impl Features {
    /// Applies one `feature` line, returning events for declared options.
    pub fn apply(&mut self, line: &str) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for (key, value) in split_features(line) {
            match key.as_str() {
                "usermove" => self.usermove = value == "1",
                "setboard" => self.setboard = value == "1",
                "ping" => self.ping = value == "1",
                "done" => {
                    self.done = value == "1";
                    if self.done {
                        events.push(EngineEvent::ProtocolOk);
                    }
                }
                "option" => {
                    // feature option="Name -spin 50 0 100"
                    let name = value
                        .split(" -")
                        .next()
                        .unwrap_or(value.as_str())
                        .trim()
                        .to_string();
                    events.push(EngineEvent::OptionDeclared {
                        name,
                        default: None,
                    });
                }
                "myname" => events.push(EngineEvent::IdName(value)),
                _ => {}
            }
        }
        events
    }
}

/// Splits `feature a=1 b="x y" c=0` into key/value pairs, honoring quotes.
fn split_features(line: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = line.trim();
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];
        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            value = stripped[..end].to_string();
            rest = stripped.get(end + 1..).unwrap_or("").trim_start();
        } else {
            let end = rest.find(' ').unwrap_or(rest.len());
            value = rest[..end].to_string();
            rest = rest.get(end..).unwrap_or("").trim_start();
        }
        pairs.push((key, value));
    }
    pairs
}

/// Maps one line of engine output to events.
///
/// `features` accumulates negotiation state as `feature` lines arrive. A
/// single `feature` line may carry several declarations, so the parser
/// returns every event it produced; an empty vector means the line was
/// chatter to ignore.
pub(crate) fn parse_line(line: &str, features: &mut Features) -> Vec<EngineEvent> {
    if let Some(rest) = line.strip_prefix("feature ") {
        return features.apply(rest);
    }
    if let Some(rest) = line.strip_prefix("move ") {
        return vec![EngineEvent::BestMove {
            mv: rest.trim().to_string(),
            ponder: None,
        }];
    }
    if line.starts_with("pong ") {
        return vec![EngineEvent::Ready];
    }
    if line == "resign" {
        return vec![EngineEvent::ResultClaim {
            result: "resign".to_string(),
            comment: String::new(),
        }];
    }
    for result in ["1-0", "0-1", "1/2-1/2"] {
        if line == result || line.starts_with(&format!("{} {{", result)) {
            let comment = line
                .find('{')
                .map(|i| line[i + 1..].trim_end_matches('}').trim().to_string())
                .unwrap_or_default();
            return vec![EngineEvent::ResultClaim {
                result: result.to_string(),
                comment,
            }];
        }
    }
    if let Some(rest) = line.strip_prefix("Illegal move") {
        return vec![EngineEvent::Error(format!("engine rejected a move{}", rest))];
    }
    if let Some(rest) = line.strip_prefix("tellusererror ") {
        return vec![EngineEvent::Error(rest.to_string())];
    }
    if let Some(rest) = line.strip_prefix("Error ") {
        return vec![EngineEvent::Error(rest.to_string())];
    }
    Vec::new()
}

/// Formats the clock updates and move request for the side to move.
///
/// CECP expresses clocks in centiseconds; `time` is the engine's own clock
/// and `otim` the opponent's. Per-move and depth bounds were already set
/// with `st`/`sd` at game start.
pub(crate) fn format_go(limits: &SearchLimits, engine_is_white: bool) -> Vec<String> {
    let mut cmds = Vec::new();
    let (own, other) = if engine_is_white {
        (limits.wtime, limits.btime)
    } else {
        (limits.btime, limits.wtime)
    };
    if let Some(t) = own {
        cmds.push(format!("time {}", t / 10));
    }
    if let Some(t) = other {
        cmds.push(format!("otim {}", t / 10));
    }
    cmds.push("go".to_string());
    cmds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_negotiation() {
        let mut features = Features::default();
        assert!(parse_line("feature usermove=1 setboard=1 ping=1", &mut features).is_empty());
        assert!(features.usermove);
        assert!(features.setboard);
        assert!(features.ping);
        assert!(!features.done);

        let events = parse_line("feature done=1", &mut features);
        assert_eq!(events, vec![EngineEvent::ProtocolOk]);
        assert!(features.done);
    }

    #[test]
    fn test_feature_quoted_values() {
        let mut features = Features::default();
        let events = parse_line(r#"feature myname="GNU Chess 6""#, &mut features);
        assert_eq!(events, vec![EngineEvent::IdName("GNU Chess 6".to_string())]);
    }

    #[test]
    fn test_feature_option_then_done_on_one_line() {
        let mut features = Features::default();
        let events = parse_line(r#"feature option="Ponder -check 0" done=1"#, &mut features);
        assert_eq!(
            events,
            vec![
                EngineEvent::OptionDeclared {
                    name: "Ponder".to_string(),
                    default: None,
                },
                EngineEvent::ProtocolOk,
            ]
        );
    }

    #[test]
    fn test_parse_move() {
        let mut features = Features::default();
        assert_eq!(
            parse_line("move e2e4", &mut features),
            vec![EngineEvent::BestMove {
                mv: "e2e4".to_string(),
                ponder: None,
            }]
        );
    }

    #[test]
    fn test_parse_result_claims() {
        let mut features = Features::default();
        let events = parse_line("1-0 {White mates}", &mut features);
        assert_eq!(
            events,
            vec![EngineEvent::ResultClaim {
                result: "1-0".to_string(),
                comment: "White mates".to_string(),
            }]
        );

        let events = parse_line("resign", &mut features);
        assert_eq!(
            events,
            vec![EngineEvent::ResultClaim {
                result: "resign".to_string(),
                comment: String::new(),
            }]
        );
    }

    #[test]
    fn test_parse_pong_and_errors() {
        let mut features = Features::default();
        assert_eq!(parse_line("pong 3", &mut features), vec![EngineEvent::Ready]);
        assert!(matches!(
            parse_line("Illegal move: e2e5", &mut features).as_slice(),
            [EngineEvent::Error(_)]
        ));
        assert!(matches!(
            parse_line("tellusererror bad state", &mut features).as_slice(),
            [EngineEvent::Error(_)]
        ));
    }

    #[test]
    fn test_format_go_clock_sides() {
        let limits = SearchLimits {
            wtime: Some(60000),
            btime: Some(30000),
            ..Default::default()
        };
        assert_eq!(
            format_go(&limits, true),
            vec!["time 6000", "otim 3000", "go"]
        );
        assert_eq!(
            format_go(&limits, false),
            vec!["time 3000", "otim 6000", "go"]
        );
    }
}
