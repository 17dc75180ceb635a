//! The command-line surface and tournament assembly.
//!
//! Flags are a configuration source only: everything here parses user
//! input into typed settings, resolves the tournament file for resume,
//! and hands a fully-wired [`AppSetup`] to the supervisor.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::adjudicator::Adjudicator;
use crate::clock::TimeControl;
use crate::config::{ConfigError, EngineConfig, EngineManager, OptionValue, RestartMode};
use crate::game::GameTimeouts;
use crate::openings::{OpeningSuite, SuiteFormat, SuiteOrder};
use crate::output::{EpdOutput, LiveOutput, OutputMeta, PgnMode, PgnOutput};
use crate::persistence::{
    DrawAdjudicationDoc, EngineSettingsDoc, ProgressEntry, ResignAdjudicationDoc, SettingsDoc,
    SprtDoc, TournamentFile,
};
use crate::tournament::sprt::SprtParams;
use crate::tournament::{Tournament, TournamentSettings};

/// Runs automated tournaments between external chess engines.
#[derive(Parser, Debug)]
#[command(name = "arena", version, about)]
pub struct Cli {
    /// Engine definition as key=value tokens (repeat per engine).
    /// Keys: conf, name, cmd, dir, arg, proto, initstr, restart, trust,
    /// tc, st, timemargin, book, bookdepth, whitepov, depth, nodes,
    /// ponder, option.<name>=<v>, stderr.
    #[arg(long = "engine", num_args = 1.., value_name = "K=V")]
    pub engine: Vec<Vec<String>>,

    /// Options applied to every engine after its own.
    #[arg(long, num_args = 1.., value_name = "K=V")]
    pub each: Option<Vec<String>>,

    /// Tournament type.
    #[arg(long, value_name = "TYPE")]
    pub tournament: Option<String>,

    /// Chess variant (only `standard` is playable).
    #[arg(long)]
    pub variant: Option<String>,

    /// Parallel game slots.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Games per encounter.
    #[arg(long)]
    pub games: Option<u32>,

    /// Round multiplier.
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Consecutive pairings sharing an opening (2 when given bare).
    #[arg(long, num_args = 0..=1, default_missing_value = "2")]
    pub repeat: Option<u32>,

    /// Do not swap sides between paired engines.
    #[arg(long)]
    pub noswap: bool,

    /// Recover crashed engines and keep the tournament going.
    #[arg(long)]
    pub recover: bool,

    /// Delay between games in seconds.
    #[arg(long, value_name = "S")]
    pub wait: Option<u64>,

    /// Adjudicate a draw at this many full moves.
    #[arg(long)]
    pub maxmoves: Option<u32>,

    /// Number of top seeds kept apart in the first round.
    #[arg(long)]
    pub seeds: Option<u32>,

    /// Strikes before an engine is eliminated (0 disables).
    #[arg(long)]
    pub strikes: Option<u32>,

    /// Order round-robin cycles by Berger tables.
    #[arg(long)]
    pub bergerschedule: bool,

    /// Draw adjudication: movenumber=X movecount=Y score=Z.
    #[arg(long, num_args = 1..)]
    pub draw: Option<Vec<String>>,

    /// Resign adjudication: movecount=Y score=Z.
    #[arg(long, num_args = 1..)]
    pub resign: Option<Vec<String>>,

    /// Tablebase directory for adjudication.
    #[arg(long)]
    pub tb: Option<PathBuf>,

    /// Maximum pieces for tablebase probes.
    #[arg(long)]
    pub tbpieces: Option<u32>,

    /// Ignore the 50-move rule on cursed tablebase wins.
    #[arg(long)]
    pub tbignore50: bool,

    /// Only adjudicate draws from the tablebase.
    #[arg(long)]
    pub tbdrawonly: bool,

    /// Enable the TCEC adjudication pack.
    #[arg(long)]
    pub tcecadj: bool,

    /// Opening suite: file=P format={epd|pgn} order={sequential|random}
    /// plies=N start=K.
    #[arg(long, num_args = 1..)]
    pub openings: Option<Vec<String>>,

    /// Opening book access mode.
    #[arg(long)]
    pub bookmode: Option<String>,

    /// PGN output file, optionally `min` and/or `fi`.
    #[arg(long, num_args = 1..=3)]
    pub pgnout: Option<Vec<String>>,

    /// EPD output file for final positions.
    #[arg(long)]
    pub epdout: Option<PathBuf>,

    /// Live PGN output file, optionally `min`, `nopgn`, `nojson`.
    #[arg(long, num_args = 1..=4)]
    pub livepgnout: Option<Vec<String>>,

    /// SPRT stopping rule: elo0=.. elo1=.. alpha=.. beta=..
    #[arg(long, num_args = 1..)]
    pub sprt: Option<Vec<String>>,

    /// Print the standings every N completed games.
    #[arg(long)]
    pub ratinginterval: Option<u32>,

    /// Elo K-factor (1..=200).
    #[arg(long)]
    pub kfactor: Option<f64>,

    /// Event name for game records.
    #[arg(long)]
    pub event: Option<String>,

    /// Site name for game records.
    #[arg(long)]
    pub site: Option<String>,

    /// RNG seed; persisted with the tournament file.
    #[arg(long)]
    pub srand: Option<u64>,

    /// Tournament file for persistence and resume.
    #[arg(long)]
    pub tournamentfile: Option<PathBuf>,

    /// Resume from the tournament file.
    #[arg(long)]
    pub resume: bool,

    /// Re-read named engine configurations between games.
    #[arg(long)]
    pub reloadconf: bool,

    /// Log all engine I/O, optionally to a file.
    #[arg(long, num_args = 0..=1, default_missing_value = "", value_name = "FILE")]
    pub debug: Option<String>,

    /// List the named engine configurations and exit.
    #[arg(long = "engines")]
    pub list_engines: bool,

    /// Path of the named-engine configuration file.
    #[arg(long, default_value = "engines.json")]
    pub enginefile: PathBuf,
}

/// One parsed `-engine` block.
#[derive(Debug, Clone, Default)]
pub struct EngineData {
    pub config: EngineConfig,
    pub tc: TimeControl,
    pub book: Option<PathBuf>,
    pub book_depth: u32,
}

/// Everything the supervisor needs to run.
pub struct AppSetup {
    pub tournament: Tournament,
    pub concurrency: usize,
    pub start_delay: Duration,
    pub timeouts: GameTimeouts,
    pub pgn_out: Option<PgnOutput>,
    pub epd_out: Option<EpdOutput>,
    pub live_out: Option<LiveOutput>,
    pub meta: OutputMeta,
    pub tournament_file: Option<PathBuf>,
    pub file_doc: TournamentFile,
    pub resume_entries: Vec<ProgressEntry>,
    pub rating_interval: u32,
}

fn invalid(option: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

/// Splits `k=v` (or a bare flag) into key and optional value.
fn split_kv(token: &str) -> (&str, Option<&str>) {
    match token.split_once('=') {
        Some((k, v)) => (k, Some(v)),
        None => (token, None),
    }
}

/// Parses one engine's key=value tokens, in order, onto `data`.
pub fn parse_engine(
    tokens: &[String],
    data: &mut EngineData,
    manager: &EngineManager,
) -> Result<(), ConfigError> {
    for token in tokens {
        let (key, value) = split_kv(token);
        let require = |value: Option<&str>| {
            value
                .map(str::to_string)
                .ok_or_else(|| invalid(key, "missing value"))
        };
        match key {
            "conf" => {
                let name = require(value)?;
                data.config = manager.get(&name)?.clone();
            }
            "name" => data.config.name = require(value)?,
            "cmd" => data.config.command = require(value)?,
            "dir" => data.config.working_directory = Some(PathBuf::from(require(value)?)),
            "arg" => data.config.arguments.push(require(value)?),
            "proto" => {
                let value = require(value)?;
                data.config.protocol = value
                    .parse()
                    .map_err(|_| invalid("proto", &value))?;
            }
            "initstr" => data
                .config
                .init_strings
                .push(require(value)?.replace("\\n", "\n")),
            "restart" => {
                let value = require(value)?;
                data.config.restart_mode = RestartMode::from_str(&value)
                    .map_err(|_| invalid("restart", &value))?;
            }
            "trust" => data.config.validate_claims = false,
            "tc" => {
                let value = require(value)?;
                let tc: TimeControl =
                    value.parse().map_err(|_| invalid("tc", &value))?;
                data.tc.infinite = tc.infinite;
                data.tc.moves_per_tc = tc.moves_per_tc;
                data.tc.time_per_tc_ms = tc.time_per_tc_ms;
                data.tc.increment_ms = tc.increment_ms;
            }
            "st" => {
                let value = require(value)?;
                let seconds: f64 = value.parse().map_err(|_| invalid("st", &value))?;
                if !(seconds > 0.0) {
                    return Err(invalid("st", &value));
                }
                data.tc.time_per_move_ms = (seconds * 1000.0) as u64;
            }
            "timemargin" => {
                let value = require(value)?;
                data.tc.expiry_margin_ms =
                    value.parse().map_err(|_| invalid("timemargin", &value))?;
            }
            "book" => data.book = Some(PathBuf::from(require(value)?)),
            "bookdepth" => {
                let value = require(value)?;
                let depth: u32 = value.parse().map_err(|_| invalid("bookdepth", &value))?;
                if depth == 0 {
                    return Err(invalid("bookdepth", &value));
                }
                data.book_depth = depth;
            }
            "whitepov" => data.config.white_eval_pov = true,
            "depth" => {
                let value = require(value)?;
                let depth: u32 = value.parse().map_err(|_| invalid("depth", &value))?;
                if depth == 0 {
                    return Err(invalid("depth", &value));
                }
                data.tc.ply_limit = Some(depth);
            }
            "nodes" => {
                let value = require(value)?;
                let nodes: u64 = value.parse().map_err(|_| invalid("nodes", &value))?;
                if nodes == 0 {
                    return Err(invalid("nodes", &value));
                }
                data.tc.node_limit = Some(nodes);
            }
            "ponder" => data.config.ponder = true,
            "stderr" => data.config.stderr_file = Some(PathBuf::from(require(value)?)),
            _ if key.starts_with("option.") => {
                let name = &key["option.".len()..];
                let value = require(value)?;
                data.config.set_option(name, OptionValue::infer(&value));
            }
            _ => return Err(invalid("engine option", key)),
        }
    }
    Ok(())
}

/// Parses `key=value` adjudication-style option lists into a lookup.
fn kv_map(tokens: &[String]) -> Vec<(String, String)> {
    tokens
        .iter()
        .map(|t| {
            let (k, v) = split_kv(t);
            (k.to_string(), v.unwrap_or("").to_string())
        })
        .collect()
}

fn lookup<'a>(map: &'a [(String, String)], key: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_num<T: FromStr>(map: &[(String, String)], key: &str, option: &str) -> Result<T, ConfigError> {
    let value = lookup(map, key).ok_or_else(|| invalid(option, format!("missing {}", key)))?;
    value.parse().map_err(|_| invalid(option, value))
}

/// Builds the fully-wired application from the command line, consulting
/// the tournament file when resuming.
pub fn build(cli: Cli) -> Result<AppSetup, ConfigError> {
    let manager = EngineManager::load(&cli.enginefile)?;

    // Resolve the tournament file first: on resume it overrides the
    // command line.
    let tournament_file = cli.tournamentfile.clone().map(|mut path| {
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            let mut name = path.as_os_str().to_owned();
            name.push(".json");
            path = PathBuf::from(name);
        }
        path
    });

    let mut resume_doc: Option<TournamentFile> = None;
    if cli.resume {
        match &tournament_file {
            Some(path) if path.exists() => {
                let mut doc = TournamentFile::load(path).map_err(|e| {
                    ConfigError::Incomplete(format!("cannot resume: {}", e))
                })?;
                doc.truncate_unterminated();
                resume_doc = Some(doc);
            }
            Some(path) => {
                tracing::warn!(
                    "cannot resume a non-initialized tournament; creating {}",
                    path.display()
                );
            }
            None => {
                tracing::warn!("--resume is meant to be used with --tournamentfile, ignoring");
            }
        }
    }

    let mut settings = TournamentSettings::default();
    let mut adjudicator = Adjudicator::default();
    let mut doc = SettingsDoc::default();
    let mut concurrency = 1usize;
    let mut rating_interval = 0u32;
    let mut openings_tokens: Option<Vec<String>> = None;

    // Settings from the resume document, or from the flags.
    if let Some(resumed) = &resume_doc {
        let d = &resumed.settings;
        doc = d.clone();
        if let Some(kind) = &d.kind {
            settings.kind = kind.parse().map_err(|_| invalid("tournament", kind))?;
        }
        settings.games_per_encounter = d.games_per_encounter.unwrap_or(1);
        settings.round_multiplier = d.round_multiplier.unwrap_or(1);
        settings.swap_sides = d.swap_sides.unwrap_or(true);
        settings.opening_repetitions = d.opening_repetitions.unwrap_or(1);
        settings.strikes = d.strikes.unwrap_or(0);
        settings.seeds = d.seeds.unwrap_or(0);
        settings.berger_schedule = d.berger_schedule.unwrap_or(false);
        settings.recovery_mode = d.recovery_mode.unwrap_or(false);
        if let Some(variant) = &d.variant {
            settings.variant = variant.clone();
        }
        if let Some(name) = &d.name {
            settings.event_name = name.clone();
        }
        if let Some(site) = &d.site {
            settings.site = site.clone();
        }
        if let Some(date) = &d.event_date {
            settings.event_date = date.clone();
        }
        settings.kfactor = d.elo_kfactor.unwrap_or(32.0);
        settings.rating_interval = d.rating_interval.unwrap_or(0);
        rating_interval = settings.rating_interval;
        concurrency = d.concurrency.unwrap_or(1) as usize;
        if let Some(draw) = &d.draw_adjudication {
            adjudicator.set_draw_threshold(draw.movenumber, draw.movecount, draw.score);
        }
        if let Some(resign) = &d.resign_adjudication {
            adjudicator.set_resign_threshold(resign.movecount, resign.score);
        }
        if let Some(max_moves) = d.max_moves {
            adjudicator.set_maximum_game_length(max_moves);
        }
        if d.tb.is_some() || d.tb_draw_only.unwrap_or(false) {
            adjudicator.set_tablebase_adjudication(true, d.tb_draw_only.unwrap_or(false));
        }
        adjudicator.set_tb_ignore50(d.tb_ignore50.unwrap_or(false));
        adjudicator.set_tcec_adjudication(d.tcec_adjudication.unwrap_or(false));
        openings_tokens = d.openings.clone();
    } else {
        if let Some(kind) = &cli.tournament {
            settings.kind = kind.parse().map_err(|_| invalid("tournament", kind))?;
        }
        doc.kind = Some(settings.kind.as_str().to_string());
        if let Some(games) = cli.games {
            if games == 0 {
                return Err(invalid("games", games));
            }
            settings.games_per_encounter = games;
            doc.games_per_encounter = Some(games);
        }
        if let Some(rounds) = cli.rounds {
            if rounds == 0 {
                return Err(invalid("rounds", rounds));
            }
            if !settings.kind.can_set_round_multiplier() {
                return Err(ConfigError::Incomplete(format!(
                    "tournament {} does not support round multipliers",
                    settings.kind.as_str()
                )));
            }
            settings.round_multiplier = rounds;
            doc.round_multiplier = Some(rounds);
        }
        if let Some(repeat) = cli.repeat {
            if repeat == 0 {
                return Err(invalid("repeat", repeat));
            }
            settings.opening_repetitions = repeat;
            doc.opening_repetitions = Some(repeat);
            if settings.games_per_encounter % repeat != 0 {
                tracing::warn!(
                    "{} opening repetitions vs {} games per encounter",
                    repeat,
                    settings.games_per_encounter
                );
            }
        }
        if cli.noswap {
            settings.swap_sides = false;
            doc.swap_sides = Some(false);
        }
        if cli.recover {
            settings.recovery_mode = true;
            doc.recovery_mode = Some(true);
        }
        if let Some(strikes) = cli.strikes {
            settings.strikes = strikes;
            doc.strikes = Some(strikes);
        }
        if let Some(seeds) = cli.seeds {
            settings.seeds = seeds;
            doc.seeds = Some(seeds);
        }
        if cli.bergerschedule {
            settings.berger_schedule = true;
            doc.berger_schedule = Some(true);
        }
        if let Some(variant) = &cli.variant {
            if variant != "standard" {
                return Err(invalid("variant", variant));
            }
            settings.variant = variant.clone();
            doc.variant = Some(variant.clone());
        }
        if let Some(event) = &cli.event {
            settings.event_name = event.clone();
            doc.name = Some(event.clone());
        }
        if let Some(site) = &cli.site {
            settings.site = site.clone();
            doc.site = Some(site.clone());
        }
        if let Some(k) = cli.kfactor {
            if !(1.0..=200.0).contains(&k) {
                return Err(invalid("kfactor", k));
            }
            settings.kfactor = k;
            doc.elo_kfactor = Some(k);
        }
        if let Some(interval) = cli.ratinginterval {
            settings.rating_interval = interval;
            rating_interval = interval;
            doc.rating_interval = Some(interval);
        }
        if let Some(n) = cli.concurrency {
            if n == 0 {
                return Err(invalid("concurrency", n));
            }
            concurrency = n;
            doc.concurrency = Some(n as u32);
        }
        if let Some(tokens) = &cli.draw {
            let map = kv_map(tokens);
            let movenumber = parse_num(&map, "movenumber", "draw")?;
            let movecount = parse_num(&map, "movecount", "draw")?;
            let score = parse_num(&map, "score", "draw")?;
            adjudicator.set_draw_threshold(movenumber, movecount, score);
            doc.draw_adjudication = Some(DrawAdjudicationDoc {
                movenumber,
                movecount,
                score,
            });
        }
        if let Some(tokens) = &cli.resign {
            let map = kv_map(tokens);
            let movecount = parse_num(&map, "movecount", "resign")?;
            let score = parse_num(&map, "score", "resign")?;
            adjudicator.set_resign_threshold(movecount, score);
            doc.resign_adjudication = Some(ResignAdjudicationDoc { movecount, score });
        }
        if let Some(maxmoves) = cli.maxmoves {
            adjudicator.set_maximum_game_length(maxmoves);
            doc.max_moves = Some(maxmoves);
        }
        if cli.tb.is_some() || cli.tbdrawonly {
            adjudicator.set_tablebase_adjudication(true, cli.tbdrawonly);
            doc.tb = cli.tb.as_ref().map(|p| p.display().to_string());
            if cli.tbdrawonly {
                doc.tb_draw_only = Some(true);
            }
            // Probing is an external collaborator; without one wired in,
            // tablebase adjudication stays silent.
            tracing::warn!("no tablebase probe available, tablebase adjudication is inert");
        }
        if let Some(pieces) = cli.tbpieces {
            if pieces <= 2 {
                return Err(invalid("tbpieces", pieces));
            }
            doc.tb_pieces = Some(pieces);
        }
        if cli.tbignore50 {
            adjudicator.set_tb_ignore50(true);
            doc.tb_ignore50 = Some(true);
        }
        if cli.tcecadj {
            adjudicator.set_tcec_adjudication(true);
            doc.tcec_adjudication = Some(true);
        }
        openings_tokens = cli.openings.clone();
        if let Some(tokens) = &cli.openings {
            doc.openings = Some(tokens.clone());
        }
        if let Some(mode) = &cli.bookmode {
            if mode != "ram" && mode != "disk" {
                return Err(invalid("bookmode", mode));
            }
            doc.bookmode = Some(mode.clone());
        }
    }

    // Engine lists: verbatim from the resume document, else the flags.
    let engine_lists: Vec<Vec<String>> = match &resume_doc {
        Some(resumed) => resumed.engines.engines.clone(),
        None => cli.engine.clone(),
    };
    let each_tokens: Vec<String> = match &resume_doc {
        Some(resumed) => resumed.engines.each.clone(),
        None => cli.each.clone().unwrap_or_default(),
    };

    let mut engines: Vec<EngineData> = Vec::new();
    for tokens in &engine_lists {
        let mut data = EngineData {
            book_depth: 1000,
            ..Default::default()
        };
        parse_engine(tokens, &mut data, &manager)?;
        if !each_tokens.is_empty() {
            parse_engine(&each_tokens, &mut data, &manager)?;
        }
        if engines.iter().all(|e| e.config.name != data.config.name) {
            engines.push(data);
        }
    }

    if engines.len() < 2 {
        return Err(ConfigError::Incomplete(
            "at least two engines are needed".to_string(),
        ));
    }
    for data in &engines {
        if data.config.command.is_empty() {
            return Err(ConfigError::Incomplete(format!(
                "missing chess engine command for {}",
                if data.config.name.is_empty() {
                    "<unnamed>"
                } else {
                    &data.config.name
                }
            )));
        }
        if !data.tc.is_valid() {
            return Err(ConfigError::Incomplete(format!(
                "invalid or missing time control for {}",
                data.config.name
            )));
        }
        if data.book.is_some() {
            // Book knobs are recognized for file compatibility; no book
            // format is wired in.
            tracing::warn!(engine = %data.config.name, "opening books are not supported, ignoring");
        }
    }

    // RNG seed: resume keeps the persisted one; a missing seed gets a
    // fresh one with a warning, since random openings may then diverge.
    let srand = match &resume_doc {
        Some(resumed) => match resumed.srand {
            Some(srand) => srand,
            None => {
                tracing::warn!(
                    "missing random seed; randomly-chosen openings may not be \
                     consistent with the previous run"
                );
                fresh_seed()
            }
        },
        None => match cli.srand {
            Some(srand) => srand,
            None if tournament_file.is_some() => fresh_seed(),
            None => 0,
        },
    };

    let mut event_date = settings.event_date.clone();
    if event_date.is_empty() {
        event_date = chrono::Local::now().format("%Y.%m.%d").to_string();
        settings.event_date = event_date.clone();
    }
    doc.event_date = Some(event_date.clone());

    // Assemble the tournament.
    let roster: Vec<EngineConfig> = engines.iter().map(|e| e.config.clone()).collect();
    let tcs: Vec<TimeControl> = engines.iter().map(|e| e.tc.clone()).collect();
    let mut tournament = Tournament::new(roster, tcs, settings.clone(), adjudicator, srand);

    if let Some(tokens) = &openings_tokens {
        let map = kv_map(tokens);
        let file = lookup(&map, "file")
            .ok_or_else(|| invalid("openings", "missing file"))?
            .to_string();
        let format: SuiteFormat = lookup(&map, "format")
            .unwrap_or("pgn")
            .parse()
            .map_err(|_| invalid("openings", "format"))?;
        let order: SuiteOrder = lookup(&map, "order")
            .unwrap_or("sequential")
            .parse()
            .map_err(|_| invalid("openings", "order"))?;
        let plies: u32 = lookup(&map, "plies")
            .unwrap_or("1024")
            .parse()
            .map_err(|_| invalid("openings", "plies"))?;
        let start: usize = lookup(&map, "start")
            .unwrap_or("1")
            .parse()
            .map_err(|_| invalid("openings", "start"))?;
        if plies == 0 || start == 0 {
            return Err(invalid("openings", "plies/start must be positive"));
        }
        if order == SuiteOrder::Random {
            tracing::info!("indexing opening suite...");
        }
        let suite = OpeningSuite::load(&file, format, order, plies, start)
            .map_err(|e| ConfigError::Incomplete(e.to_string()))?;
        tournament.set_opening_suite(suite);
    }

    if let Some(sprt_doc) = resume_doc.as_ref().and_then(|d| d.settings.sprt) {
        tournament.set_sprt(SprtParams {
            elo0: sprt_doc.elo0,
            elo1: sprt_doc.elo1,
            alpha: sprt_doc.alpha,
            beta: sprt_doc.beta,
        });
    } else if let Some(tokens) = &cli.sprt {
        let map = kv_map(tokens);
        let elo0: f64 = parse_num(&map, "elo0", "sprt")?;
        let elo1: f64 = parse_num(&map, "elo1", "sprt")?;
        let alpha: f64 = parse_num(&map, "alpha", "sprt")?;
        let beta: f64 = parse_num(&map, "beta", "sprt")?;
        if !(0.0..0.5).contains(&alpha) || !(0.0..0.5).contains(&beta) || elo0 >= elo1 {
            return Err(invalid("sprt", tokens.join(" ")));
        }
        tournament.set_sprt(SprtParams {
            elo0,
            elo1,
            alpha,
            beta,
        });
        doc.sprt = Some(SprtDoc {
            elo0,
            elo1,
            alpha,
            beta,
        });
    }

    // Output artifacts.
    let mut pgn_out = None;
    if let Some(tokens) = resume_doc
        .as_ref()
        .map(|d| pgnout_tokens_from_doc(&d.settings))
        .unwrap_or_else(|| cli.pgnout.clone())
    {
        let mut mode = PgnMode::Verbose;
        let mut unfinished = true;
        for extra in &tokens[1..] {
            match extra.as_str() {
                "min" => mode = PgnMode::Minimal,
                "fi" => unfinished = false,
                other => return Err(invalid("pgnout", other)),
            }
        }
        doc.pgn_output = Some(tokens[0].clone());
        doc.pgn_out_mode = Some(mode.as_str().to_string());
        doc.pgn_out_unfinished = Some(unfinished);
        pgn_out = Some(PgnOutput::new(&tokens[0], mode, unfinished));
    }

    let epd_path = resume_doc
        .as_ref()
        .and_then(|d| d.settings.epd_output.clone().map(PathBuf::from))
        .or_else(|| cli.epdout.clone());
    let epd_out = epd_path.map(|path| {
        doc.epd_output = Some(path.display().to_string());
        EpdOutput::new(path)
    });

    let mut live_out = None;
    if let Some(tokens) = resume_doc
        .as_ref()
        .map(|d| livepgnout_tokens_from_doc(&d.settings))
        .unwrap_or_else(|| cli.livepgnout.clone())
    {
        let mut mode = PgnMode::Verbose;
        let mut pgn = true;
        let mut json = true;
        for extra in &tokens[1..] {
            match extra.as_str() {
                "min" => mode = PgnMode::Minimal,
                "nopgn" => pgn = false,
                "nojson" => json = false,
                other => return Err(invalid("livepgnout", other)),
            }
        }
        doc.live_pgn_output = Some(tokens[0].clone());
        doc.live_pgn_out_mode = Some(mode.as_str().to_string());
        doc.pgn_format = Some(pgn);
        doc.json_format = Some(json);
        live_out = Some(LiveOutput::new(&tokens[0], mode, pgn, json));
    }

    if cli.reloadconf && resume_doc.is_none() {
        doc.reload_configuration = Some(true);
    }
    if let Some(wait) = cli.wait {
        doc.start_delay = Some(wait * 1000);
    }
    let start_delay = Duration::from_millis(
        resume_doc
            .as_ref()
            .and_then(|d| d.settings.start_delay)
            .or(cli.wait.map(|w| w * 1000))
            .unwrap_or(0),
    );

    let resume_entries = resume_doc
        .as_ref()
        .map(|d| d.progress.clone())
        .unwrap_or_default();

    let file_doc = TournamentFile {
        settings: doc,
        engines: EngineSettingsDoc {
            engines: engine_lists,
            each: each_tokens,
        },
        progress: Vec::new(),
        strikes: Default::default(),
        srand: Some(srand),
    };

    let meta = OutputMeta {
        event: settings.event_name.clone(),
        site: settings.site.clone(),
        date: event_date,
    };

    Ok(AppSetup {
        tournament,
        concurrency,
        start_delay,
        timeouts: GameTimeouts::default(),
        pgn_out,
        epd_out,
        live_out,
        meta,
        tournament_file,
        file_doc,
        resume_entries,
        rating_interval,
    })
}

fn pgnout_tokens_from_doc(doc: &SettingsDoc) -> Option<Vec<String>> {
    let path = doc.pgn_output.clone()?;
    let mut tokens = vec![path];
    if doc.pgn_out_mode.as_deref() == Some("minimal") {
        tokens.push("min".to_string());
    }
    if doc.pgn_out_unfinished == Some(false) {
        tokens.push("fi".to_string());
    }
    Some(tokens)
}

fn livepgnout_tokens_from_doc(doc: &SettingsDoc) -> Option<Vec<String>> {
    let path = doc.live_pgn_output.clone()?;
    let mut tokens = vec![path];
    if doc.live_pgn_out_mode.as_deref() == Some("minimal") {
        tokens.push("min".to_string());
    }
    if doc.pgn_format == Some(false) {
        tokens.push("nopgn".to_string());
    }
    if doc.json_format == Some(false) {
        tokens.push("nojson".to_string());
    }
    Some(tokens)
}

fn fresh_seed() -> u64 {
    use rand::RngCore;
    let mut seed = 0;
    while seed == 0 {
        seed = rand::rngs::OsRng.next_u64();
    }
    seed
}
