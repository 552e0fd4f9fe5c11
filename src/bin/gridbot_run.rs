//! gridbot runner
//!
//! Builds a world from a JSON document, runs a primitive-call program against it, plays
//! the queue back and prints one JSON line per trace event followed by the goal verdict.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use gridbot::{
    logging, Action, ActionEngine, Direction, FailureReason, GoalReport, GridConfig, GridError,
    GridResult, Player, PrimitiveCall, ShadowSynchronizer, TraceEvent, WorldBuilder, WorldDocument,
};

/// Runner configuration
#[derive(Default)]
struct Args {
    /// World document (JSON)
    world: Option<PathBuf>,
    /// Program: a JSON call list, or `name()` calls separated by newlines or `;`
    program: Option<PathBuf>,
    /// Optional TOML configuration
    config: Option<PathBuf>,
    seed: Option<u64>,
    paced: bool,
    verbose: bool,
}

fn usage() {
    println!("gridbot-run - run a robot program against a world document");
    println!();
    println!("USAGE:");
    println!("    gridbot-run --world <FILE> --program <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -w, --world <FILE>        World document (JSON)");
    println!("    -p, --program <FILE>      Program (JSON call list or name() lines)");
    println!("    -c, --config <FILE>       Configuration (TOML)");
    println!("    -s, --seed <N>            Seed for random object counts");
    println!("        --paced               Honour think() delays during playback");
    println!("    -v, --verbose             Log every executed step");
    println!("    -h, --help                Print help information");
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    args.get(i + 1).cloned().unwrap_or_else(|| {
        eprintln!("error: {flag} requires a value");
        std::process::exit(1);
    })
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--world" | "-w" => {
                parsed.world = Some(PathBuf::from(value_of(&args, i, "--world")));
                i += 2;
            }
            "--program" | "-p" => {
                parsed.program = Some(PathBuf::from(value_of(&args, i, "--program")));
                i += 2;
            }
            "--config" | "-c" => {
                parsed.config = Some(PathBuf::from(value_of(&args, i, "--config")));
                i += 2;
            }
            "--seed" | "-s" => {
                let raw = value_of(&args, i, "--seed");
                let seed = raw.parse::<u64>().unwrap_or_else(|_| {
                    eprintln!("error: invalid seed: {raw}");
                    std::process::exit(1);
                });
                parsed.seed = Some(seed);
                i += 2;
            }
            "--paced" => {
                parsed.paced = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    if parsed.world.is_none() || parsed.program.is_none() {
        eprintln!("error: --world and --program are required (see --help)");
        std::process::exit(1);
    }
    parsed
}

/// One line of the printed event log.
#[derive(Serialize)]
struct EventLine<'a> {
    step: u64,
    action: &'a Action,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
    x: i32,
    y: i32,
    dir: Direction,
}

impl<'a> From<&'a TraceEvent> for EventLine<'a> {
    fn from(event: &'a TraceEvent) -> Self {
        let robot = &event.resulting_world().robot;
        Self {
            step: event.step,
            action: &event.action,
            ok: event.ok,
            reason: event.reason,
            x: robot.x,
            y: robot.y,
            dir: robot.dir,
        }
    }
}

#[derive(Serialize)]
struct Verdict {
    steps: u64,
    failures: u64,
    goal_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    goal: Option<GoalReport>,
}

fn load_program(path: &Path) -> GridResult<Vec<PrimitiveCall>> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| GridError::host(format!("read {}: {e}", path.display())))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        return serde_json::from_str(&source)
            .map_err(|e| GridError::host(format!("program {}: {e}", path.display())));
    }
    PrimitiveCall::parse_program(&source)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(err) => log::error!("failed to encode output line: {err}"),
    }
}

fn run(args: &Args) -> GridResult<Verdict> {
    let mut config = match &args.config {
        Some(path) => GridConfig::from_path(path)?,
        None => GridConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let world_path = args.world.as_deref().unwrap_or(Path::new("world.json"));
    let program_path = args.program.as_deref().unwrap_or(Path::new("program.txt"));

    let doc = WorldDocument::from_path(world_path)?;
    let outcome = WorldBuilder::new(config.clone())?.build(&doc)?;
    let mut calls = load_program(program_path)?;

    let mut engine = ActionEngine::with_config(outcome.world, &config);
    engine
        .subscribe(|event| print_json(&EventLine::from(event)))
        .detach();

    let mut shadow = ShadowSynchronizer::new();
    if args.paced {
        let mut player = Player::new(engine);
        let report = player.run_program(&mut shadow, &mut calls)?;
        log::info!("program queued {} action(s)", report.issued);
        player.start()?;
        let summary = player
            .wait()?
            .ok_or_else(|| GridError::internal("playback did not run"))?;
        return Ok(Verdict {
            steps: summary.steps,
            failures: summary.failures,
            goal_met: summary.goal_met.unwrap_or(false),
            goal: summary.goal,
        });
    }

    let report = gridbot::run_program(&mut engine, &mut shadow, &mut calls)?;
    log::info!("program queued {} action(s)", report.issued);
    let mut failures = 0;
    while let Some(event) = engine.step() {
        if !event.ok {
            failures += 1;
        }
    }
    Ok(Verdict {
        steps: engine.step_count(),
        failures,
        goal_met: engine.goal_met(),
        goal: engine.goal_report(),
    })
}

fn main() -> ExitCode {
    let args = parse_args();
    logging::init(args.verbose);

    match run(&args) {
        Ok(verdict) => {
            print_json(&verdict);
            if verdict.goal_met {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
