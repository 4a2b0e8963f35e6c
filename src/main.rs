use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use pgn_study::pgn::{self, MoveTree};
use pgn_study::{
    BranchSet, Event, JsonFileStore, MoveInput, MoveOutcome, MoveValidator, ShakmatyGame, Side,
    StudyConfig, StudySession, StudyState, TimerQueue,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgn-study", version, about = "Drill the lines of an annotated PGN game")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More logging (-v info, -vv debug, -vvv trace). RUST_LOG wins if set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// List the branches found in a PGN file.
    Branches {
        file: PathBuf,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the merged move tree.
    Tree { file: PathBuf },
    /// Play through the branches on the terminal.
    Drill(DrillArgs),
}

#[derive(Args)]
struct DrillArgs {
    file: PathBuf,

    /// Side the learner plays.
    #[arg(long, default_value = "white")]
    side: Side,

    /// JSON file keeping progress between runs.
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// TOML file with study settings.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed for the computer's choice of lines.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    error_threshold: Option<u32>,

    #[arg(long, value_name = "MS")]
    reply_delay: Option<u64>,

    #[arg(long, value_name = "MS")]
    next_line_delay: Option<u64>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pgn_study={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_branches(path: &Path) -> Result<BranchSet> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(pgn::parse(&text))
}

fn game_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `1. e4 e5 2. Nf3`
fn numbered(moves: &[String]) -> String {
    let mut out = String::new();
    for (ply, san) in moves.iter().enumerate() {
        if !out.is_empty() {
            out.push(' ');
        }
        if ply % 2 == 0 {
            out.push_str(&format!("{}. ", ply / 2 + 1));
        }
        out.push_str(san);
    }
    out
}

fn list_branches(file: &Path, json: bool) -> Result<()> {
    let branches = load_branches(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&branches)?);
        return Ok(());
    }

    for branch in &branches {
        println!("{:>8}  {}", branch.id, numbered(&branch.moves));
    }
    println!("{} branches", branches.len());
    Ok(())
}

fn print_tree(file: &Path) -> Result<()> {
    let branches = load_branches(file)?;
    print!("{}", MoveTree::from_branches(&branches).outline());
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::ComputerMoved { san, .. } => println!("computer plays {}", san),
        Event::BranchCompleted { branch, accuracy } => {
            println!("line {} complete, accuracy {}", branch, accuracy)
        }
        Event::SessionFinished { accuracy } => {
            println!("every line complete, accuracy {} ({})", accuracy, accuracy.grade())
        }
        Event::PersistenceFailed { reason } => eprintln!("progress not saved: {}", reason),
        Event::Scheduled { .. } | Event::Cancelled { .. } => {}
    }
}

fn print_outcome(outcome: &MoveOutcome) {
    match outcome {
        MoveOutcome::NotYourTurn => println!("not your turn"),
        MoveOutcome::Illegal => println!("illegal move"),
        MoveOutcome::Rejected { san, remaining, hint, .. } => {
            match hint {
                Some(expected) => {
                    println!("{} is not in the book, expected {}", san, expected.join(" or "))
                }
                None => println!("{} is not in the book ({} before a hint)", san, remaining),
            }
        }
        MoveOutcome::Accepted { .. } => {}
    }
}

/// Forwards events to the timer queue and sleeps through whatever the
/// session scheduled, until nothing is pending.
fn settle<V: MoveValidator>(session: &mut StudySession<V>, timers: &mut TimerQueue) -> Result<()> {
    loop {
        for event in session.drain_events() {
            timers.observe(&event);
            print_event(&event);
        }

        let wait = match timers.next_due() {
            Some(wait) => wait,
            None => return Ok(()),
        };
        thread::sleep(wait);
        for ticket in timers.advance(wait) {
            session.resume(ticket)?;
        }
    }
}

fn prompt<V: MoveValidator>(session: &StudySession<V>) -> Result<()> {
    let history = session.game().history();
    if history.is_empty() {
        print!("[start] > ");
    } else {
        print!("[{}] > ", numbered(history));
    }
    io::stdout().flush()?;
    Ok(())
}

fn drill(args: DrillArgs) -> Result<()> {
    let branches = load_branches(&args.file)?;

    let mut config = match &args.config {
        Some(path) => {
            StudyConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => StudyConfig::default(),
    };
    if let Some(threshold) = args.error_threshold {
        config.error_threshold = threshold;
    }
    if let Some(ms) = args.reply_delay {
        config.reply_delay_ms = ms;
    }
    if let Some(ms) = args.next_line_delay {
        config.next_line_delay_ms = ms;
    }
    config.validate()?;

    let mut session = StudySession::new(game_id(&args.file), branches, ShakmatyGame::new(), config);
    if let Some(path) = &args.store {
        let store =
            JsonFileStore::open(path).with_context(|| format!("opening {}", path.display()))?;
        session = session.with_store(store);
    }
    if let Some(seed) = args.seed {
        session = session.with_rng(StdRng::seed_from_u64(seed));
    }

    session.start(args.side)?;
    println!(
        "{} lines, you play {}. Moves as e2e4 or SAN; also hint, reset, restart, report, quit.",
        session.branches().len(),
        session.side()
    );

    let mut timers = TimerQueue::new();
    settle(&mut session, &mut timers)?;
    prompt(&session)?;

    for line in io::stdin().lock().lines() {
        match line?.trim() {
            "" => {}
            "quit" | "q" => break,
            "hint" => println!("expected {}", session.hint().unwrap_or_default().join(" or ")),
            "report" => {
                println!("{}", session.report());
                if let Some(stats) = session.campaign() {
                    println!(
                        "all sessions: {}/{} lines stored as complete, accuracy {}",
                        stats.completed, stats.branches, stats.accuracy
                    );
                }
            }
            "reset" => session.reset_position(false),
            "restart" => {
                session.reset_all();
                session.start(args.side)?;
            }
            input => match input.parse::<MoveInput>() {
                Ok(m) => print_outcome(&session.submit_move(&m)?),
                Err(e) => println!("{}", e),
            },
        }

        settle(&mut session, &mut timers)?;
        if session.state() == StudyState::Finished {
            break;
        }
        prompt(&session)?;
    }

    println!("{}", session.report());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Branches { file, json } => list_branches(&file, json),
        Command::Tree { file } => print_tree(&file),
        Command::Drill(args) => drill(args),
    }
}
