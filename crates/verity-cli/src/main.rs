//! `verity` – operator CLI for the Verity decision core.
//!
//! On start-up the CLI:
//! 1. Renders the Verity banner.
//! 2. Installs a Ctrl+C handler that sets a shutdown flag.
//! 3. Loads `~/.verity/config.toml`, running the first-run wizard when the
//!    file is absent.
//! 4. Builds the [`DecisionCore`] and drops into the interactive REPL.

mod config;
mod repl;
mod scenario;
mod summarizer;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{info, warn};
use verity_kernel::SafetyMode;
use verity_runtime::{CoreConfig, DecisionCore};

use crate::summarizer::ConcatSummarizer;

fn main() {
    let _otel_guard = verity_runtime::init_tracing("verity");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if flag.load(Ordering::SeqCst) {
                std::process::exit(130);
            }
            println!();
            println!("{}", "⚠  Shutdown requested – finishing the current command…".yellow().bold());
            flag.store(true, Ordering::SeqCst);
            println!("{}", "✓ Press Enter to leave the REPL.".green());
        }) {
            warn!(error = %e, "failed to install Ctrl+C handler");
        }
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "{} {}",
                "Config loaded from".dimmed(),
                config::config_path().display().to_string().dimmed()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            eprintln!("{}: {} – using defaults", "Config error".red(), e);
            CoreConfig::default()
        }
    };

    let core = match DecisionCore::with_summarizer(cfg, Box::new(ConcatSummarizer::default())) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("{}: {}", "Failed to open the knowledge store".red().bold(), e);
            std::process::exit(1);
        }
    };
    info!(indexed_documents = core.store().indexed_documents(), "knowledge store opened");

    println!("Type {} for a list of commands.", "/help".bold().cyan());
    println!();

    repl::run(repl::Session::new(core), shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    let banner = r#"
 __     __         _ _
 \ \   / /__ _ __ (_) |_ _   _
  \ \ / / _ \ '__|| | __| | | |
   \ V /  __/ |   | | |_| |_| |
    \_/ \___|_|   |_|\__|\__, |
                         |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {}  {}",
        "Verity".bold(),
        "knowledge · judgement · planning".dimmed()
    );
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// First-run wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> CoreConfig {
    println!("{}", "╔══════════════════════════════════════╗".bold());
    println!("{}", "║      Welcome to Verity – Setup       ║".bold().cyan());
    println!("{}", "╚══════════════════════════════════════╝".bold());
    println!("No configuration found. Let's create one.");
    println!();

    let mut cfg = CoreConfig::default();

    let db = prompt_line("  Ledger file (empty keeps memory in RAM)", "");
    cfg.store.db_path = if db.is_empty() { None } else { Some(db) };

    let mode = prompt_line(
        "  Safety mode for malformed rules (fail_closed / fail_open)",
        "fail_closed",
    );
    cfg.evaluator.safety_mode = SafetyMode::parse(&mode).unwrap_or_else(|| {
        println!("  {} unknown mode '{}', using fail_closed", "Warning:".yellow(), mode);
        SafetyMode::FailClosed
    });

    let budget = prompt_line(
        "  Planner expansion budget",
        &cfg.planner.max_expansions.to_string(),
    );
    match budget.parse::<usize>() {
        Ok(n) => cfg.planner.max_expansions = n,
        Err(_) => println!(
            "  {} '{}' is not a number, keeping {}",
            "Warning:".yellow(),
            budget,
            cfg.planner.max_expansions
        ),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Config saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => eprintln!("{}: {}", "Failed to save config".red(), e),
    }
    println!();
    cfg
}

/// Prompt with a default shown in brackets.  Returns `default` on Enter.
fn prompt_line(msg: &str, default: &str) -> String {
    print!("{} [{}]: ", msg, default.dimmed());
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}
