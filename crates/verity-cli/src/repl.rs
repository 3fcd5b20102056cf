//! REPL – Read-Eval-Print Loop for the Verity operator shell.
//!
//! Supported slash-commands:
//!   /fact <s> <p> <o> [--entity] [--multi] – ingest a fact
//!   /state [rfc3339]                       – world snapshot summary
//!   /search <query…>                       – hybrid search
//!   /tags <tag…>                           – `is_a` closure
//!   /event <kind> [json]                   – queue a transient event
//!   /sleep                                 – consolidate memory
//!   /load <scenario.toml>                  – load agent, goal, skills, principles
//!   /judge <action> [tag…]                 – price an action
//!   /plan                                  – plan for the loaded scenario
//!   /audit                                 – judgement history
//!   /schema                                – JSON Schemas of the wire formats
//!   /help                                  – show this list
//!   /quit | /exit                          – gracefully exit the CLI

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::Value;
use tracing::debug;
use verity_memory::FactInput;
use verity_runtime::{DecisionCore, extract_state, state_map};
use verity_types::{FactObject, JudgementContext, Principle, Skill, TagHierarchy};

use crate::scenario::Scenario;

const SEARCH_LIMIT: usize = 5;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fact {
        subject: String,
        predicate: String,
        object: String,
        entity: bool,
        multi: bool,
    },
    State(Option<DateTime<Utc>>),
    Search(String),
    Tags(Vec<String>),
    Event { kind: String, payload: Value },
    Sleep,
    Load(String),
    Judge { action: String, tags: Vec<String> },
    Plan,
    Audit,
    Schema,
    Help,
    Quit,
}

/// Parse one input line.  `Err` carries a usage message.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let words: Vec<&str> = rest.split_whitespace().collect();

    match head {
        "/fact" => parse_fact(&words),
        "/state" => match words.as_slice() {
            [] => Ok(Command::State(None)),
            [at] => DateTime::parse_from_rfc3339(at)
                .map(|t| Command::State(Some(t.with_timezone(&Utc))))
                .map_err(|e| format!("'{at}' is not an RFC 3339 timestamp: {e}")),
            _ => Err("usage: /state [rfc3339]".into()),
        },
        "/search" if !rest.is_empty() => Ok(Command::Search(rest.to_string())),
        "/search" => Err("usage: /search <query…>".into()),
        "/tags" if !words.is_empty() => Ok(Command::Tags(owned(&words))),
        "/tags" => Err("usage: /tags <tag…>".into()),
        "/event" => {
            let (kind, payload) = match rest.split_once(char::is_whitespace) {
                Some((kind, json)) => (kind, json.trim()),
                None => (rest, ""),
            };
            if kind.is_empty() {
                return Err("usage: /event <kind> [json]".into());
            }
            let payload = if payload.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(payload).map_err(|e| format!("invalid JSON payload: {e}"))?
            };
            Ok(Command::Event {
                kind: kind.to_string(),
                payload,
            })
        }
        "/sleep" => Ok(Command::Sleep),
        "/load" if !rest.is_empty() => Ok(Command::Load(rest.to_string())),
        "/load" => Err("usage: /load <scenario.toml>".into()),
        "/judge" => match words.split_first() {
            Some((action, tags)) => Ok(Command::Judge {
                action: action.to_string(),
                tags: owned(tags),
            }),
            None => Err("usage: /judge <action> [tag…]".into()),
        },
        "/plan" => Ok(Command::Plan),
        "/audit" => Ok(Command::Audit),
        "/schema" => Ok(Command::Schema),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: '{other}'. Type /help for available commands.")),
    }
}

/// The object is everything after the predicate, so literals may contain
/// spaces.  Flags may appear anywhere.
fn parse_fact(words: &[&str]) -> Result<Command, String> {
    let mut entity = false;
    let mut multi = false;
    let mut positional = Vec::new();
    for word in words {
        match *word {
            "--entity" => entity = true,
            "--multi" => multi = true,
            other => positional.push(other),
        }
    }
    match positional.as_slice() {
        [subject, predicate, object @ ..] if !object.is_empty() => Ok(Command::Fact {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.join(" "),
            entity,
            multi,
        }),
        _ => Err("usage: /fact <subject> <predicate> <object> [--entity] [--multi]".into()),
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// REPL state: the decision core plus the scenario loaded by `/load`.
pub struct Session {
    core: DecisionCore,
    scenario: Option<Scenario>,
}

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl Session {
    pub fn new(core: DecisionCore) -> Self {
        Self {
            core,
            scenario: None,
        }
    }

    pub fn core(&self) -> &DecisionCore {
        &self.core
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    /// Run one command, printing its output.
    pub fn execute(&mut self, command: Command) -> Result<Flow, String> {
        debug!(?command, "repl command");
        match command {
            Command::Fact {
                subject,
                predicate,
                object,
                entity,
                multi,
            } => self.cmd_fact(subject, predicate, object, entity, multi)?,
            Command::State(at) => self.cmd_state(at)?,
            Command::Search(query) => self.cmd_search(&query)?,
            Command::Tags(tags) => self.cmd_tags(&tags),
            Command::Event { kind, payload } => {
                let event = self.core.store().push_event(kind, payload);
                println!("{} {} ({})", "✓ Queued event".green(), event.kind.bold(), event.id);
            }
            Command::Sleep => self.cmd_sleep()?,
            Command::Load(path) => self.cmd_load(Path::new(&path))?,
            Command::Judge { action, tags } => self.cmd_judge(action, tags)?,
            Command::Plan => self.cmd_plan()?,
            Command::Audit => self.cmd_audit(),
            Command::Schema => cmd_schema()?,
            Command::Help => cmd_help(),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn cmd_fact(
        &self,
        subject: String,
        predicate: String,
        object: String,
        entity: bool,
        multi: bool,
    ) -> Result<(), String> {
        let object = if entity {
            FactObject::entity(object)
        } else {
            FactObject::literal(object)
        };
        let fact = self
            .core
            .store()
            .ingest_fact(FactInput::new(subject, predicate, object).allow_multiple(multi))
            .map_err(|e| e.to_string())?;
        println!(
            "{} ({}, {}, {}) {}",
            "✓ Fact".green(),
            fact.subject_id.to_string().bold(),
            fact.predicate,
            fact.object.to_string().yellow(),
            fact.id.to_string().dimmed()
        );
        Ok(())
    }

    fn cmd_state(&self, at: Option<DateTime<Utc>>) -> Result<(), String> {
        let world = self.core.store().get_world_state(at).map_err(|e| e.to_string())?;
        println!(
            "{} {} (tick {})",
            "World state at".bold().underline(),
            world.snapshot_time.to_rfc3339(),
            world.tick
        );
        println!(
            "  entities: {}  facts: {}  events: {}",
            world.entities.len().to_string().yellow(),
            world.facts.len().to_string().yellow(),
            world.event_queue.len().to_string().yellow()
        );
        for fact in &world.facts {
            println!(
                "    {} {} {}  {}",
                fact.subject_id.to_string().bold(),
                fact.predicate.cyan(),
                fact.object,
                format!("conf {:.2}", fact.confidence).dimmed()
            );
        }
        for event in &world.event_queue {
            println!("    {} {} {}", "event".magenta(), event.kind.bold(), event.payload);
        }
        Ok(())
    }

    fn cmd_search(&self, query: &str) -> Result<(), String> {
        let hits = self
            .core
            .store()
            .hybrid_search(query, SEARCH_LIMIT)
            .map_err(|e| e.to_string())?;
        if hits.is_empty() {
            println!("  {}", "no matches".dimmed());
        }
        for (rank, fact) in hits.iter().enumerate() {
            println!("  {}. {}", rank + 1, fact.document_text());
        }
        Ok(())
    }

    fn cmd_tags(&self, tags: &[String]) {
        let closure = self.core.store().get_all_parent_tags(tags);
        println!("  {}", closure.join(" → "));
    }

    fn cmd_sleep(&self) -> Result<(), String> {
        let report = self.core.store().run_sleep_cycle().map_err(|e| e.to_string())?;
        println!(
            "{} folded {} subject(s), archived {} fact(s), pruned {} document(s)",
            "✓ Sleep cycle:".green(),
            report.consolidation.subjects_folded,
            report.consolidation.facts_archived,
            report.pruned_documents
        );
        for summary in &report.consolidation.summaries {
            println!("    {} {}", summary.subject_id.to_string().bold(), summary.object);
        }
        Ok(())
    }

    fn cmd_load(&mut self, path: &Path) -> Result<(), String> {
        let scenario = Scenario::load(path)?;
        self.core.skills_mut().extend(scenario.skills.iter().cloned());
        println!(
            "{} agent {} with {} skill(s), {} principle(s); goal: {}",
            "✓ Loaded".green(),
            scenario.agent.id.bold(),
            scenario.skills.len(),
            scenario.agent.principles.len(),
            scenario.goal.description.yellow()
        );
        self.scenario = Some(scenario);
        Ok(())
    }

    fn cmd_judge(&self, action: String, tags: Vec<String>) -> Result<(), String> {
        let scenario = self.loaded()?;
        let world = self.core.store().get_world_state(None).map_err(|e| e.to_string())?;
        let state = extract_state(&scenario.agent.id, &world);
        let context = JudgementContext::new(scenario.agent.id.clone(), action)
            .with_tags(tags)
            .with_world_state(state_map(&state));
        let hierarchy: &dyn TagHierarchy = &**self.core.store();

        match self
            .core
            .evaluator()
            .judge(context, &scenario.agent.principles, Some(hierarchy))
        {
            Ok(result) => {
                println!("{} total cost {}", "✓ Allowed:".green(), result.total_cost);
                for c in &result.breakdown {
                    println!("    {} ({}) {}", c.principle_id.bold(), c.affects.dimmed(), c.cost);
                }
            }
            Err(violation) => println!("{} {}", "✗ Vetoed:".red().bold(), violation),
        }
        Ok(())
    }

    fn cmd_plan(&self) -> Result<(), String> {
        let scenario = self.loaded()?;
        let plan = self
            .core
            .plan_for(&scenario.agent, &scenario.goal)
            .map_err(|e| e.to_string())?;
        if plan.is_empty() {
            println!(
                "{} no plan reaches '{}'",
                "✗".red().bold(),
                scenario.goal.description
            );
            return Ok(());
        }
        println!(
            "{} {} step(s), total cost {}, risk {}",
            "✓ Plan:".green(),
            plan.steps.len(),
            plan.total_cost,
            plan.risk_score
        );
        for (i, step) in plan.steps.iter().enumerate() {
            println!(
                "  {}. {} {}",
                i + 1,
                step.skill_id.bold().cyan(),
                format!("(cost {})", step.cost).dimmed()
            );
            if let Some(rationale) = &step.rationale {
                println!("       {}", rationale.dimmed());
            }
        }
        Ok(())
    }

    fn cmd_audit(&self) {
        let history = self.core.evaluator().history();
        if history.is_empty() {
            println!("  {}", "no judgements recorded".dimmed());
        }
        for record in &history {
            let verdict = if record.veto {
                format!("VETO by {}", record.vetoed_by.as_deref().unwrap_or("?")).red()
            } else {
                format!("cost {}", record.total_cost).green()
            };
            println!(
                "  {} {} {} {}",
                record.timestamp.format("%H:%M:%S").to_string().dimmed(),
                record.agent_id.bold(),
                record.action_id,
                verdict
            );
        }
    }

    fn loaded(&self) -> Result<&Scenario, String> {
        self.scenario()
            .ok_or_else(|| "no scenario loaded; use /load <scenario.toml>".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(mut session: Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "verity>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line).and_then(|cmd| session.execute(cmd)) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => println!("{} {}", "Error:".red(), msg),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stateless commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Verity Commands".bold().underline());
    let rows = [
        ("/fact <s> <p> <o> [--entity] [--multi]", "ingest a fact"),
        ("/state [rfc3339]", "world snapshot"),
        ("/search <query…>", "hybrid search"),
        ("/tags <tag…>", "is_a closure"),
        ("/event <kind> [json]", "queue a transient event"),
        ("/sleep", "consolidate memory"),
        ("/load <scenario.toml>", "load agent, goal, skills, principles"),
        ("/judge <action> [tag…]", "price an action"),
        ("/plan", "plan for the loaded scenario"),
        ("/audit", "judgement history"),
        ("/schema", "JSON Schemas of the wire formats"),
        ("/quit  /exit", "exit the CLI"),
    ];
    for (cmd, what) in rows {
        println!("  {:<42} – {}", cmd.bold().cyan(), what);
    }
    println!();
}

fn cmd_schema() -> Result<(), String> {
    let schemas = [
        ("Skill", schemars::schema_for!(Skill)),
        ("Principle", schemars::schema_for!(Principle)),
        ("JudgementContext", schemars::schema_for!(JudgementContext)),
    ];
    for (name, schema) in schemas {
        let pretty = serde_json::to_string_pretty(&schema).map_err(|e| e.to_string())?;
        println!("{}", name.bold().underline());
        println!("{pretty}");
    }
    Ok(())
}
