//! Interactive command-line interface.
//!
//! Wires the runtime context together once at startup — config, stores,
//! rule engine, error memory, tool registry, LLM backend — and owns the
//! stdin confirmation prompt.  All orchestration logic lives in the library
//! crates; this binary only routes.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reagent_config::AppConfig;
use reagent_exec::{confirmation_channel, ConfirmationDecision, ConfirmationReceiver};
use reagent_llm::HttpBackend;
use reagent_memory::{RuleEngine, TriggerKind};
use reagent_runtime::Reasoner;
use reagent_tools::{
    ListDirTool, ReadFileTool, RunShellTool, ToolRegistry, WebSearchTool, WriteFileTool,
};

#[derive(Debug, Parser)]
#[command(name = "reagent", version, about = "An autonomous tool-using agent")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "reagent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single task and print the result.
    Run {
        /// The task, in natural language.
        task: Vec<String>,
    },
    /// Interactive task loop (default).
    Repl,
    /// Manage deterministic rules.
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// Validate the configuration and data directories.
    Doctor,
}

#[derive(Debug, Subcommand)]
enum RuleCommands {
    /// Add a rule: respond with RESPONSE whenever the input matches TRIGGER.
    Add {
        trigger: String,
        response: String,
        #[arg(long, default_value = "contains")]
        kind: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// List all rules.
    List,
    /// Remove a rule by id.
    Remove { rule_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    config.validate().map_err(|err| anyhow::anyhow!("{err}"))?;

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Run { task } => {
            let task = task.join(" ");
            if task.trim().is_empty() {
                bail!("empty task — pass the task as arguments");
            }
            let (mut reasoner, confirm_rx) = build_reasoner(config)?;
            spawn_confirmation_prompt(confirm_rx);
            println!("{}", reasoner.run(&task).await);
        }
        Commands::Repl => {
            let (mut reasoner, confirm_rx) = build_reasoner(config)?;
            spawn_confirmation_prompt(confirm_rx);
            repl(&mut reasoner).await?;
        }
        Commands::Rules { command } => {
            let rules = RuleEngine::open(&config.memory.data_dir);
            run_rule_command(&rules, command)?;
        }
        Commands::Doctor => {
            doctor(&config)?;
        }
    }

    Ok(())
}

fn build_reasoner(config: AppConfig) -> Result<(Reasoner, ConfirmationReceiver)> {
    let api_key = config.api_key();
    if api_key.is_none() {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "no API key found — LLM calls will be rejected by the provider"
        );
    }
    let backend = HttpBackend::new(
        config.llm.base_url.clone(),
        api_key,
        config.llm.model.clone(),
        config.llm.api_timeout_seconds,
    )
    .map_err(|err| anyhow::anyhow!("{err}"))?;

    let workdir = PathBuf::from(&config.agent.working_directory);
    let registry = default_registry(&workdir);

    let (confirm_tx, confirm_rx) = confirmation_channel();
    let reasoner = Reasoner::open(config, Arc::new(backend), registry, Some(confirm_tx))?;
    Ok((reasoner, confirm_rx))
}

fn default_registry(workdir: &std::path::Path) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(Box::new(ReadFileTool { workspace_root: workdir.to_path_buf() }));
    registry.register(Box::new(WriteFileTool { workspace_root: workdir.to_path_buf() }));
    registry.register(Box::new(ListDirTool { workspace_root: workdir.to_path_buf() }));
    registry.register(Box::new(RunShellTool { workspace_root: workdir.to_path_buf() }));
    registry.register(Box::new(WebSearchTool::new()));
    registry
}

/// Answer confirmation requests on stdin.  Runs for the lifetime of the
/// session; an unanswered prompt is denied by the executor's timeout.
fn spawn_confirmation_prompt(mut rx: ConfirmationReceiver) {
    tokio::spawn(async move {
        while let Some((request, reply)) = rx.recv().await {
            let warnings = if request.warnings.is_empty() {
                String::new()
            } else {
                format!("\n  warnings: {}", request.warnings.join("; "))
            };
            let answer = tokio::task::spawn_blocking(move || {
                print!(
                    "\n[confirm] {}{}\n  proceed? [y/N] ",
                    request.risk_summary, warnings
                );
                let _ = io::stdout().flush();
                let mut line = String::new();
                let _ = io::stdin().lock().read_line(&mut line);
                line.trim().eq_ignore_ascii_case("y")
            })
            .await
            .unwrap_or(false);

            let decision = if answer {
                ConfirmationDecision::Approve
            } else {
                ConfirmationDecision::Deny
            };
            let _ = reply.send(decision);
        }
    });
}

async fn repl(reasoner: &mut Reasoner) -> Result<()> {
    println!("reagent — type a task, or 'exit' to quit");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|read| (read, line))
        })
        .await??;

        let (read, line) = line;
        if read == 0 {
            break;
        }
        let task = line.trim();
        if task.is_empty() {
            continue;
        }
        if task == "exit" || task == "quit" {
            break;
        }

        let answer = reasoner.run(task).await;
        println!("{answer}\n");
    }
    Ok(())
}

fn run_rule_command(rules: &RuleEngine, command: RuleCommands) -> Result<()> {
    match command {
        RuleCommands::Add { trigger, response, kind, priority } => {
            let kind = match kind.as_str() {
                "exact" => TriggerKind::Exact,
                "contains" => TriggerKind::Contains,
                "regex" => TriggerKind::Regex,
                other => bail!("unknown trigger kind '{other}' (exact|contains|regex)"),
            };
            let rule_id = rules
                .add(trigger, kind, response, priority)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            println!("added rule {rule_id}");
        }
        RuleCommands::List => {
            let all = rules.all();
            if all.is_empty() {
                println!("no rules");
            }
            for rule in all {
                println!(
                    "{}  [{:?} p{}] \"{}\" -> \"{}\"",
                    rule.id, rule.trigger_kind, rule.priority, rule.trigger, rule.response
                );
            }
        }
        RuleCommands::Remove { rule_id } => {
            if rules.remove(&rule_id) {
                println!("removed {rule_id}");
            } else {
                bail!("no rule with id {rule_id}");
            }
        }
    }
    Ok(())
}

fn doctor(config: &AppConfig) -> Result<()> {
    println!("config: ok");
    println!("working_directory: {}", config.agent.working_directory);
    println!("model: {} @ {}", config.llm.model, config.llm.base_url);
    println!(
        "api key ({}): {}",
        config.llm.api_key_env,
        if config.api_key().is_some() { "present" } else { "MISSING" }
    );
    for dir in [&config.memory.data_dir, &config.memory.error_log_dir] {
        let exists = std::path::Path::new(dir).exists();
        println!("{dir}: {}", if exists { "present" } else { "will be created" });
    }
    Ok(())
}
