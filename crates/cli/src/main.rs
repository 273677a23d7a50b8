use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lib::config;
use lib::llm::{Backend, LlmBackend};
use lib::{Agent, AllowList, ExecutionReport};

#[derive(Parser)]
#[command(name = "sysagent")]
#[command(about = "Ask an AI backend for shell commands and run them behind an allowlist", long_about = None)]
struct Cli {
    /// Config file path (default: SYSAGENT_CONFIG_PATH or ~/.sysagent/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Environment file loaded before config resolution (missing file is ignored)
    #[arg(long, global = true, value_name = "PATH", default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run one request and print the report as JSON.
    Ask {
        /// The request, e.g. "how much disk space is free"
        #[arg(required = true, trailing_var_arg = true)]
        request: Vec<String>,

        /// Print the parsed plan without executing any command.
        #[arg(long)]
        dry_run: bool,
    },

    /// Interactive session: type requests, `quit` or `exit` to leave.
    Chat,

    /// Print the host facts that are sent to the backend.
    Info,

    /// Check that the configured backend answers (no commands are executed).
    Check,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Environment is mutated only here, before any runtime thread exists.
    load_env(&cli.env_file);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|rt| rt.block_on(run(cli)));
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_env(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = config::load_env_file(path) {
        log::warn!("{:#}", e);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Version) => {
            println!("sysagent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Info) => run_info(),
        Some(Commands::Ask { request, dry_run }) => {
            run_ask(cli.config, request.join(" "), dry_run).await
        }
        Some(Commands::Chat) => run_chat(cli.config).await,
        Some(Commands::Check) => run_check(cli.config).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    }
}

fn build_agent(config_path: Option<PathBuf>) -> anyhow::Result<Agent<Backend>> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let resolved = config::resolve_backend(&config)?;
    log::info!("using {} backend", resolved.kind.as_str());
    Ok(Agent::new(resolved.build(), Arc::new(AllowList::builtin())))
}

fn run_info() -> anyhow::Result<()> {
    let info = lib::sysinfo::SystemInfoProbe::new().probe();
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_ask(
    config_path: Option<PathBuf>,
    request: String,
    dry_run: bool,
) -> anyhow::Result<()> {
    let agent = build_agent(config_path)?;
    println!("Processing request with {}: {}", agent.backend().name(), request);

    if dry_run {
        let parsed = agent.plan(&request).await?;
        if let Some(reason) = parsed.degradation_reason() {
            eprintln!("warning: invalid JSON response from AI: {}", reason);
        }
        println!("{}", serde_json::to_string_pretty(parsed.plan())?);
        return Ok(());
    }

    let report = agent.handle(&request).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(e) = report.backend_error {
        anyhow::bail!(e);
    }
    Ok(())
}

async fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let agent = build_agent(config_path)?;
    let parsed = agent.plan("test").await?;
    if parsed.is_degraded() {
        println!(
            "{} backend answered, but not with a valid plan; check the model",
            agent.backend().name()
        );
    } else {
        println!("{} backend is reachable", agent.backend().name());
    }
    Ok(())
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let agent = build_agent(config_path)?;
    println!("AI-Powered Command Agent ({})", agent.backend().name());
    println!("{}", "=".repeat(47));
    println!("Tell me what you want to do and I'll figure out which commands to run.");
    println!("Type 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "You: ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye");
            break;
        }

        println!("Thinking...");
        let report = agent.handle(input).await;
        print_report(&report);
        println!("\n{}\n", "-".repeat(50));
    }

    Ok(())
}

fn print_report(report: &ExecutionReport) {
    if let Some(e) = &report.backend_error {
        println!("Error: {}", e);
        return;
    }
    let plan = &report.plan;
    println!("\nThoughts: {}", plan.reasoning);
    println!("Explanation: {}", plan.explanation);
    println!("Confidence: {:.1}%", plan.confidence * 100.0);
    if let Some(e) = &report.parse_error {
        println!("Warning: {}", e);
    }

    if plan.commands.is_empty() {
        return;
    }
    println!("\nExecuting {} command(s):", plan.commands.len());
    for (i, (cmd, result)) in plan.commands.iter().zip(&report.results).enumerate() {
        println!("\n--- Command {}: {} ---", i + 1, cmd.display());
        if result.succeeded {
            println!("Success ({:.2}ms)", result.elapsed.as_secs_f64() * 1000.0);
        } else {
            println!("Failed (Exit: {})", result.exit_code);
            if let Some(e) = &result.error_message {
                println!("Error: {}", e);
            }
        }
        if !result.output.is_empty() {
            print!("Output:\n{}", result.output);
        }
    }
}
