//! nextshell - command-line front end for the agent core
//!
//! ```text
//! nextshell query "how do I find large files?"
//! nextshell exec ls -la
//! nextshell suggest "search for TODO"
//! nextshell code complete "function add(a, b) {"
//! ```

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nextshell::agent::format_command_result;
use nextshell::exec::{CommandSpec, OutputChunk};
use nextshell::logging::init_logging;
use nextshell::{AgentConfig, CodeContext, CommandExecutor, Metadata};

#[derive(Debug, Parser)]
#[command(name = "nextshell", version, about = "Terminal assistant agent core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the assistant something within the ongoing conversation
    Query(QueryArgs),

    /// Run a shell command and print its output
    Exec(ExecArgs),

    /// Keyword-based command suggestions (offline)
    Suggest {
        /// What you want to do, in plain words
        #[arg(required = true, num_args = 1..)]
        intent: Vec<String>,
    },

    /// Code suggestion, completion and explanation
    #[command(subcommand)]
    Code(CodeCommand),

    /// Show the persisted conversation
    History {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget the conversation history
    Clear,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// The question (words are joined with spaces)
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,

    /// Extra context for this turn only, as a JSON object
    #[arg(long, value_name = "JSON")]
    context: Option<String>,

    /// Print Prometheus metrics to stderr after the reply
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// Command line to run
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,

    /// Spawn the program directly instead of through the shell
    #[arg(long)]
    argv: bool,

    /// Kill the command after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Append the result to the conversation so the assistant can see it
    #[arg(long)]
    record: bool,
}

#[derive(Debug, Subcommand)]
enum CodeCommand {
    /// Up to three ranked suggestions for the input
    Suggest(CodeArgs),
    /// Complete a partial snippet
    Complete(CodeArgs),
    /// Explain a snippet
    Explain {
        /// Code to explain, or "-" to read stdin
        code: String,
    },
}

#[derive(Debug, Args)]
struct CodeArgs {
    /// Code or prompt, or "-" to read stdin
    input: String,

    /// File whose contents are sent as surrounding context
    #[arg(long, value_name = "PATH")]
    file: Option<std::path::PathBuf>,

    /// Cursor position as JSON (e.g. '{"line": 3, "column": 7}')
    #[arg(long, value_name = "JSON")]
    cursor: Option<String>,

    /// Imports in scope, comma separated
    #[arg(long, value_delimiter = ',')]
    imports: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to read .env: {e}");
        }
    }

    let cli = Cli::parse();
    let mut config = AgentConfig::from_env().context("invalid configuration")?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e))?;
    debug!(backend = ?config.backend, model = %config.conversation.model, "Configuration loaded");

    match cli.command {
        Command::Query(args) => run_query(&config, args).await,
        Command::Exec(args) => {
            if let Some(secs) = args.timeout {
                if !secs.is_finite() || secs <= 0.0 {
                    bail!("--timeout must be a positive number of seconds");
                }
                config.executor.timeout = Some(Duration::from_secs_f64(secs));
            }
            run_exec(&config, args).await
        }
        Command::Suggest { intent } => {
            for command in nextshell::agent::suggest_commands(&intent.join(" ")) {
                println!("{command}");
            }
            Ok(())
        }
        Command::Code(cmd) => run_code(&config, cmd).await,
        Command::History { json } => {
            let context = nextshell::ContextStore::new(&config.context_path).load().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&context.history)?);
            } else {
                for message in &context.history {
                    println!("[{}] {}", message.role, message.content);
                }
            }
            Ok(())
        }
        Command::Clear => {
            let manager = config.build_manager(config.build_backend()?);
            manager.initialize().await?;
            manager.clear_history().await?;
            println!("History cleared.");
            Ok(())
        }
    }
}

async fn run_query(config: &AgentConfig, args: QueryArgs) -> Result<()> {
    let overrides = match args.context.as_deref() {
        Some(raw) => parse_object(raw).context("--context must be a JSON object")?,
        None => Metadata::new(),
    };

    let manager = config.build_manager(config.build_backend()?);
    manager.initialize().await?;
    let reply = manager
        .process_query(&args.query.join(" "), &overrides)
        .await?;
    println!("{reply}");

    if args.metrics {
        eprint!("{}", nextshell::metrics::gather_text());
    }
    Ok(())
}

async fn run_exec(config: &AgentConfig, args: ExecArgs) -> Result<()> {
    let executor = CommandExecutor::new(config.executor.clone());
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            match chunk {
                OutputChunk::Stdout(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                OutputChunk::Stderr(text) => eprint!("{text}"),
            }
        }
    });

    let line = args.command.join(" ");
    let result = if args.argv {
        let spec = CommandSpec::new(&args.command[0]).args(args.command.iter().skip(1).cloned());
        debug!(program = %spec.program, "Spawning without shell");
        executor.execute_argv_with(&spec, &token, Some(tx)).await
    } else {
        executor.execute_with(&line, &token, Some(tx)).await
    };
    let _ = printer.await;
    let result = result?;

    if result.truncated {
        eprintln!("[output truncated]");
    }

    if args.record {
        let manager = config.build_manager(config.build_backend()?);
        manager.initialize().await?;
        manager.record_command_result(&result).await?;
        debug!(summary = %format_command_result(&result), "Recorded command result");
    }

    match result.exit_code {
        Some(0) => Ok(()),
        Some(code) => std::process::exit(code),
        None => bail!("command terminated by signal"),
    }
}

async fn run_code(config: &AgentConfig, cmd: CodeCommand) -> Result<()> {
    let client = config.build_code_client(config.build_backend()?);

    match cmd {
        CodeCommand::Suggest(args) => {
            let input = read_input(&args.input)?;
            let context = code_context(&args)?;
            for (rank, suggestion) in client
                .get_suggestions(&input, &context)
                .await?
                .iter()
                .enumerate()
            {
                println!("--- #{} (score {:.1}) ---", rank + 1, suggestion.score);
                println!("{}", suggestion.text);
            }
        }
        CodeCommand::Complete(args) => {
            let input = read_input(&args.input)?;
            let context = code_context(&args)?;
            println!("{}", client.complete_code(&input, &context).await?);
        }
        CodeCommand::Explain { code } => {
            let code = read_input(&code)?;
            println!("{}", client.explain_code(&code).await?);
        }
    }
    Ok(())
}

fn code_context(args: &CodeArgs) -> Result<CodeContext> {
    let file_content = match &args.file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let cursor_position = match args.cursor.as_deref() {
        Some(raw) => Some(serde_json::from_str(raw).context("--cursor must be JSON")?),
        None => None,
    };
    Ok(CodeContext {
        file_content,
        cursor_position,
        imports: args.imports.clone(),
    })
}

fn read_input(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

fn parse_object(raw: &str) -> Result<Metadata> {
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("expected an object, got {other}"),
    }
}
