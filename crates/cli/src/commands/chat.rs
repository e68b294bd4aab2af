//! `halu chat`: interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use crossterm::style::Color;
use halu_agent::AgentLoop;
use halu_config::AppConfig;
use halu_security::PathPolicy;
use halu_telemetry::PricingTable;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::display::{OutputMode, usage_line};

pub async fn run(message: Option<String>, output: OutputMode) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = halu_providers::build_provider(&config).map_err(|e| {
        format!(
            "{e}\n  Config file: {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;

    let cwd = std::env::current_dir()?;
    let tools = Arc::new(halu_tools::default_registry(path_policy(&config, cwd)));
    let pricing = PricingTable::from_config(&config);
    let mut agent = AgentLoop::from_config(&config, provider, tools);

    if let Some(msg) = message {
        // Single message mode
        let mut sink = output.sink();
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let result = agent.run(&msg, sink.as_mut(), &cancel).await;
        watcher.abort();

        let interaction = result?;
        let cost = pricing.cost(agent.model(), &interaction.usage);
        eprintln!("{}", output.paint(&usage_line("usage", &interaction.usage, cost), Color::DarkGrey));
        return Ok(());
    }

    // Interactive mode
    if !output.json {
        println!();
        println!("  Halu interactive mode");
        println!("  Provider:  {}", config.provider);
        println!("  Model:     {}", config.model);
        println!("  Workspace: {}", std::env::current_dir()?.display());
        println!();
        println!("  End a line with \\ to continue on the next one.");
        println!("  Type 'exit' or 'quit' to leave. Ctrl+C stops the current reply.");
        println!();
    }

    let mut sink = output.sink();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let history = AppConfig::history_path();

    loop {
        let Some(input) = read_input(&mut lines, !output.json).await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }
        append_history(&history, input);

        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let result = agent.run(input, sink.as_mut(), &cancel).await;
        watcher.abort();

        match result {
            Ok(interaction) => {
                let cost = pricing.cost(agent.model(), &interaction.usage);
                eprintln!(
                    "{}",
                    output.paint(&usage_line("usage", &interaction.usage, cost), Color::DarkGrey)
                );
            }
            Err(halu_core::Error::Cancelled) => {
                eprintln!();
                eprintln!("{}", output.paint("  [Cancelled]", Color::Yellow));
            }
            Err(e) => {
                eprintln!();
                eprintln!("{}", output.paint(&format!("  [Error] {e}"), Color::Red));
            }
        }
        println!();
    }

    let session = agent.session_usage();
    let cost = pricing.cost(agent.model(), &session);
    eprintln!("{}", output.paint(&usage_line("session", &session, cost), Color::DarkGrey));

    Ok(())
}

/// Build the tools' path policy from `[tools]`, rooted at `cwd`.
fn path_policy(config: &AppConfig, cwd: std::path::PathBuf) -> PathPolicy {
    let tools = &config.tools;
    if tools.workspace_only {
        PathPolicy::workspace(cwd, &tools.allowed_roots, &tools.forbidden_paths)
    } else {
        PathPolicy::unrestricted(cwd, &tools.forbidden_paths)
    }
}

/// Cancel `token` on the next Ctrl-C. Abort the handle once the
/// interaction is over.
fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling interaction");
            token.cancel();
        }
    })
}

/// Read one prompt, following `\` continuations. `None` at end of input or
/// on Ctrl-C while waiting.
async fn read_input<R>(
    lines: &mut tokio::io::Lines<R>,
    show_prompt: bool,
) -> Result<Option<String>, Box<dyn std::error::Error>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut buffer = String::new();
    let mut prompt = "  You > ";
    loop {
        if show_prompt {
            print!("{prompt}");
            std::io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        };

        if push_line(&mut buffer, &line) {
            return Ok(Some(buffer));
        }
        prompt = "  ... ";
    }
}

/// Add `line` to `buffer`. Returns `false` while the input continues.
fn push_line(buffer: &mut String, line: &str) -> bool {
    match line.strip_suffix('\\') {
        Some(head) => {
            buffer.push_str(head);
            buffer.push('\n');
            false
        }
        None => {
            buffer.push_str(line);
            true
        }
    }
}

/// Best-effort prompt history; failures are only logged.
fn append_history(path: &std::path::Path, input: &str) {
    let entry = input.replace('\n', "\\n");
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{entry}"));
    if let Err(e) = result {
        debug!(path = %path.display(), error = %e, "Could not write history");
    }
}
