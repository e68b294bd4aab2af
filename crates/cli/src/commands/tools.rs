//! `halu tools`: List the tools the agent can call.

use halu_config::AppConfig;
use halu_security::PathPolicy;

use crate::display::OutputMode;

pub async fn run(output: OutputMode) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;
    let registry = halu_tools::default_registry(PathPolicy::workspace(
        cwd,
        &config.tools.allowed_roots,
        &config.tools.forbidden_paths,
    ));
    let definitions = registry.definitions();

    if output.json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("Built-in tools");
    println!("─────────────────────────────────────");
    for def in &definitions {
        println!("  {}", def.name);
        println!("    {}", def.description);
        println!("    parameters: {}", def.parameters);
    }
    println!();
    println!(
        "  Paths are {}",
        if config.tools.workspace_only {
            "restricted to the working directory"
        } else {
            "unrestricted (forbidden paths still apply)"
        }
    );

    Ok(())
}
