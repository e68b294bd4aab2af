//! `halu pricing`: Show the model pricing table.

use halu_config::AppConfig;
use halu_telemetry::PricingTable;

use crate::display::OutputMode;

pub async fn run(output: OutputMode) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let table = PricingTable::from_config(&config);

    if output.json {
        let rows: Vec<serde_json::Value> = table
            .entries()
            .into_iter()
            .map(|(model, p)| {
                serde_json::json!({
                    "model": model,
                    "input_per_m": p.input_per_m,
                    "output_per_m": p.output_per_m,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Model pricing (USD per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");

    for (model, p) in table.entries() {
        let marker = if model == config.model { " *" } else { "" };
        println!(
            "{:<40} ${:>8.3} ${:>8.3}{marker}",
            model, p.input_per_m, p.output_per_m
        );
    }

    println!();
    println!("  {} models with pricing data", table.len());
    if table.get(&config.model).is_none() {
        println!("  No price known for the configured model '{}'", config.model);
    }

    Ok(())
}
