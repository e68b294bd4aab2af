//! `halu config`: Show the effective configuration.

use halu_config::AppConfig;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let path = AppConfig::config_dir().join("config.toml");

    println!("# {}", path.display());
    println!("# env file: {}", AppConfig::env_file_path().display());
    if !config.has_api_key() {
        println!(
            "# No API key set (HALU_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY, \
             in the environment or the env file)"
        );
    }
    println!();
    println!("{}", config.redacted_toml());
    Ok(())
}

#[cfg(test)]
mod tests {
    use halu_config::AppConfig;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".halu"));
        assert!(AppConfig::env_file_path().ends_with(".halu.env"));
    }

    #[test]
    fn shown_config_hides_key() {
        let config = AppConfig {
            api_key: Some("sk-secret-123".into()),
            ..AppConfig::default()
        };
        let shown = config.redacted_toml();
        assert!(!shown.contains("sk-secret-123"));
        assert!(shown.contains("[REDACTED]"));
    }
}
