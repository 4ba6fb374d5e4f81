//! `dialectic config`: Configuration management commands.

use dialectic_config::WorkerConfig;

pub fn show(config: &WorkerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

/// Loading already validated the file; report what it resolved to.
pub fn validate(config: &WorkerConfig) {
    let path = config_path();
    if path.exists() {
        println!("Config file valid: {}", path.display());
    } else {
        println!("No config file at {}, using defaults", path.display());
    }
    println!(
        "  rationality_threshold = {}",
        config.rationality_threshold
    );
    println!("  max_continuations     = {}", config.max_continuations);
    println!("  history_tail_len      = {}", config.history_tail_len);
    println!("  log_format            = {:?}", config.log_format);
}

fn config_path() -> std::path::PathBuf {
    WorkerConfig::config_dir().join("worker.toml")
}
