use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use stackres_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        let mut redacted = config.clone();
        for grant in &mut redacted.auth.tokens {
            grant.token = "***".to_string();
        }
        return print_json(&redacted);
    }
    println!("service:   {} on {}:{}", config.service.name, config.service.bind, config.service.port);
    println!(
        "auth:      {}",
        if config.auth.enabled() {
            format!("{} token(s)", config.auth.tokens.len())
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "limits:    nested depth {}, {} resources per stack",
        config.limits.max_nested_depth, config.limits.max_resources_per_stack
    );
    println!("signals:   queue depth {}", config.signals.queue_depth);
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
