//! `berth install` command

use super::{colorize_status, endpoint};
use crate::context::Context;
use crate::prompt::PromptResolver;
use anyhow::{anyhow, Result};
use berth_core::types::ResourceLimits;
use berth_core::{DataDecision, InstallOptions, InstallOutcome};
use colored::Colorize;

pub struct InstallArgs {
    pub service: String,
    pub version: Option<String>,
    pub name: Option<String>,
    pub env: Vec<String>,
    pub memory: Option<u64>,
    pub cpus: Option<f64>,
    pub replace: bool,
    pub new_instance: bool,
    pub no_deps: bool,
    pub reuse_data: bool,
    pub delete_data: bool,
    pub yes: bool,
}

/// Install a service and print where it can be reached.
pub async fn install(ctx: &Context, args: InstallArgs) -> Result<()> {
    let mut options = InstallOptions::new(&args.service)
        .resources(ResourceLimits { memory_mb: args.memory, cpus: args.cpus });
    if let Some(version) = &args.version {
        options = options.version(version);
    }
    if let Some(name) = &args.name {
        options = options.name(name);
    }
    for pair in &args.env {
        let (key, value) = parse_env(pair)?;
        options = options.env(key, value);
    }
    if args.replace {
        options = options.replace();
    }
    if args.new_instance {
        options = options.new_instance();
    }
    if args.no_deps {
        options = options.skip_dependencies();
    }

    let data = if args.reuse_data {
        Some(DataDecision::Reuse)
    } else if args.delete_data {
        Some(DataDecision::Delete)
    } else {
        None
    };
    let resolver = PromptResolver { assume_yes: args.yes, data };

    let orchestrator = ctx.orchestrator().await?;
    println!("Installing {}...", args.service.bold());

    let instance = match orchestrator.install(options, &resolver).await? {
        InstallOutcome::Installed(instance) => instance,
        InstallOutcome::Cancelled => {
            println!("Installation cancelled.");
            return Ok(());
        }
    };

    println!(
        "{} {} ({} {})",
        "Installed".green().bold(),
        instance.name,
        instance.service,
        instance.version
    );
    for container in &instance.containers {
        println!("  {} {}", container.full_name, colorize_status(&container.status.to_string()));
    }
    if let Some(address) = endpoint(ctx, &instance) {
        println!("  {}", address);
    }

    Ok(())
}

/// Split a `KEY=VALUE` argument.
fn parse_env(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(anyhow!("Invalid env format: {} (expected KEY=VALUE)", pair)),
    }
}
