//! `berth start|stop|restart|rm` commands

use super::colorize_status;
use crate::context::Context;
use anyhow::Result;
use berth_core::{Instance, RemoveOptions};
use colored::Colorize;

fn print_status(verb: &str, instance: &Instance) {
    println!("{} {}: {}", verb, instance.name, colorize_status(&instance.status.to_string()));
}

pub async fn start(ctx: &Context, name: &str) -> Result<()> {
    let instance = ctx.orchestrator().await?.start(name).await?;
    print_status("Started", &instance);
    Ok(())
}

pub async fn stop(ctx: &Context, name: &str) -> Result<()> {
    let instance = ctx.orchestrator().await?.stop(name).await?;
    print_status("Stopped", &instance);
    Ok(())
}

pub async fn restart(ctx: &Context, name: &str) -> Result<()> {
    let instance = ctx.orchestrator().await?.restart(name).await?;
    print_status("Restarted", &instance);
    Ok(())
}

/// Remove an instance, reporting what was cleaned up and what was skipped.
pub async fn rm(ctx: &Context, name: &str, keep_volumes: bool) -> Result<()> {
    let report = ctx.orchestrator().await?.remove(name, RemoveOptions { keep_volumes }).await?;

    println!(
        "Removed {} ({} container(s), {} volume(s))",
        report.instance,
        report.removed_containers,
        report.removed_volumes.len()
    );
    if keep_volumes {
        println!("Volumes kept; reinstall with the same name to reuse them.");
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    Ok(())
}
