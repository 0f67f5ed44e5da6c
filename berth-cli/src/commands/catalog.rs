//! `berth catalog` and `berth plan` commands

use crate::context::Context;
use anyhow::{anyhow, Result};
use berth_core::types::ServiceCategory;
use berth_core::{DependencyResolver, StateManager};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "SERVICE")]
    name: String,
    #[tabled(rename = "CATEGORY")]
    category: String,
    #[tabled(rename = "VERSIONS")]
    versions: String,
    #[tabled(rename = "DESCRIPTION")]
    description: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "REQUIRED")]
    required: String,
    #[tabled(rename = "ACTION")]
    action: String,
}

/// List catalog services, optionally of one category.
pub fn list(ctx: &Context, category: Option<&str>) -> Result<()> {
    let services = match category {
        Some(name) => {
            let category = ServiceCategory::parse(name)
                .ok_or_else(|| anyhow!("Unknown category: {}", name))?;
            ctx.catalog.by_category(category)
        }
        None => ctx.catalog.services().collect(),
    };

    if services.is_empty() {
        println!("No services found");
        return Ok(());
    }

    let rows: Vec<ServiceRow> = services
        .into_iter()
        .map(|service| ServiceRow {
            name: service.name.clone(),
            category: service.category.to_string(),
            versions: service.versions.keys().cloned().collect::<Vec<_>>().join(", "),
            description: service.description.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);

    Ok(())
}

/// Print the dependency plan for `service` against the installed instances.
pub async fn plan(ctx: &Context, service: &str, version: Option<&str>) -> Result<()> {
    let state = StateManager::new(ctx.config.db_path()).await?;
    let plan = DependencyResolver::new(&ctx.catalog).resolve(&state, service, version).await?;

    let rows: Vec<PlanRow> = plan
        .entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let action = if entry.service == plan.root {
                "install".green().to_string()
            } else if entry.is_installed {
                "installed".to_string()
            } else if entry.required {
                "install (dependency)".yellow().to_string()
            } else {
                "skip (optional)".dimmed().to_string()
            };
            PlanRow {
                step: idx + 1,
                service: entry.service.clone(),
                version: entry.version.clone(),
                required: if entry.required { "yes" } else { "no" }.to_string(),
                action,
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);

    let missing = plan.missing_dependencies().len();
    if missing > 0 {
        println!("{} dependency(ies) will be installed first", missing);
    }

    Ok(())
}
