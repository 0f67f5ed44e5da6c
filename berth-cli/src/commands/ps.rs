//! `berth ps` and `berth status` commands

use super::{colorize_status, endpoint};
use crate::context::Context;
use anyhow::Result;
use berth_core::Instance;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "CONTAINERS")]
    containers: usize,
    #[tabled(rename = "ENDPOINT")]
    url: String,
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "CONTAINER")]
    name: String,
    #[tabled(rename = "RUNTIME NAME")]
    full_name: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

fn url(ctx: &Context, instance: &Instance) -> String {
    endpoint(ctx, instance).unwrap_or_else(|| "-".to_string())
}

/// List all instances, refreshing their status from the runtime first.
pub async fn ps(ctx: &Context) -> Result<()> {
    let instances = ctx.orchestrator().await?.refresh_all().await?;

    if instances.is_empty() {
        println!("No instances installed");
        return Ok(());
    }

    let rows: Vec<InstanceRow> = instances
        .iter()
        .map(|instance| InstanceRow {
            name: if instance.dependency {
                format!("{} (dep)", instance.name)
            } else {
                instance.name.clone()
            },
            service: instance.service.clone(),
            version: instance.version.clone(),
            status: colorize_status(&instance.status.to_string()),
            containers: instance.containers.len().max(1),
            url: url(ctx, instance),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);

    Ok(())
}

/// Show one instance and, for multi-container instances, each container.
pub async fn status(ctx: &Context, name: &str) -> Result<()> {
    let instance = ctx.orchestrator().await?.status(name).await?;

    println!("Name:     {}", instance.name);
    println!("Service:  {} {}", instance.service, instance.version);
    println!("Status:   {}", colorize_status(&instance.status.to_string()));
    if let Some(port) = instance.port {
        println!("Port:     {}", port);
    }
    println!("Endpoint: {}", url(ctx, &instance));
    if instance.dependency {
        println!("Installed as a dependency");
    }

    if let Some(id) = &instance.container_id {
        println!("Container: {}", id);
        return Ok(());
    }

    let rows: Vec<ContainerRow> = instance
        .containers
        .iter()
        .map(|c| ContainerRow {
            name: if c.primary { format!("{} *", c.name) } else { c.name.clone() },
            full_name: c.full_name.clone(),
            image: c.image.clone(),
            status: colorize_status(&c.status.to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{}", table);

    Ok(())
}
