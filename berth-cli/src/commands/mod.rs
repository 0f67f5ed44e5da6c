//! CLI command implementations

pub mod catalog;
pub mod install;
pub mod lifecycle;
pub mod ps;

use crate::context::Context;
use berth_core::types::Protocol;
use berth_core::Instance;
use colored::Colorize;

/// Colorize status string based on value
pub(crate) fn colorize_status(status: &str) -> String {
    match status {
        "running" => status.green().to_string(),
        "stopped" => status.red().to_string(),
        "failed" => status.red().bold().to_string(),
        "created" => status.yellow().to_string(),
        _ => status.to_string(),
    }
}

/// Proxy address of an exposed instance, per its catalog protocol.
pub(crate) fn endpoint(ctx: &Context, instance: &Instance) -> Option<String> {
    let protocol = ctx
        .catalog
        .resolve(&instance.service, Some(instance.version.as_str()))
        .map(|(_, spec)| spec.protocol)
        .unwrap_or_default();
    format_endpoint(instance, protocol, &ctx.config.domain)
}

fn format_endpoint(instance: &Instance, protocol: Protocol, domain: &str) -> Option<String> {
    let port = instance.port.filter(|_| instance.exposed)?;
    Some(match protocol {
        Protocol::Http => format!("http://{}.{}", instance.name, domain),
        Protocol::Tcp => format!("{}.{}:{}", instance.name, domain, port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::InstanceStatus;
    use std::time::SystemTime;

    fn instance(name: &str, port: Option<u16>, exposed: bool) -> Instance {
        Instance {
            name: name.to_string(),
            service: "svc".to_string(),
            version: "1".to_string(),
            status: InstanceStatus::Running,
            container_id: Some("abc".to_string()),
            containers: Vec::new(),
            port,
            exposed,
            dependency: false,
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_endpoint_per_protocol() {
        let web = instance("grafana-11", Some(3000), true);
        assert_eq!(
            format_endpoint(&web, Protocol::Http, "localhost").as_deref(),
            Some("http://grafana-11.localhost")
        );

        let db = instance("postgres-16", Some(5432), true);
        assert_eq!(
            format_endpoint(&db, Protocol::Tcp, "localhost").as_deref(),
            Some("postgres-16.localhost:5432")
        );
    }

    #[test]
    fn test_no_endpoint_when_internal() {
        assert!(format_endpoint(&instance("pg", Some(5432), false), Protocol::Tcp, "localhost").is_none());
        assert!(format_endpoint(&instance("job", None, true), Protocol::Http, "localhost").is_none());
    }
}
