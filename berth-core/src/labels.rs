//! Container labels.
//!
//! Every managed container carries identifying labels; externally reachable
//! containers also carry Traefik routing labels keyed by instance name.

use crate::config::OrchestratorSettings;
use crate::types::Protocol;
use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "berth.managed-by";
pub const MANAGED_BY_VALUE: &str = "berth";
pub const SERVICE: &str = "berth.service";
pub const INSTANCE: &str = "berth.instance";

/// Port and protocol routed through the reverse proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyExposure {
    pub port: u16,
    pub protocol: Protocol,
}

/// Labels for one managed container.
///
/// `exposure` is set only for the primary container of an exposed instance.
pub fn container_labels(
    settings: &OrchestratorSettings,
    service: &str,
    instance: &str,
    exposure: Option<ProxyExposure>,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(SERVICE.to_string(), service.to_string());
    labels.insert(INSTANCE.to_string(), instance.to_string());

    if let Some(exposure) = exposure {
        labels.extend(proxy_labels(settings, instance, exposure));
    }
    labels
}

/// Label selector matching every container of one instance.
pub fn instance_selector(instance: &str) -> String {
    format!("{}={}", INSTANCE, instance)
}

/// Label selector matching every managed container.
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY, MANAGED_BY_VALUE)
}

fn proxy_labels(
    settings: &OrchestratorSettings,
    instance: &str,
    exposure: ProxyExposure,
) -> BTreeMap<String, String> {
    let host = format!("{}.{}", instance, settings.domain);
    let (kind, rule) = match exposure.protocol {
        Protocol::Http => ("http", format!("Host(`{}`)", host)),
        Protocol::Tcp => ("tcp", format!("HostSNI(`{}`)", host)),
    };

    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert(format!("traefik.{}.routers.{}.rule", kind, instance), rule);
    labels.insert(
        format!("traefik.{}.routers.{}.entrypoints", kind, instance),
        settings.proxy_entrypoint.clone(),
    );
    labels.insert(
        format!("traefik.{}.services.{}.loadbalancer.server.port", kind, instance),
        exposure.port.to_string(),
    );
    labels
}
