//! Naming conventions for managed resources.
//!
//! Container, volume and alias names are part of the discoverability contract
//! between instances, so they are produced only by the functions here.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Attempts at `<base>-N` before falling back to a timestamp suffix.
pub const MAX_NAME_ATTEMPTS: u32 = 100;

/// Runtime name of a single-container instance: `<prefix>-<instance>`.
pub fn container_name(prefix: &str, instance: &str) -> String {
    format!("{}-{}", prefix, instance)
}

/// Runtime name of one container of a multi-container instance:
/// `<prefix>-<instance>-<container>`.
pub fn multi_container_name(prefix: &str, instance: &str, container: &str) -> String {
    format!("{}-{}-{}", prefix, instance, container)
}

/// Runtime name of an init container run.
pub fn init_container_name(prefix: &str, instance: &str, init: &str) -> String {
    format!("{}-{}-init-{}", prefix, instance, init)
}

/// Volume name: `<prefix>-<instance>-<tag>`.
pub fn volume_name(prefix: &str, instance: &str, tag: &str) -> String {
    format!("{}-{}-{}", prefix, instance, tag)
}

/// Prefix shared by every volume of an instance.
pub fn volume_prefix(prefix: &str, instance: &str) -> String {
    format!("{}-{}-", prefix, instance)
}

/// Default instance name: `<service>-<version>`.
pub fn default_instance_name(service: &str, version: &str) -> String {
    format!("{}-{}", service, version)
}

/// Instance names become parts of runtime names, so they follow the runtime's
/// rules: an alphanumeric first character, then alphanumerics, `_`, `.` or `-`.
pub fn is_valid_instance_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// First unused name among `<base>`, `<base>-2`, `<base>-3`, …
///
/// After [`MAX_NAME_ATTEMPTS`] taken suffixes the name falls back to
/// `<base>-<unix seconds>`.
pub fn unique_instance_name(base: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }

    for n in 2..(2 + MAX_NAME_ATTEMPTS) {
        let candidate = format!("{}-{}", base, n);
        if !existing.contains(&candidate) {
            return candidate;
        }
    }

    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("{}-{}", base, secs)
}

/// Network aliases of a single-container instance: `{service, instance}`.
pub fn single_container_aliases(service: &str, instance: &str) -> Vec<String> {
    dedup(vec![service.to_string(), instance.to_string()])
}

/// Network aliases of one container of a multi-container instance.
///
/// Every container gets `{<prefix>-<instance>-<container>, <service>-<container>,
/// <container>}`; the primary container also gets `{<instance>, <service>}`.
pub fn multi_container_aliases(
    prefix: &str,
    service: &str,
    instance: &str,
    container: &str,
    primary: bool,
) -> Vec<String> {
    let mut aliases = vec![
        multi_container_name(prefix, instance, container),
        format!("{}-{}", service, container),
        container.to_string(),
    ];
    if primary {
        aliases.push(instance.to_string());
        aliases.push(service.to_string());
    }
    dedup(aliases)
}

/// Volumes in `volumes` that belong to `instance`.
///
/// A volume named `<prefix>-<instance>-...` may also belong to another instance
/// whose name extends this one (`pg-14` vs `pg-14-2`); those are excluded by
/// longest-prefix match against `other_instances`.
pub fn owned_volumes<'a>(
    prefix: &str,
    instance: &str,
    volumes: &'a [String],
    other_instances: &[String],
) -> Vec<&'a String> {
    let own = volume_prefix(prefix, instance);
    let longer: Vec<String> = other_instances
        .iter()
        .filter(|other| other.as_str() != instance)
        .map(|other| volume_prefix(prefix, other))
        .filter(|p| p.len() > own.len() && p.starts_with(&own))
        .collect();

    volumes
        .iter()
        .filter(|v| v.starts_with(&own))
        .filter(|v| !longer.iter().any(|p| v.starts_with(p.as_str())))
        .collect()
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}
