//! Interactive answers to install conflicts.

use berth_core::{ConflictResolver, DataDecision, ExistingData, Instance};
use inquire::{Confirm, Select};

const REUSE: &str = "Reuse existing data";
const DELETE: &str = "Delete it and start fresh";
const CANCEL: &str = "Cancel installation";

/// Asks on the terminal unless a flag already decided.
///
/// A prompt that cannot be shown (no TTY, Ctrl-C) counts as "no" for replace
/// and as cancel for existing data.
pub struct PromptResolver {
    /// Answer yes to every question
    pub assume_yes: bool,
    /// Preset answer from `--reuse-data` / `--delete-data`
    pub data: Option<DataDecision>,
}

impl ConflictResolver for PromptResolver {
    fn confirm_replace(&self, existing: &Instance) -> bool {
        if self.assume_yes {
            return true;
        }

        Confirm::new(&format!(
            "Instance '{}' ({} {}) already exists. Replace it?",
            existing.name, existing.service, existing.version
        ))
        .with_default(false)
        .with_help_message("Volumes are kept; only the containers are recreated")
        .prompt()
        .unwrap_or(false)
    }

    fn existing_data(&self, data: &ExistingData) -> DataDecision {
        if let Some(decision) = self.data {
            return decision;
        }
        if self.assume_yes {
            return DataDecision::Reuse;
        }

        println!("\nFound data from a previous '{}' instance:", data.instance);
        for volume in &data.volumes {
            println!("  - volume {}", volume);
        }
        if data.environment.is_some() {
            println!("  - saved environment");
        }
        println!();

        match Select::new("What should happen to it?", vec![REUSE, DELETE, CANCEL]).prompt() {
            Ok(REUSE) => DataDecision::Reuse,
            Ok(DELETE) => DataDecision::Delete,
            _ => DataDecision::Cancel,
        }
    }
}
