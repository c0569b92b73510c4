//! Persisting planners, action lists and worlds.
//!
//! Everything goes through a nested `serde_yaml::Value` mapping first, so
//! callers can embed a snapshot in a larger document or store it on disk
//! as YAML. An action list uses the same shape as the `actions:` section
//! of the configuration.
//!
//! ```
//! use goap_agent::{snapshot, ActionList, Planner};
//!
//! let mut actions = ActionList::new();
//! actions.add_condition("rest", [("tired", true)]);
//! actions.add_reaction("rest", [("tired", false)]);
//!
//! let mut planner = Planner::with_actions(actions);
//! planner.set_start_state([("tired", true)].into_iter().collect());
//! planner.set_goal_state([("tired", false)].into_iter().collect());
//!
//! let mapping = snapshot::to_mapping(&planner).unwrap();
//! let restored: Planner = snapshot::from_mapping(mapping).unwrap();
//! assert_eq!(restored, planner);
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Converts a value into its nested mapping form.
pub fn to_mapping<T: Serialize>(value: &T) -> Result<serde_yaml::Value> {
    Ok(serde_yaml::to_value(value)?)
}

/// Rebuilds a value from its nested mapping form.
pub fn from_mapping<T: DeserializeOwned>(mapping: serde_yaml::Value) -> Result<T> {
    Ok(serde_yaml::from_value(mapping)?)
}

/// Writes `value` to `path` as a YAML document.
pub fn save<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = serde_yaml::to_string(value)?;
    fs::write(path, text)?;
    log::debug!("Saved snapshot to {}", path.display());
    Ok(())
}

pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}
