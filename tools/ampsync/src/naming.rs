//! Template and destination-group naming conventions
//!
//! The template instance carries `-TEMPLATE <GROUP>-` in its friendly name
//! (any case); destinations carry `-<GROUP>-`.

use regex::Regex;
use std::sync::OnceLock;

use crate::panel::InstanceMeta;

fn template_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)-\s*template\s+([^-]+?)\s*-").ok())
        .as_ref()
}

/// Group tag from a template friendly name, trimmed
pub fn extract_template_group(friendly_name: &str) -> Option<String> {
    let captures = template_pattern()?.captures(friendly_name)?;
    let group = captures.get(1)?.as_str().trim();
    if group.is_empty() {
        None
    } else {
        Some(group.to_string())
    }
}

/// Whether `friendly_name` carries the `-<group>-` destination marker
pub fn has_destination_group(friendly_name: &str, group: &str) -> bool {
    friendly_name
        .to_lowercase()
        .contains(&format!("-{}-", group.to_lowercase()))
}

/// Pick the master template among `instances`
///
/// Management instances are ignored. When several instances look like
/// templates, the one with the lowest instance name wins.
pub fn find_master_template(instances: &[InstanceMeta]) -> (Option<&InstanceMeta>, Option<String>) {
    let selected = instances
        .iter()
        .filter(|i| !i.is_management())
        .filter(|i| extract_template_group(&i.friendly_name).is_some())
        .min_by(|a, b| a.instance_name.cmp(&b.instance_name));

    match selected {
        Some(instance) => (Some(instance), extract_template_group(&instance.friendly_name)),
        None => (None, None),
    }
}
