//! Settings reconciliation
//!
//! Builds the per-target payload (master values narrowed to the target's
//! writable nodes, forced overrides on top), partitions it into already
//! aligned and changed nodes, and applies the changed set with a
//! stop -> wait -> set -> start sequence.

use common::SettingsProfile;
use errors::PanelError;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::panel::{InstanceHandle, InstanceMeta, PanelApi, SettingNode, SettingSpec};
use crate::params::serialize_value;

/// Setting node -> stringified value
pub type ValueMap = BTreeMap<String, String>;

/// Comparison form of a setting value
///
/// Whitespace is trimmed and `true`/`false` compare case-insensitively; all
/// other values compare as trimmed text.
pub fn normalize_value(value: &str) -> String {
    let text = value.trim();
    let lower = text.to_lowercase();
    if lower == "true" || lower == "false" {
        lower
    } else {
        text.to_string()
    }
}

/// Values the master contributes, from its settings group
pub fn master_value_map(nodes: &[SettingNode], profile: &SettingsProfile) -> ValueMap {
    nodes
        .iter()
        .filter(|n| !n.read_only && !n.current_value.is_null())
        .filter_map(|n| {
            let node = n.node.trim();
            if node.is_empty() || profile.skip_nodes.contains(node) {
                return None;
            }
            Some((node.to_string(), serialize_value(&n.current_value)))
        })
        .collect()
}

/// Every writable node the target exposes, across all groups
pub fn writable_values(spec: &SettingSpec) -> ValueMap {
    spec.nodes()
        .filter(|n| !n.read_only)
        .filter_map(|n| {
            let node = n.node.trim();
            (!node.is_empty()).then(|| (node.to_string(), serialize_value(&n.current_value)))
        })
        .collect()
}

/// One diagnostic line per target whose application type differs from the
/// master's
pub fn application_type_mismatches(master: &InstanceMeta, targets: &[InstanceHandle]) -> Vec<String> {
    let template_type = master.application_type();
    targets
        .iter()
        .filter_map(|target| {
            let target_type = target.meta.application_type();
            (target_type != template_type).then(|| {
                format!(
                    "{} ({}): template_type={} target_type={}",
                    target.meta.friendly_name,
                    target.name(),
                    template_type,
                    target_type
                )
            })
        })
        .collect()
}

/// Per-target settings plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Nodes already holding the wanted value
    pub same: ValueMap,
    /// Nodes to update, with their wanted value
    pub diff: ValueMap,
    /// Target's current writable values
    pub current: ValueMap,
}

impl SyncPlan {
    /// Narrow `master_values` to the target's writable nodes, apply forced
    /// overrides, then partition against the current values
    pub fn build(master_values: &ValueMap, current: ValueMap, profile: &SettingsProfile) -> Self {
        let mut payload: ValueMap = master_values
            .iter()
            .filter(|(node, _)| current.contains_key(*node))
            .map(|(node, value)| (node.clone(), value.clone()))
            .collect();

        for (node, value) in &profile.forced_values {
            if current.contains_key(node) {
                payload.insert(node.clone(), value.clone());
            }
        }

        let (same, diff): (ValueMap, ValueMap) = payload.into_iter().partition(|(node, value)| {
            let existing = current.get(node).map(String::as_str).unwrap_or_default();
            normalize_value(existing) == normalize_value(value)
        });

        Self { same, diff, current }
    }

    /// Current value of `node`, `<unset>` when the target has none
    pub fn old_value(&self, node: &str) -> &str {
        self.current.get(node).map_or("<unset>", String::as_str)
    }

    pub fn needs_update(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Why a target could not be evaluated
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to get target settings spec: {0}")]
    SpecUnavailable(#[source] PanelError),

    #[error("target settings group is not a list of nodes")]
    MalformedGroup,
}

/// Load the target's settings and plan it against `master_values`
pub async fn evaluate_target<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    master_values: &ValueMap,
    profile: &SettingsProfile,
) -> Result<SyncPlan, PlanError> {
    let spec = panel
        .setting_spec(target)
        .await
        .map_err(PlanError::SpecUnavailable)?;
    // An absent group is fine: writable nodes come from every group
    if spec.is_malformed(&profile.group_key) {
        return Err(PlanError::MalformedGroup);
    }
    Ok(SyncPlan::build(master_values, writable_values(&spec), profile))
}

/// Stop-wait polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopWait {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for StopWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
        }
    }
}

/// Poll until the target reports not running
///
/// Returns `false` once `timeout` has elapsed. A failed poll counts as still
/// running for that tick.
pub async fn wait_for_stop<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    wait: StopWait,
) -> bool {
    let mut elapsed = Duration::ZERO;
    while elapsed <= wait.timeout {
        match panel.instance_status(target).await {
            Ok(status) if !status.running => return true,
            Ok(_) => {},
            Err(e) => debug!("Status poll for {} failed: {}", target.name(), e),
        }
        tokio::time::sleep(wait.interval).await;
        elapsed += wait.interval;
    }
    false
}

/// Result of applying one target's plan
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied { updated: usize },
    StopFailed(PanelError),
    StopTimeout,
    ApplyFailed(PanelError),
    StartFailed(PanelError),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied { updated } => write!(f, "updated settings count: {}", updated),
            Self::StopFailed(e) => write!(f, "stop failed: {}", e),
            Self::StopTimeout => write!(f, "timeout waiting for application to stop, skipping apply"),
            Self::ApplyFailed(e) => write!(f, "set_configs failed: {}", e),
            Self::StartFailed(e) => write!(f, "start failed: {}", e),
        }
    }
}

/// Stop (if running), wait, write the diff, start
///
/// Never force-kills: a stop that does not complete within the wait skips
/// the target.
pub async fn apply_plan<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    plan: &SyncPlan,
    wait: StopWait,
) -> ApplyOutcome {
    if target.meta.running {
        if let Err(e) = panel.stop_application(target).await {
            return ApplyOutcome::StopFailed(e);
        }
        println!("- application stopped");
        if !wait_for_stop(panel, target, wait).await {
            return ApplyOutcome::StopTimeout;
        }
        println!("- confirmed stopped");
    } else {
        println!("- application already stopped");
    }

    if let Err(e) = panel.set_configs(target, &plan.diff).await {
        return ApplyOutcome::ApplyFailed(e);
    }
    println!("- updated settings count: {}", plan.diff.len());

    if let Err(e) = panel.start_application(target).await {
        return ApplyOutcome::StartFailed(e);
    }
    println!("- application start requested");
    ApplyOutcome::Applied {
        updated: plan.diff.len(),
    }
}

/// Menu section a setting is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingBucket {
    Server,
    Gameplay,
    Multipliers,
    Structures,
    Clusters,
    Overall,
}

impl SettingBucket {
    /// Print order
    pub const ALL: [SettingBucket; 6] = [
        Self::Server,
        Self::Gameplay,
        Self::Multipliers,
        Self::Structures,
        Self::Clusters,
        Self::Overall,
    ];

    pub fn from_subcategory(subcategory: &str) -> Self {
        let lower = subcategory.to_lowercase();
        [
            ("server:", Self::Server),
            ("gameplay:", Self::Gameplay),
            ("multipliers:", Self::Multipliers),
            ("structures:", Self::Structures),
            ("clusters:", Self::Clusters),
        ]
        .into_iter()
        .find_map(|(prefix, bucket)| lower.starts_with(prefix).then_some(bucket))
        .unwrap_or(Self::Overall)
    }
}

impl fmt::Display for SettingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Non-empty buckets in print order, each sorted by (order, node)
pub fn bucket_settings(nodes: &[SettingNode]) -> Vec<(SettingBucket, Vec<&SettingNode>)> {
    SettingBucket::ALL
        .into_iter()
        .filter_map(|bucket| {
            let mut items: Vec<&SettingNode> = nodes
                .iter()
                .filter(|n| SettingBucket::from_subcategory(&n.subcategory) == bucket)
                .collect();
            if items.is_empty() {
                return None;
            }
            items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.node.cmp(&b.node)));
            Some((bucket, items))
        })
        .collect()
}
