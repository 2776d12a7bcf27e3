//! Canonical shapes for panel data
//!
//! The panel's JSON is loose: PascalCase keys, task collections that arrive
//! either as a list or as an id-keyed object, enabled flags as bools or
//! numbers, ids as strings or numbers. Everything is normalised here, at the
//! boundary, so the reconcilers only ever see one typed shape.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::params::{serialize_value, ParameterMapping};

// ============================================================================
// Loose scalar helpers
// ============================================================================

fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(serialize_value(&JsonValue::deserialize(deserializer)?))
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(truthy(&JsonValue::deserialize(deserializer)?))
}

fn loose_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(as_i64(&JsonValue::deserialize(deserializer)?).unwrap_or_default())
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "enabled" | "1" | "yes"
        ),
        _ => false,
    }
}

/// Integer view of a JSON scalar (numbers, or strings holding a number)
pub(crate) fn as_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Items of a collection that may be a list or an id-keyed object
fn collection_items(value: JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Instances
// ============================================================================

/// Application state codes reported by the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationState {
    #[default]
    Undefined,
    Stopped,
    PreStart,
    Configuring,
    Starting,
    Ready,
    Restarting,
    Stopping,
    PreparingForSleep,
    Sleeping,
    Waiting,
    Installing,
    Updating,
    AwaitingUserInput,
    Failed,
    Suspended,
    Maintenance,
    Indeterminate,
}

impl ApplicationState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Stopped,
            5 => Self::PreStart,
            7 => Self::Configuring,
            10 => Self::Starting,
            20 => Self::Ready,
            30 => Self::Restarting,
            40 => Self::Stopping,
            45 => Self::PreparingForSleep,
            50 => Self::Sleeping,
            60 => Self::Waiting,
            70 => Self::Installing,
            75 => Self::Updating,
            80 => Self::AwaitingUserInput,
            100 => Self::Failed,
            200 => Self::Suspended,
            250 => Self::Maintenance,
            999 => Self::Indeterminate,
            _ => Self::Undefined,
        }
    }

    /// Whether the application process is still up
    pub fn is_running(self) -> bool {
        !matches!(
            self,
            Self::Undefined | Self::Stopped | Self::Sleeping | Self::Failed | Self::Suspended
        )
    }
}

impl<'de> Deserialize<'de> for ApplicationState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(as_i64(&value).map_or(Self::Undefined, Self::from_code))
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Instance summary as listed by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceMeta {
    #[serde(rename = "InstanceID", alias = "InstanceId", deserialize_with = "loose_string")]
    pub instance_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub instance_name: String,
    #[serde(deserialize_with = "loose_string")]
    pub friendly_name: String,
    #[serde(deserialize_with = "loose_string")]
    pub module: String,
    #[serde(deserialize_with = "loose_bool")]
    pub running: bool,
    pub app_state: ApplicationState,
    #[serde(deserialize_with = "loose_string")]
    pub display_image_source: String,
}

impl InstanceMeta {
    /// Panel-management (controller) instances are never sync sources or targets
    pub fn is_management(&self) -> bool {
        self.module == "ADS" || self.instance_name.starts_with("ADS")
    }

    /// Declared game application: image source, falling back to module
    pub fn application_type(&self) -> String {
        let image = self.display_image_source.trim();
        if image.is_empty() {
            self.module.trim().to_string()
        } else {
            image.to_string()
        }
    }

    /// `friendly (name)` label used in reports
    pub fn label(&self) -> String {
        format!("{} ({})", self.friendly_name, self.instance_name)
    }
}

/// A loaded instance, ready for per-instance API calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceHandle {
    pub meta: InstanceMeta,
    /// Session id for calls proxied to this instance
    pub session_id: String,
}

impl InstanceHandle {
    pub fn id(&self) -> &str {
        &self.meta.instance_id
    }

    pub fn name(&self) -> &str {
        &self.meta.instance_name
    }
}

/// Per-instance running flag from the controller's status list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceStatusEntry {
    #[serde(rename = "InstanceID", alias = "InstanceId", deserialize_with = "loose_string")]
    pub instance_id: String,
    #[serde(deserialize_with = "loose_bool")]
    pub running: bool,
}

/// Running flag of one instance's application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStatus {
    pub running: bool,
}

/// Application (or controller) status with the headline metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationStatus {
    pub state: ApplicationState,
    pub uptime: String,
    pub active_users: Option<i64>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RawApplicationStatus {
    state: ApplicationState,
    #[serde(deserialize_with = "loose_string")]
    uptime: String,
    metrics: Map<String, JsonValue>,
}

impl<'de> Deserialize<'de> for ApplicationStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawApplicationStatus::deserialize(deserializer)?;
        let metric = |name: &str, field: &str| raw.metrics.get(name).and_then(|m| m.get(field)).cloned();
        Ok(Self {
            state: raw.state,
            uptime: raw.uptime,
            active_users: metric("Active Users", "RawValue").as_ref().and_then(as_i64),
            cpu_percent: metric("CPU Usage", "Percent").and_then(|v| v.as_f64()),
            memory_percent: metric("Memory Usage", "Percent").and_then(|v| v.as_f64()),
        })
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Trigger flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerKind {
    /// Fires on a months/days/hours/minutes/day-of-month match
    Interval,
    /// Bound to a predefined panel event
    #[default]
    Event,
}

impl TriggerKind {
    fn from_type_name(name: &str) -> Self {
        if name.to_lowercase().contains("interval") {
            Self::Interval
        } else {
            Self::Event
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval => write!(f, "interval"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// One task attached to a trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Task {
    #[serde(deserialize_with = "loose_string")]
    pub id: String,
    #[serde(rename = "TaskMethodName", alias = "MethodID", deserialize_with = "loose_string")]
    pub method_id: String,
    #[serde(deserialize_with = "loose_i64")]
    pub order: i64,
    #[serde(deserialize_with = "parameter_mapping")]
    pub parameter_mapping: ParameterMapping,
}

fn parameter_mapping<'de, D>(deserializer: D) -> Result<ParameterMapping, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Object(map) => map
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), serialize_value(v)))
            .collect(),
        _ => ParameterMapping::new(),
    })
}

/// A scheduled trigger with its tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTrigger")]
pub struct Trigger {
    pub id: String,
    pub description: String,
    pub enabled: bool,
    pub kind: TriggerKind,
    pub tasks: Vec<Task>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RawTrigger {
    #[serde(deserialize_with = "loose_string")]
    id: String,
    #[serde(deserialize_with = "loose_string")]
    description: String,
    #[serde(alias = "Enabled", deserialize_with = "loose_bool")]
    enabled_state: bool,
    #[serde(rename = "Type", alias = "TriggerType", deserialize_with = "loose_string")]
    kind: String,
    tasks: JsonValue,
}

impl From<RawTrigger> for Trigger {
    fn from(raw: RawTrigger) -> Self {
        let tasks = collection_items(raw.tasks)
            .into_iter()
            .filter_map(|t| serde_json::from_value(t).ok())
            .collect();
        Self {
            id: raw.id,
            description: raw.description,
            enabled: raw.enabled_state,
            kind: TriggerKind::from_type_name(&raw.kind),
            tasks,
        }
    }
}

impl Trigger {
    pub fn is_interval(&self) -> bool {
        self.kind == TriggerKind::Interval
    }

    /// `description (id=.. type=..)` label used in reports
    pub fn summary(&self) -> String {
        format!("{} (id={} type={})", self.description, self.id, self.kind)
    }
}

/// A method a target can run from a task, with the parameters it consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawMethod")]
pub struct MethodInfo {
    pub id: String,
    pub consumes: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RawMethod {
    #[serde(deserialize_with = "loose_string")]
    id: String,
    consumes: JsonValue,
}

impl From<RawMethod> for MethodInfo {
    fn from(raw: RawMethod) -> Self {
        let consumes = collection_items(raw.consumes)
            .iter()
            .map(|c| c.get("Name").map(serialize_value).unwrap_or_default())
            .collect();
        Self {
            id: raw.id,
            consumes,
        }
    }
}

/// Schedule state of one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ScheduleData {
    /// Trigger definitions that can still be instantiated
    pub available_triggers: Vec<Trigger>,
    /// Triggers currently instantiated on the instance
    pub populated_triggers: Vec<Trigger>,
    pub available_methods: Vec<MethodInfo>,
}

/// Full match fields of an interval trigger
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimeIntervalTrigger {
    pub match_months: Vec<JsonValue>,
    pub match_days: Vec<JsonValue>,
    pub match_hours: Vec<JsonValue>,
    pub match_minutes: Vec<JsonValue>,
    pub match_days_of_month: Vec<JsonValue>,
    pub description: Option<String>,
}

/// Payload for the raw add-interval-trigger call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSpec {
    pub months: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub days_of_month: i64,
    pub description: String,
}

// ============================================================================
// Settings
// ============================================================================

/// One configuration node from a settings spec
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SettingNode {
    #[serde(deserialize_with = "loose_string")]
    pub node: String,
    #[serde(deserialize_with = "loose_string")]
    pub name: String,
    pub current_value: JsonValue,
    #[serde(deserialize_with = "loose_bool")]
    pub read_only: bool,
    #[serde(deserialize_with = "loose_string")]
    pub subcategory: String,
    #[serde(deserialize_with = "loose_i64")]
    pub order: i64,
    #[serde(deserialize_with = "loose_bool")]
    pub requires_restart: bool,
}

/// Settings spec grouped by application-settings group key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingSpec {
    pub groups: BTreeMap<String, Vec<SettingNode>>,
    /// Keys whose value was present but not a list of nodes
    pub malformed: BTreeSet<String>,
}

impl SettingSpec {
    pub fn group(&self, key: &str) -> Option<&[SettingNode]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn is_malformed(&self, key: &str) -> bool {
        self.malformed.contains(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SettingNode> {
        self.groups.values().flatten()
    }
}

impl<'de> Deserialize<'de> for SettingSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, JsonValue>::deserialize(deserializer)?;
        let mut spec = Self::default();
        for (key, value) in raw {
            match value {
                JsonValue::Array(items) => {
                    let nodes = items
                        .into_iter()
                        .filter(JsonValue::is_object)
                        .filter_map(|item| serde_json::from_value(item).ok())
                        .collect();
                    spec.groups.insert(key, nodes);
                },
                _ => {
                    spec.malformed.insert(key);
                },
            }
        }
        Ok(spec)
    }
}
