//! In-memory panel for integration tests
//!
//! Holds per-instance schedules, interval details and settings specs, applies
//! mutating calls to that state and records every one of them in order.

#![allow(dead_code)]

use ampsync::panel::{
    ApplicationState, ApplicationStatus, InstanceHandle, InstanceMeta, InstanceStatus,
    InstanceStatusEntry, IntervalSpec, PanelApi, ScheduleData, SettingNode, SettingSpec, Task,
    TimeIntervalTrigger, Trigger, TriggerKind,
};
use ampsync::params::ParameterMapping;
use async_trait::async_trait;
use errors::{PanelError, PanelResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A mutating call as the panel received it
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DeleteTrigger { instance: String, trigger: String },
    DeleteTask { instance: String, trigger: String, task: String },
    AddEventTrigger { instance: String, source: String },
    AddIntervalTrigger { instance: String, spec: IntervalSpec },
    AddTask {
        instance: String,
        trigger: String,
        method: String,
        mapping: ParameterMapping,
    },
    SetTriggerEnabled { instance: String, trigger: String, enabled: bool },
    SetConfigs { instance: String, values: BTreeMap<String, String> },
    Stop { instance: String },
    Start { instance: String },
}

impl Call {
    pub fn instance(&self) -> &str {
        match self {
            Self::DeleteTrigger { instance, .. }
            | Self::DeleteTask { instance, .. }
            | Self::AddEventTrigger { instance, .. }
            | Self::AddIntervalTrigger { instance, .. }
            | Self::AddTask { instance, .. }
            | Self::SetTriggerEnabled { instance, .. }
            | Self::SetConfigs { instance, .. }
            | Self::Stop { instance }
            | Self::Start { instance } => instance,
        }
    }
}

#[derive(Default)]
struct MockState {
    schedules: HashMap<String, ScheduleData>,
    intervals: HashMap<(String, String), TimeIntervalTrigger>,
    specs: HashMap<String, SettingSpec>,
    running: HashMap<String, bool>,
    /// Instances whose application never stops
    stuck: HashSet<String>,
    /// Instances whose load fails
    unloadable: HashSet<String>,
    /// Instances whose schedule read fails
    unreadable_schedules: HashSet<String>,
    /// Method ids `add_task` rejects
    rejected_methods: HashSet<String>,
    /// Trigger descriptions (prefix) whose create call fails
    rejected_creates: HashSet<String>,
    /// Trigger descriptions (prefix) whose create call succeeds but never
    /// shows up in the schedule
    dropped_creates: HashSet<String>,
    /// Tasks the panel pre-populates when an event trigger is instantiated
    event_defaults: HashMap<String, Vec<Task>>,
    next_id: u32,
    calls: Vec<Call>,
}

impl MockState {
    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn matches_any(set: &HashSet<String>, description: &str) -> bool {
        set.iter().any(|prefix| description.starts_with(prefix.as_str()))
    }

    fn populated(&mut self, instance: &str, trigger_id: &str) -> Option<&mut Trigger> {
        self.schedules
            .get_mut(instance)?
            .populated_triggers
            .iter_mut()
            .find(|t| t.id == trigger_id)
    }
}

#[derive(Default)]
pub struct MockPanel {
    instances: Vec<InstanceMeta>,
    state: Mutex<MockState>,
}

#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
impl MockPanel {
    pub fn new(instances: Vec<InstanceMeta>) -> Self {
        let running = instances
            .iter()
            .map(|i| (i.instance_id.clone(), i.running))
            .collect();
        Self {
            instances,
            state: Mutex::new(MockState {
                running,
                ..Default::default()
            }),
        }
    }

    pub fn add_instance(&mut self, meta: InstanceMeta) {
        self.state()
            .running
            .insert(meta.instance_id.clone(), meta.running);
        self.instances.push(meta);
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_schedule(&self, instance: &str, schedule: ScheduleData) {
        self.state().schedules.insert(instance.to_string(), schedule);
    }

    pub fn set_interval(&self, instance: &str, trigger: &str, details: TimeIntervalTrigger) {
        self.state()
            .intervals
            .insert((instance.to_string(), trigger.to_string()), details);
    }

    pub fn set_spec(&self, instance: &str, spec: SettingSpec) {
        self.state().specs.insert(instance.to_string(), spec);
    }

    pub fn set_stuck(&self, instance: &str) {
        self.state().stuck.insert(instance.to_string());
    }

    pub fn set_unloadable(&self, instance: &str) {
        self.state().unloadable.insert(instance.to_string());
    }

    pub fn set_schedule_unreadable(&self, instance: &str) {
        self.state().unreadable_schedules.insert(instance.to_string());
    }

    pub fn reject_method(&self, method: &str) {
        self.state().rejected_methods.insert(method.to_string());
    }

    pub fn reject_create(&self, description: &str) {
        self.state().rejected_creates.insert(description.to_string());
    }

    pub fn drop_create(&self, description: &str) {
        self.state().dropped_creates.insert(description.to_string());
    }

    pub fn set_event_defaults(&self, source: &str, tasks: Vec<Task>) {
        self.state().event_defaults.insert(source.to_string(), tasks);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn calls_for(&self, instance: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.instance() == instance)
            .collect()
    }

    pub fn schedule_of(&self, instance: &str) -> ScheduleData {
        self.state().schedules.get(instance).cloned().unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

#[async_trait]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
impl PanelApi for MockPanel {
    async fn list_instances(&self) -> PanelResult<Vec<InstanceMeta>> {
        Ok(self.instances.clone())
    }

    async fn get_instance(&self, meta: &InstanceMeta) -> PanelResult<InstanceHandle> {
        if self.state().unloadable.contains(&meta.instance_id) {
            return Err(PanelError::not_found(format!("instance {}", meta.instance_id)));
        }
        let meta = self
            .instances
            .iter()
            .find(|i| i.instance_id == meta.instance_id)
            .cloned()
            .ok_or_else(|| PanelError::not_found(format!("instance {}", meta.instance_id)))?;
        Ok(InstanceHandle {
            session_id: format!("session-{}", meta.instance_id),
            meta,
        })
    }

    async fn controller_status(&self) -> PanelResult<ApplicationStatus> {
        Ok(ApplicationStatus {
            state: ApplicationState::Ready,
            uptime: "1.02:03:04".to_string(),
            active_users: Some(1),
            ..Default::default()
        })
    }

    async fn instance_statuses(&self) -> PanelResult<Vec<InstanceStatusEntry>> {
        let state = self.state();
        Ok(self
            .instances
            .iter()
            .map(|i| InstanceStatusEntry {
                instance_id: i.instance_id.clone(),
                running: state.running.get(&i.instance_id).copied().unwrap_or(false),
            })
            .collect())
    }

    async fn schedule(&self, target: &InstanceHandle) -> PanelResult<ScheduleData> {
        if self.state().unreadable_schedules.contains(target.id()) {
            return Err(PanelError::action_failed("schedule unavailable"));
        }
        Ok(self.schedule_of(target.id()))
    }

    async fn delete_trigger(&self, target: &InstanceHandle, trigger_id: &str) -> PanelResult<()> {
        self.record(Call::DeleteTrigger {
            instance: target.id().to_string(),
            trigger: trigger_id.to_string(),
        });
        let mut state = self.state();
        let schedule = state.schedules.entry(target.id().to_string()).or_default();
        let before = schedule.populated_triggers.len();
        schedule.populated_triggers.retain(|t| t.id != trigger_id);
        if schedule.populated_triggers.len() == before {
            return Err(PanelError::action_failed("no such trigger"));
        }
        Ok(())
    }

    async fn delete_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        task_id: &str,
    ) -> PanelResult<()> {
        self.record(Call::DeleteTask {
            instance: target.id().to_string(),
            trigger: trigger_id.to_string(),
            task: task_id.to_string(),
        });
        let mut state = self.state();
        let trigger = state
            .populated(target.id(), trigger_id)
            .ok_or_else(|| PanelError::action_failed("no such trigger"))?;
        trigger.tasks.retain(|t| t.id != task_id);
        Ok(())
    }

    async fn add_event_trigger(
        &self,
        target: &InstanceHandle,
        source_trigger_id: &str,
    ) -> PanelResult<()> {
        self.record(Call::AddEventTrigger {
            instance: target.id().to_string(),
            source: source_trigger_id.to_string(),
        });
        let mut state = self.state();
        let source = state
            .schedules
            .get(target.id())
            .and_then(|s| s.available_triggers.iter().find(|t| t.id == source_trigger_id))
            .cloned()
            .ok_or_else(|| PanelError::action_failed("unknown event trigger"))?;
        if MockState::matches_any(&state.rejected_creates, &source.description) {
            return Err(PanelError::action_failed("trigger rejected"));
        }
        if MockState::matches_any(&state.dropped_creates, &source.description) {
            return Ok(());
        }
        let id = state.new_id("event");
        let tasks = state
            .event_defaults
            .get(source_trigger_id)
            .cloned()
            .unwrap_or_default();
        state
            .schedules
            .entry(target.id().to_string())
            .or_default()
            .populated_triggers
            .push(Trigger {
                id,
                description: source.description,
                enabled: true,
                kind: TriggerKind::Event,
                tasks,
            });
        Ok(())
    }

    async fn add_interval_trigger(
        &self,
        target: &InstanceHandle,
        spec: &IntervalSpec,
    ) -> PanelResult<()> {
        self.record(Call::AddIntervalTrigger {
            instance: target.id().to_string(),
            spec: spec.clone(),
        });
        let mut state = self.state();
        if MockState::matches_any(&state.rejected_creates, &spec.description) {
            return Err(PanelError::action_failed("trigger rejected"));
        }
        if MockState::matches_any(&state.dropped_creates, &spec.description) {
            return Ok(());
        }
        let id = state.new_id("interval");
        state
            .schedules
            .entry(target.id().to_string())
            .or_default()
            .populated_triggers
            .push(Trigger {
                id,
                description: spec.description.clone(),
                enabled: true,
                kind: TriggerKind::Interval,
                tasks: Vec::new(),
            });
        Ok(())
    }

    async fn interval_trigger(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
    ) -> PanelResult<TimeIntervalTrigger> {
        self.state()
            .intervals
            .get(&(target.id().to_string(), trigger_id.to_string()))
            .cloned()
            .ok_or_else(|| PanelError::not_found(format!("interval trigger {}", trigger_id)))
    }

    async fn add_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        method_id: &str,
        mapping: &ParameterMapping,
    ) -> PanelResult<()> {
        self.record(Call::AddTask {
            instance: target.id().to_string(),
            trigger: trigger_id.to_string(),
            method: method_id.to_string(),
            mapping: mapping.clone(),
        });
        let mut state = self.state();
        if state.rejected_methods.contains(method_id) {
            return Err(PanelError::action_failed("method rejected"));
        }
        let id = state.new_id("task");
        let trigger = state
            .populated(target.id(), trigger_id)
            .ok_or_else(|| PanelError::action_failed("no such trigger"))?;
        let order = trigger.tasks.len() as i64;
        trigger.tasks.push(Task {
            id,
            method_id: method_id.to_string(),
            order,
            parameter_mapping: mapping.clone(),
        });
        Ok(())
    }

    async fn set_trigger_enabled(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        enabled: bool,
    ) -> PanelResult<()> {
        self.record(Call::SetTriggerEnabled {
            instance: target.id().to_string(),
            trigger: trigger_id.to_string(),
            enabled,
        });
        let mut state = self.state();
        let trigger = state
            .populated(target.id(), trigger_id)
            .ok_or_else(|| PanelError::action_failed("no such trigger"))?;
        trigger.enabled = enabled;
        Ok(())
    }

    async fn setting_spec(&self, target: &InstanceHandle) -> PanelResult<SettingSpec> {
        self.state()
            .specs
            .get(target.id())
            .cloned()
            .ok_or_else(|| PanelError::not_found(format!("settings of {}", target.id())))
    }

    async fn set_configs(
        &self,
        target: &InstanceHandle,
        values: &BTreeMap<String, String>,
    ) -> PanelResult<()> {
        self.record(Call::SetConfigs {
            instance: target.id().to_string(),
            values: values.clone(),
        });
        Ok(())
    }

    async fn stop_application(&self, target: &InstanceHandle) -> PanelResult<()> {
        self.record(Call::Stop {
            instance: target.id().to_string(),
        });
        let mut state = self.state();
        if !state.stuck.contains(target.id()) {
            state.running.insert(target.id().to_string(), false);
        }
        Ok(())
    }

    async fn start_application(&self, target: &InstanceHandle) -> PanelResult<()> {
        self.record(Call::Start {
            instance: target.id().to_string(),
        });
        self.state().running.insert(target.id().to_string(), true);
        Ok(())
    }

    async fn instance_status(&self, target: &InstanceHandle) -> PanelResult<InstanceStatus> {
        Ok(InstanceStatus {
            running: self.state().running.get(target.id()).copied().unwrap_or(false),
        })
    }

    async fn application_status(&self, target: &InstanceHandle) -> PanelResult<ApplicationStatus> {
        let running = self.instance_status(target).await?.running;
        Ok(ApplicationStatus {
            state: if running {
                ApplicationState::Ready
            } else {
                ApplicationState::Stopped
            },
            ..Default::default()
        })
    }
}

// ============================================================================
// Fixture helpers
// ============================================================================

pub fn instance(id: &str, name: &str, friendly: &str) -> InstanceMeta {
    InstanceMeta {
        instance_id: id.to_string(),
        instance_name: name.to_string(),
        friendly_name: friendly.to_string(),
        module: "GenericModule".to_string(),
        running: true,
        app_state: ApplicationState::Ready,
        display_image_source: "steam:2399830".to_string(),
    }
}

pub fn task(id: &str, method: &str, order: i64, mapping: &[(&str, &str)]) -> Task {
    Task {
        id: id.to_string(),
        method_id: method.to_string(),
        order,
        parameter_mapping: mapping
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

pub fn trigger(id: &str, description: &str, kind: TriggerKind, tasks: Vec<Task>) -> Trigger {
    Trigger {
        id: id.to_string(),
        description: description.to_string(),
        enabled: true,
        kind,
        tasks,
    }
}

pub fn minutes_at(minute: i64) -> TimeIntervalTrigger {
    TimeIntervalTrigger {
        match_minutes: vec![serde_json::json!(minute)],
        ..Default::default()
    }
}

pub fn setting(node: &str, value: serde_json::Value) -> SettingNode {
    SettingNode {
        node: node.to_string(),
        name: node.rsplit('.').next().unwrap_or(node).to_string(),
        current_value: value,
        ..Default::default()
    }
}

pub fn spec(group: &str, nodes: Vec<SettingNode>) -> SettingSpec {
    let mut spec = SettingSpec::default();
    spec.groups.insert(group.to_string(), nodes);
    spec
}
