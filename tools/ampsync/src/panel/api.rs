//! Panel API trait
//!
//! The operations the reconcilers consume from the remote panel. Every call is
//! awaited in program order; nothing here fans out concurrently.

use async_trait::async_trait;
use errors::PanelResult;
use std::collections::BTreeMap;

use super::types::{
    ApplicationStatus, InstanceHandle, InstanceMeta, InstanceStatus, InstanceStatusEntry,
    IntervalSpec, ScheduleData, SettingSpec, TimeIntervalTrigger,
};
use crate::params::ParameterMapping;

/// Logged-in view of the panel
#[async_trait]
pub trait PanelApi: Send + Sync {
    // ---- controller ----

    /// All instances known to the controller
    async fn list_instances(&self) -> PanelResult<Vec<InstanceMeta>>;

    /// Load one instance for per-instance calls
    async fn get_instance(&self, meta: &InstanceMeta) -> PanelResult<InstanceHandle>;

    /// Controller's own status
    async fn controller_status(&self) -> PanelResult<ApplicationStatus>;

    /// Running flag of every instance
    async fn instance_statuses(&self) -> PanelResult<Vec<InstanceStatusEntry>>;

    // ---- schedule ----

    async fn schedule(&self, target: &InstanceHandle) -> PanelResult<ScheduleData>;

    async fn delete_trigger(&self, target: &InstanceHandle, trigger_id: &str) -> PanelResult<()>;

    async fn delete_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        task_id: &str,
    ) -> PanelResult<()>;

    /// Instantiate an available event trigger by reference
    async fn add_event_trigger(
        &self,
        target: &InstanceHandle,
        source_trigger_id: &str,
    ) -> PanelResult<()>;

    /// Raw interval-trigger creation
    async fn add_interval_trigger(
        &self,
        target: &InstanceHandle,
        spec: &IntervalSpec,
    ) -> PanelResult<()>;

    async fn interval_trigger(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
    ) -> PanelResult<TimeIntervalTrigger>;

    async fn add_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        method_id: &str,
        mapping: &ParameterMapping,
    ) -> PanelResult<()>;

    async fn set_trigger_enabled(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        enabled: bool,
    ) -> PanelResult<()>;

    // ---- settings & lifecycle ----

    async fn setting_spec(&self, target: &InstanceHandle) -> PanelResult<SettingSpec>;

    async fn set_configs(
        &self,
        target: &InstanceHandle,
        values: &BTreeMap<String, String>,
    ) -> PanelResult<()>;

    async fn stop_application(&self, target: &InstanceHandle) -> PanelResult<()>;

    async fn start_application(&self, target: &InstanceHandle) -> PanelResult<()>;

    /// Whether the instance's application is still running
    async fn instance_status(&self, target: &InstanceHandle) -> PanelResult<InstanceStatus>;

    async fn application_status(&self, target: &InstanceHandle) -> PanelResult<ApplicationStatus>;
}
