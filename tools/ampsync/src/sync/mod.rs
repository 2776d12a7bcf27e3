//! Sync orchestrators
//!
//! Discovery shared by both tools (instance list, template selection,
//! destination filtering) plus one driver per tool.

pub mod schedules;
pub mod settings;

pub use schedules::{run_schedule_sync, ScheduleSyncOptions, ScheduleSyncSummary};
pub use settings::{run_settings_sync, SettingsSyncOptions, SettingsSyncSummary, TargetSettingsReport};

use colored::*;
use errors::{SyncError, SyncResult};
use tracing::debug;

use crate::naming::{find_master_template, has_destination_group};
use crate::panel::{InstanceHandle, InstanceMeta, PanelApi};

/// Master template and its destination group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSelection {
    pub template: InstanceMeta,
    pub group: String,
}

/// All instances with a usable id
pub async fn list_instances<P: PanelApi + ?Sized>(panel: &P) -> SyncResult<Vec<InstanceMeta>> {
    let instances = panel
        .list_instances()
        .await
        .map_err(SyncError::InstanceList)?;
    let total = instances.len();
    let instances: Vec<InstanceMeta> = instances
        .into_iter()
        .filter(|i| !i.instance_id.trim().is_empty())
        .collect();
    debug!("Instances listed: {} ({} with id)", total, instances.len());
    Ok(instances)
}

/// Resolve the master template, announcing the selection
pub fn select_template(instances: &[InstanceMeta]) -> SyncResult<TemplateSelection> {
    let (template, group) = find_master_template(instances);
    let template = template.ok_or(SyncError::TemplateNotFound)?;
    let group = group.ok_or(SyncError::TemplateGroupUnparseable)?;

    println!(
        "\n{} {} ({})",
        "Master template selected:".bright_green(),
        template.friendly_name,
        template.instance_name
    );
    println!(
        "Template group: {} (destinations require '-{}-' in friendly name)",
        group.bright_yellow(),
        group
    );

    Ok(TemplateSelection {
        template: template.clone(),
        group,
    })
}

/// Load the template instance for per-instance calls
pub async fn load_template<P: PanelApi + ?Sized>(
    panel: &P,
    template: &InstanceMeta,
) -> SyncResult<InstanceHandle> {
    if template.instance_id.trim().is_empty() {
        return Err(SyncError::TemplateMissingId);
    }
    panel
        .get_instance(template)
        .await
        .map_err(SyncError::TemplateLoad)
}

/// Running group members other than the template, loaded and sorted by
/// instance name
///
/// Every exclusion is printed; none is fatal.
pub async fn discover_destinations<P: PanelApi + ?Sized>(
    panel: &P,
    instances: &[InstanceMeta],
    selection: &TemplateSelection,
) -> Vec<InstanceHandle> {
    let mut candidates: Vec<&InstanceMeta> = instances.iter().collect();
    candidates.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));

    let mut destinations = Vec::new();
    for meta in candidates {
        let name = &meta.instance_name;
        if meta.is_management() || meta.instance_id == selection.template.instance_id {
            continue;
        }
        if !has_destination_group(&meta.friendly_name, &selection.group) {
            println!("- skip {}: missing destination marker -{}-", name, selection.group);
            continue;
        }
        if !meta.running {
            println!("- skip {}: instance unavailable/offline", name);
            continue;
        }
        match panel.get_instance(meta).await {
            Ok(handle) => {
                println!(
                    "- destination confirmed: {} ({})",
                    handle.meta.friendly_name.bright_green(),
                    name
                );
                destinations.push(handle);
            },
            Err(e) => println!("- skip {}: failed to load instance ({})", name, e),
        }
    }
    destinations
}
