//! Status reports printed by the settings tool before reconciling
//!
//! Every query failure here is printed and skipped; none of them stop a run.

use colored::*;
use common::SettingsProfile;
use std::fmt::Display;

use crate::naming::extract_template_group;
use crate::panel::{InstanceMeta, InstanceStatusEntry, PanelApi, SettingNode};
use crate::params::serialize_value;
use crate::reconcile::bucket_settings;

const UNKNOWN: &str = "<unknown>";

fn or_unknown<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
}

/// Instances the status listings leave out: management and template instances
fn is_reported(meta: &InstanceMeta) -> bool {
    !meta.is_management() && extract_template_group(&meta.friendly_name).is_none()
}

pub async fn print_controller_status<P: PanelApi + ?Sized>(panel: &P) {
    match panel.controller_status().await {
        Ok(status) => {
            println!("{}", "Controller status:".bright_cyan());
            println!(
                "- state={} uptime={} active_users={}",
                status.state,
                status.uptime,
                or_unknown(status.active_users)
            );
        },
        Err(e) => println!("{} {}", "Controller status query failed:".red(), e),
    }
}

/// Running flag of every reported instance, joined with its listing entry
pub fn print_instance_statuses(statuses: &[InstanceStatusEntry], instances: &[InstanceMeta]) {
    if statuses.is_empty() {
        println!("No instance status list returned.");
        return;
    }

    println!("\n{}", "Instance statuses (non-ADS):".bright_cyan());
    let mut printed = 0;
    for entry in statuses {
        let Some(meta) = instances.iter().find(|i| i.instance_id == entry.instance_id) else {
            continue;
        };
        if !is_reported(meta) {
            continue;
        }
        printed += 1;
        println!(
            "- instance_id={} friendly_name={} instance_name={} module={} running={} app_state={}",
            entry.instance_id,
            meta.friendly_name,
            meta.instance_name,
            meta.module,
            entry.running,
            meta.app_state
        );
    }
    if printed == 0 {
        println!("- No non-ADS instances found.");
    }
}

/// Application status and headline metrics of every running reported instance
pub async fn print_application_statuses<P: PanelApi + ?Sized>(
    panel: &P,
    statuses: &[InstanceStatusEntry],
    instances: &[InstanceMeta],
) {
    println!("\n{}", "Application status (running instances):".bright_cyan());
    if statuses.is_empty() {
        println!("- No statuses available to query applications.");
        return;
    }

    let mut printed = 0;
    for entry in statuses.iter().filter(|e| e.running && !e.instance_id.is_empty()) {
        let Some(meta) = instances.iter().find(|i| i.instance_id == entry.instance_id) else {
            println!("- instance_id={} error=instance not listed", entry.instance_id);
            printed += 1;
            continue;
        };
        if !is_reported(meta) {
            continue;
        }
        printed += 1;

        let handle = match panel.get_instance(meta).await {
            Ok(handle) => handle,
            Err(e) => {
                println!(
                    "- instance_id={} error=get_instance failed ({})",
                    entry.instance_id, e
                );
                continue;
            },
        };
        match panel.application_status(&handle).await {
            Ok(status) => println!(
                "- {} instance_id={} state={} uptime={} active_users={} cpu={}% mem={}%",
                meta.label(),
                entry.instance_id,
                status.state,
                status.uptime,
                or_unknown(status.active_users),
                or_unknown(status.cpu_percent),
                or_unknown(status.memory_percent)
            ),
            Err(e) => println!(
                "- {} instance_id={} error=get_application_status failed ({})",
                meta.label(),
                entry.instance_id,
                e
            ),
        }
    }
    if printed == 0 {
        println!("- No running non-ADS instances.");
    }
}

/// Template's settings group, bucketed by menu section
pub async fn print_menu_configuration<P: PanelApi + ?Sized>(
    panel: &P,
    template: &InstanceMeta,
    profile: &SettingsProfile,
) {
    println!(
        "\n{} ({})",
        "Template menu configuration".bright_cyan(),
        template.instance_name
    );
    if !template.running {
        println!("- Template instance unavailable/offline; menu settings not queried.");
        return;
    }

    let handle = match panel.get_instance(template).await {
        Ok(handle) => handle,
        Err(e) => {
            println!("- Failed to load template instance: {}", e);
            return;
        },
    };
    let spec = match panel.setting_spec(&handle).await {
        Ok(spec) => spec,
        Err(e) => {
            println!("- Failed to query setting spec: {}", e);
            return;
        },
    };
    let nodes = match spec.group(&profile.group_key) {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => {
            println!("- No template menu settings returned.");
            return;
        },
    };

    for (bucket, items) in bucket_settings(nodes) {
        println!("\n[{}] ({})", bucket.to_string().bold(), items.len());
        for setting in items {
            println!("{}", menu_line(setting));
        }
    }
}

fn menu_line(setting: &SettingNode) -> String {
    format!(
        "- {} | node={} | value={} | requires_restart={}",
        setting.name,
        setting.node,
        serialize_value(&setting.current_value),
        setting.requires_restart
    )
}
