//! Settings replication driver

use colored::*;
use common::SettingsProfile;
use errors::{SyncError, SyncResult};
use tracing::warn;

use super::{discover_destinations, list_instances, load_template, select_template};
use crate::panel::{InstanceHandle, PanelApi};
use crate::reconcile::{
    application_type_mismatches, apply_plan, evaluate_target, master_value_map, ApplyOutcome,
    PlanError, StopWait, SyncPlan,
};
use crate::report;

/// Options for one settings sync run
#[derive(Debug, Clone, Default)]
pub struct SettingsSyncOptions {
    pub dry_run: bool,
    pub profile: SettingsProfile,
    pub stop_wait: StopWait,
}

/// Plan (and, when applied, outcome) for one target
#[derive(Debug)]
pub struct TargetSettingsReport {
    pub target: InstanceHandle,
    pub plan: Result<SyncPlan, PlanError>,
    pub outcome: Option<ApplyOutcome>,
}

/// Outcome of a settings sync run
#[derive(Debug, Default)]
pub struct SettingsSyncSummary {
    /// Why reconciliation was skipped, if it was
    pub skipped: Option<String>,
    pub targets: Vec<TargetSettingsReport>,
}

impl SettingsSyncSummary {
    fn skipped(reason: &str) -> Self {
        println!("- {} Sync skipped.", reason);
        Self {
            skipped: Some(reason.to_string()),
            targets: Vec::new(),
        }
    }
}

/// Print status reports, then reconcile every destination's settings with
/// the template's
///
/// An application-type mismatch on any target aborts before anything is
/// mutated.
pub async fn run_settings_sync<P: PanelApi + ?Sized>(
    panel: &P,
    options: &SettingsSyncOptions,
) -> SyncResult<SettingsSyncSummary> {
    report::print_controller_status(panel).await;

    let instances = list_instances(panel).await?;
    let selection = select_template(&instances)?;

    let statuses = panel
        .instance_statuses()
        .await
        .map_err(SyncError::InstanceStatusQuery)?;
    report::print_instance_statuses(&statuses, &instances);
    report::print_application_statuses(panel, &statuses, &instances).await;
    report::print_menu_configuration(panel, &selection.template, &options.profile).await;

    let mode = if options.dry_run { "DRY RUN" } else { "APPLY" };
    println!(
        "\n{} {} ({})",
        "Sync game settings from template:".bright_cyan(),
        selection.template.instance_name,
        mode.bold()
    );
    println!("\nDiscovering destination instances (group marker check):");
    let targets = discover_destinations(panel, &instances, &selection).await;
    if targets.is_empty() {
        return Ok(SettingsSyncSummary::skipped("No destination instances discovered."));
    }

    let master = load_template(panel, &selection.template).await?;
    let master_spec = match panel.setting_spec(&master).await {
        Ok(spec) => spec,
        Err(e) => {
            warn!("Master setting spec query failed: {}", e);
            return Ok(SettingsSyncSummary::skipped("Failed to load master setting spec."));
        },
    };
    let master_values = match master_spec.group(&options.profile.group_key) {
        Some(nodes) if !nodes.is_empty() => master_value_map(nodes, &options.profile),
        _ => return Ok(SettingsSyncSummary::skipped("Template settings group missing.")),
    };
    println!("- Master settings candidates: {}", master_values.len());
    println!("- Explicitly skipped nodes: {}", options.profile.skip_nodes.len());
    println!("- Target destination instances: {}", targets.len());

    let mismatches = application_type_mismatches(&master.meta, &targets);
    if !mismatches.is_empty() {
        println!("\n{}", "Application type mismatch detected. Halting sync.".red());
        for line in &mismatches {
            println!("- {}", line);
        }
        return Err(SyncError::ApplicationTypeMismatch { mismatches });
    }

    let mut reports = Vec::with_capacity(targets.len());
    for target in targets {
        let plan = evaluate_target(panel, &target, &master_values, &options.profile).await;
        reports.push(TargetSettingsReport {
            target,
            plan,
            outcome: None,
        });
    }

    print_plan_report(&reports);

    if options.dry_run {
        println!("{}", "- dry run only: no stop/apply/start executed".yellow());
    } else {
        for report in &mut reports {
            let Ok(plan) = &report.plan else {
                continue;
            };
            if !plan.needs_update() {
                continue;
            }
            println!(
                "\n{} {} ({})",
                "Applying changes:".bright_cyan(),
                report.target.meta.friendly_name,
                report.target.name()
            );
            let outcome = apply_plan(panel, &report.target, plan, options.stop_wait).await;
            if !outcome.is_applied() {
                warn!("- {}: {}", report.target.name(), outcome);
            }
            report.outcome = Some(outcome);
        }
    }

    Ok(SettingsSyncSummary {
        skipped: None,
        targets: reports,
    })
}

/// Both partitions for every target, printed before any action
fn print_plan_report(reports: &[TargetSettingsReport]) {
    println!("\n{}", "No Update Needed By Server:".bright_green());
    for report in reports {
        let target = &report.target;
        match &report.plan {
            Err(e) => println!(
                "- {} ({}): unable to evaluate ({})",
                target.meta.friendly_name,
                target.name(),
                e
            ),
            Ok(plan) => {
                println!(
                    "- {} ({}): {} setting(s) already aligned",
                    target.meta.friendly_name,
                    target.name(),
                    plan.same.len()
                );
                for (node, value) in &plan.same {
                    println!("  - {}: {}", node, value);
                }
            },
        }
    }

    println!("\n{}", "Update Required By Server:".bright_yellow());
    for report in reports {
        let target = &report.target;
        match &report.plan {
            Err(e) => println!(
                "- {} ({}): unable to evaluate ({})",
                target.meta.friendly_name,
                target.name(),
                e
            ),
            Ok(plan) => {
                println!(
                    "- {} ({}): {} setting(s) need update",
                    target.meta.friendly_name,
                    target.name(),
                    plan.diff.len()
                );
                for (node, value) in &plan.diff {
                    println!("  - {}: {} -> {}", node, plan.old_value(node), value);
                }
            },
        }
    }
}
