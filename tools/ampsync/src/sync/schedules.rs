//! Schedule replication driver

use chrono::Utc;
use colored::*;
use errors::{SyncError, SyncResult};
use tracing::{info, warn};

use super::{discover_destinations, list_instances, load_template, select_template};
use crate::panel::PanelApi;
use crate::reconcile::{sync_target_schedule, ScheduleRun, TargetScheduleReport};

/// Options for one schedule sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSyncOptions {
    pub dry_run: bool,
    /// Replication stamp written into interval trigger descriptions
    pub run_stamp: String,
}

impl ScheduleSyncOptions {
    /// Options stamped with the current UTC time
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            run_stamp: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

/// Per-target outcomes of a schedule sync run
#[derive(Debug, Default)]
pub struct ScheduleSyncSummary {
    pub template: String,
    pub targets: Vec<TargetScheduleReport>,
}

impl ScheduleSyncSummary {
    pub fn failed_targets(&self) -> usize {
        self.targets.iter().filter(|t| !t.is_clean()).count()
    }
}

/// Replace every destination's schedule with the template's
///
/// Fatal discovery failures return an error before anything is mutated.
/// Target, trigger and task failures are reported and skipped.
pub async fn run_schedule_sync<P: PanelApi + ?Sized>(
    panel: &P,
    options: &ScheduleSyncOptions,
) -> SyncResult<ScheduleSyncSummary> {
    let instances = list_instances(panel).await?;
    let selection = select_template(&instances)?;
    let template = load_template(panel, &selection.template).await?;
    let template_schedule = panel
        .schedule(&template)
        .await
        .map_err(SyncError::TemplateSchedule)?;

    let template_triggers = &template_schedule.populated_triggers;
    println!("Template populated triggers: {}", template_triggers.len());
    for trigger in template_triggers {
        println!("- {} tasks={}", trigger.summary(), trigger.tasks.len());
    }

    let mut summary = ScheduleSyncSummary {
        template: template.name().to_string(),
        ..Default::default()
    };

    let targets = discover_destinations(panel, &instances, &selection).await;
    if targets.is_empty() {
        println!("No target instances found (only template or ADS instances present).");
        return Ok(summary);
    }

    let mode = if options.dry_run { "DRY RUN" } else { "APPLY" };
    println!("\n{} {}", "Schedule sync mode:".bright_cyan(), mode.bold());
    println!("Replication stamp (UTC): {}", options.run_stamp);
    println!("Target instances: {}", targets.len());

    let run = ScheduleRun {
        template: &template,
        template_schedule: &template_schedule,
        template_name: template.name(),
        run_stamp: &options.run_stamp,
        target_total: targets.len(),
        dry_run: options.dry_run,
    };

    for (index, target) in targets.iter().enumerate() {
        summary
            .targets
            .push(sync_target_schedule(panel, target, index, &run).await);
    }

    let failed = summary.failed_targets();
    if failed > 0 {
        warn!("Schedule sync finished with issues on {} target(s)", failed);
    } else {
        info!("Schedule sync finished for {} target(s)", summary.targets.len());
    }
    Ok(summary)
}
