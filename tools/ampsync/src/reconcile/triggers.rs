//! Trigger reconciliation
//!
//! A target's schedule is replaced wholesale by the template's:
//!
//! ```text
//! read target ─▶ delete every trigger ─▶ refresh + method catalog
//!                                              │
//!            ┌─────────── per template trigger ┘
//!            ▼
//!   create (interval: raw add, event: by reference)
//!            ▼
//!   resolve new id ─▶ add tasks in order ─▶ set enabled state
//! ```
//!
//! Failures are scoped: a target failure skips the target, a trigger failure
//! skips the trigger, a task failure skips the task.

use colored::*;
use errors::PanelError;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::minutes::distributed_minute_avoiding;
use crate::panel::{
    InstanceHandle, IntervalSpec, PanelApi, ScheduleData, Task, TimeIntervalTrigger, Trigger,
};
use crate::params::{build_consumes_map, remap_parameters, ConsumesMap};

/// Why a single template trigger was not replicated
#[derive(Debug, Error)]
pub enum TriggerFailure {
    #[error("could not read template interval details")]
    IntervalDetails,

    #[error("no target match")]
    NoEventMatch,

    #[error("failed to read target schedule before create: {0}")]
    Snapshot(#[source] PanelError),

    #[error("create failed: {0}")]
    Create(#[source] PanelError),

    #[error("trigger created but new trigger id not found")]
    IdNotFound,
}

/// Template-side inputs shared by every target of one run
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRun<'a> {
    pub template: &'a InstanceHandle,
    pub template_schedule: &'a ScheduleData,
    /// Template instance name, stamped into replicated descriptions
    pub template_name: &'a str,
    /// `YYYY-MM-DD HH:MM:SS UTC` of this run
    pub run_stamp: &'a str,
    pub target_total: usize,
    pub dry_run: bool,
}

/// A trigger recreated on a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTrigger {
    pub template_description: String,
    pub trigger_id: String,
    pub tasks_added: usize,
    pub tasks_failed: usize,
}

/// Outcome of one target's schedule sync
#[derive(Debug, Default)]
pub struct TargetScheduleReport {
    pub target: String,
    /// Set when the target was abandoned before the create phase
    pub aborted: Option<String>,
    /// Trigger ids deleted (planned only, in dry run)
    pub deleted: Vec<String>,
    pub delete_failures: usize,
    /// Backup minute chosen per template trigger description
    pub backup_minutes: Vec<(String, u32)>,
    pub created: Vec<CreatedTrigger>,
    pub skipped: Vec<(String, TriggerFailure)>,
}

impl TargetScheduleReport {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.aborted.is_none()
            && self.delete_failures == 0
            && self.skipped.is_empty()
            && self.created.iter().all(|c| c.tasks_failed == 0)
    }
}

// ============================================================================
// Plan helpers
// ============================================================================

pub fn is_backup_task(task: &Task) -> bool {
    task.method_id.to_lowercase().contains("backup")
}

pub fn trigger_has_backup_task(trigger: &Trigger) -> bool {
    trigger.tasks.iter().any(is_backup_task)
}

/// Description marking a trigger as replicated from `template_name`
pub fn replicated_description(base: &str, template_name: &str, run_stamp: &str) -> String {
    let base = match base.trim() {
        "" => "Scheduled Trigger",
        trimmed => trimmed,
    };
    format!("{} | replicated from {} {}", base, template_name, run_stamp)
}

fn first_int(values: &[JsonValue], default: i64) -> i64 {
    values
        .first()
        .and_then(crate::panel::types::as_i64)
        .unwrap_or(default)
}

/// Collapse the template's match lists to the single values the raw
/// add-interval call takes
pub fn interval_spec_from(details: &TimeIntervalTrigger, fallback_description: &str) -> IntervalSpec {
    IntervalSpec {
        months: first_int(&details.match_months, 1),
        days: first_int(&details.match_days, 0),
        hours: first_int(&details.match_hours, 0),
        minutes: first_int(&details.match_minutes, 0),
        days_of_month: first_int(&details.match_days_of_month, 1),
        description: details
            .description
            .clone()
            .unwrap_or_else(|| fallback_description.to_string()),
    }
}

/// Tasks in application order (ascending `order`, ties keep listing order)
pub fn ordered_tasks(trigger: &Trigger) -> Vec<&Task> {
    let mut tasks: Vec<&Task> = trigger.tasks.iter().collect();
    tasks.sort_by_key(|t| t.order);
    tasks
}

/// Available (not yet instantiated) event trigger matching `description`
pub fn find_event_source<'a>(available: &'a [Trigger], description: &str) -> Option<&'a Trigger> {
    available
        .iter()
        .find(|t| !t.is_interval() && t.description == description)
}

/// Identify the trigger a create call just added
///
/// Preference: `preferred_id` if it is new, then a new trigger whose
/// description matches, then the first new trigger.
pub fn resolve_new_trigger_id(
    after: &[Trigger],
    before_ids: &HashSet<String>,
    expected_description: &str,
    preferred_id: Option<&str>,
) -> Option<String> {
    if let Some(preferred) = preferred_id.filter(|p| !p.is_empty()) {
        if !before_ids.contains(preferred) && after.iter().any(|t| t.id == preferred) {
            return Some(preferred.to_string());
        }
    }

    let new_triggers: Vec<&Trigger> = after
        .iter()
        .filter(|t| !before_ids.contains(&t.id))
        .collect();

    new_triggers
        .iter()
        .find(|t| t.description == expected_description)
        .or_else(|| new_triggers.first())
        .map(|t| t.id.clone())
        .filter(|id| !id.is_empty())
}

fn trigger_ids(schedule: &ScheduleData) -> HashSet<String> {
    schedule
        .populated_triggers
        .iter()
        .map(|t| t.id.clone())
        .collect()
}

// ============================================================================
// Panel-driven steps
// ============================================================================

/// Read the template's interval fields for `trigger`
pub async fn load_interval_spec<P: PanelApi + ?Sized>(
    panel: &P,
    template: &InstanceHandle,
    trigger: &Trigger,
) -> Option<IntervalSpec> {
    if trigger.id.is_empty() {
        return None;
    }
    match panel.interval_trigger(template, &trigger.id).await {
        Ok(details) => Some(interval_spec_from(&details, &trigger.description)),
        Err(e) => {
            debug!("Interval details for {} unavailable: {}", trigger.id, e);
            None
        },
    }
}

/// Backup minute this target would get for each template backup trigger
pub async fn plan_backup_minutes<P: PanelApi + ?Sized>(
    panel: &P,
    run: &ScheduleRun<'_>,
    target_index: usize,
) -> Vec<(String, u32)> {
    let mut plan = Vec::new();
    for trigger in &run.template_schedule.populated_triggers {
        if !trigger.is_interval() || !trigger_has_backup_task(trigger) {
            continue;
        }
        let template_minute = load_interval_spec(panel, run.template, trigger)
            .await
            .map_or(0, |spec| spec.minutes);
        let minute =
            distributed_minute_avoiding(target_index, run.target_total, template_minute as u32);
        plan.push((trigger.description.clone(), minute));
    }
    plan
}

async fn clear_trigger_tasks<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    trigger_id: &str,
) {
    let schedule = match panel.schedule(target).await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!("  - could not read tasks of new trigger {}: {}", trigger_id, e);
            return;
        },
    };
    let Some(trigger) = schedule
        .populated_triggers
        .iter()
        .find(|t| t.id == trigger_id)
    else {
        return;
    };

    for task in &trigger.tasks {
        let task_id = task.id.trim();
        if task_id.is_empty() {
            continue;
        }
        if let Err(e) = panel.delete_task(target, trigger_id, task_id).await {
            warn!("  - existing task delete failed: task_id={} ({})", task_id, e);
        }
    }
}

/// Create the target copy of `template_trigger`, returning its new id and
/// the description it was created under
async fn create_trigger<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    template_trigger: &Trigger,
    available: &[Trigger],
    run: &ScheduleRun<'_>,
    target_index: usize,
    report: &mut TargetScheduleReport,
) -> Result<String, TriggerFailure> {
    let before = panel
        .schedule(target)
        .await
        .map_err(TriggerFailure::Snapshot)?;
    let before_ids = trigger_ids(&before);
    let description = &template_trigger.description;

    let (expected_description, preferred_id) = if template_trigger.is_interval() {
        let mut spec = load_interval_spec(panel, run.template, template_trigger)
            .await
            .ok_or(TriggerFailure::IntervalDetails)?;
        spec.description = replicated_description(description, run.template_name, run.run_stamp);

        if trigger_has_backup_task(template_trigger) {
            let old_minute = spec.minutes;
            let new_minute =
                distributed_minute_avoiding(target_index, run.target_total, old_minute as u32);
            spec.minutes = i64::from(new_minute);
            report.backup_minutes.push((description.clone(), new_minute));
            println!(
                "  - backup interval minute adjusted for spread: {} {:02} -> {:02} (template minute blocked)",
                description,
                old_minute,
                new_minute
            );
        }

        panel
            .add_interval_trigger(target, &spec)
            .await
            .map_err(TriggerFailure::Create)?;
        (spec.description, None)
    } else {
        let source = find_event_source(available, description).ok_or(TriggerFailure::NoEventMatch)?;
        panel
            .add_event_trigger(target, &source.id)
            .await
            .map_err(TriggerFailure::Create)?;
        (description.clone(), Some(source.id.clone()))
    };

    let after = panel
        .schedule(target)
        .await
        .map_err(|_| TriggerFailure::IdNotFound)?;
    let new_id = resolve_new_trigger_id(
        &after.populated_triggers,
        &before_ids,
        &expected_description,
        preferred_id.as_deref(),
    )
    .ok_or(TriggerFailure::IdNotFound)?;

    println!(
        "{} created trigger: {} -> {}",
        "-".bright_cyan(),
        description,
        new_id.bright_yellow()
    );
    if template_trigger.is_interval() {
        println!("  - interval trigger configured: {}", expected_description);
    } else {
        println!(
            "  - event trigger naming unchanged by panel API (template trigger: {})",
            description
        );
        clear_trigger_tasks(panel, target, &new_id).await;
    }
    Ok(new_id)
}

/// Attach the template trigger's tasks in order; returns (added, failed)
async fn attach_tasks<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    trigger_id: &str,
    template_trigger: &Trigger,
    consumes: &ConsumesMap,
) -> (usize, usize) {
    let (mut added, mut failed) = (0, 0);
    for task in ordered_tasks(template_trigger) {
        let method_id = task.method_id.trim();
        if method_id.is_empty() {
            warn!("  - task skipped: missing method");
            failed += 1;
            continue;
        }
        let mapping = remap_parameters(method_id, &task.parameter_mapping, consumes);
        match panel.add_task(target, trigger_id, method_id, &mapping).await {
            Ok(()) => {
                added += 1;
                println!("  - task added: method={}", method_id);
            },
            Err(e) => {
                failed += 1;
                warn!("  - task add failed: method={} ({})", method_id, e);
            },
        }
    }
    (added, failed)
}

/// Replace `target`'s schedule with the template's
pub async fn sync_target_schedule<P: PanelApi + ?Sized>(
    panel: &P,
    target: &InstanceHandle,
    target_index: usize,
    run: &ScheduleRun<'_>,
) -> TargetScheduleReport {
    let mut report = TargetScheduleReport::new(target.name());
    println!(
        "\n{} {} ({})",
        "Target:".bright_cyan(),
        target.meta.friendly_name.bright_yellow(),
        target.name()
    );

    let schedule = match panel.schedule(target).await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!("- failed to read target schedule: {}", e);
            report.aborted = Some(format!("failed to read target schedule: {}", e));
            return report;
        },
    };

    let template_triggers = &run.template_schedule.populated_triggers;
    println!("- existing triggers on target: {}", schedule.populated_triggers.len());
    println!("- template triggers to clone: {}", template_triggers.len());

    // Delete phase
    for trigger in &schedule.populated_triggers {
        println!("{} delete trigger: {}", "-".red(), trigger.summary());
        report.deleted.push(trigger.id.clone());
        if run.dry_run {
            continue;
        }
        if let Err(e) = panel.delete_trigger(target, &trigger.id).await {
            report.delete_failures += 1;
            warn!("  - delete failed: {}", e);
        }
    }

    if run.dry_run {
        report.backup_minutes = plan_backup_minutes(panel, run, target_index).await;
        for (description, minute) in &report.backup_minutes {
            println!("- dry-run backup minute plan: {} -> {:02}", description, minute);
        }
        println!("{}", "- dry-run: skip create/apply steps".yellow());
        return report;
    }

    // Refresh against the target's own schema
    let schedule = match panel.schedule(target).await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!("- failed to refresh target schedule after delete: {}", e);
            report.aborted = Some(format!("failed to refresh target schedule: {}", e));
            return report;
        },
    };
    let consumes = build_consumes_map(&schedule.available_methods);

    // Create phase
    for template_trigger in template_triggers {
        let new_id = match create_trigger(
            panel,
            target,
            template_trigger,
            &schedule.available_triggers,
            run,
            target_index,
            &mut report,
        )
        .await
        {
            Ok(id) => id,
            Err(failure) => {
                warn!(
                    "- {} trigger skipped ({}): {}",
                    template_trigger.kind, failure, template_trigger.description
                );
                report
                    .skipped
                    .push((template_trigger.description.clone(), failure));
                continue;
            },
        };

        let (tasks_added, tasks_failed) =
            attach_tasks(panel, target, &new_id, template_trigger, &consumes).await;

        match panel
            .set_trigger_enabled(target, &new_id, template_trigger.enabled)
            .await
        {
            Ok(()) => println!("  - trigger enabled state set: {}", template_trigger.enabled),
            Err(e) => warn!("  - set trigger enabled failed: {}", e),
        }

        report.created.push(CreatedTrigger {
            template_description: template_trigger.description.clone(),
            trigger_id: new_id,
            tasks_added,
            tasks_failed,
        });
    }

    report
}
