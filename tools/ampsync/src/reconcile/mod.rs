//! Reconciliation engines
//!
//! - `triggers`: replaces a target's schedule with the template's
//! - `settings`: plans and applies the template's settings on a target

pub mod settings;
pub mod triggers;

pub use settings::{
    application_type_mismatches, apply_plan, bucket_settings, evaluate_target, master_value_map,
    normalize_value, wait_for_stop, writable_values, ApplyOutcome, PlanError, SettingBucket,
    StopWait, SyncPlan, ValueMap,
};
pub use triggers::{
    find_event_source, interval_spec_from, is_backup_task, ordered_tasks, replicated_description,
    resolve_new_trigger_id, sync_target_schedule, trigger_has_backup_task, CreatedTrigger,
    ScheduleRun, TargetScheduleReport, TriggerFailure,
};
