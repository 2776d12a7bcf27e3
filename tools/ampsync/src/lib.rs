//! ampsync - template replication for AMP panel instance groups
//!
//! One instance per group is marked `-TEMPLATE <GROUP>-`; every running
//! instance marked `-<GROUP>-` receives the template's scheduled triggers
//! (`schedules`) or game settings (`settings`).

pub mod minutes;
pub mod naming;
pub mod panel;
pub mod params;
pub mod reconcile;
pub mod report;
pub mod sync;

pub use panel::{with_session, AmpClient, PanelApi, PanelSession};
pub use sync::{
    run_schedule_sync, run_settings_sync, ScheduleSyncOptions, ScheduleSyncSummary,
    SettingsSyncOptions, SettingsSyncSummary,
};
