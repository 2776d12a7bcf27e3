//! Remote panel boundary
//!
//! - `types`: canonical shapes every panel response is normalised into
//! - `api`: the [`PanelApi`] trait the reconcilers are written against
//! - `client`: the HTTP implementation
//! - `session`: scoped login/logout

pub mod api;
pub mod client;
pub mod session;
pub mod types;

pub use api::PanelApi;
pub use client::AmpClient;
pub use session::{with_session, PanelSession, SessionFuture};
pub use types::{
    ApplicationState, ApplicationStatus, InstanceHandle, InstanceMeta, InstanceStatus,
    InstanceStatusEntry, IntervalSpec, MethodInfo, ScheduleData, SettingNode, SettingSpec, Task,
    TimeIntervalTrigger, Trigger, TriggerKind,
};
