//! `ampsync` basic library
//!
//! Provides the ambient pieces shared by every tool:
//! - panel credentials and sync profile loading
//! - logging initialisation

pub mod config_loader;
pub mod logging;

pub use config_loader::{load_panel_config, load_panel_config_with, PanelConfig, SettingsProfile};
pub use logging::init_logging;
