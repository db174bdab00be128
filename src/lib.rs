pub mod api;
pub mod cloud;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod repositories;

pub use config::Config;
pub use error::{AppError, Result};
pub use monitor::{DeviceMonitor, MonitorRegistry, MonitorSettings, Services, TickOutcome};
