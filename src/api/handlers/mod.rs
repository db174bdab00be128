pub mod devices;
pub mod health;
pub mod subscriptions;
pub mod tplink;

use std::sync::Arc;

use crate::monitor::MonitorRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MonitorRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<MonitorRegistry>) -> Self {
        Self { registry }
    }
}
