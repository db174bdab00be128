use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{DeviceMonitor, MonitorSettings, Services};
use crate::error::StoreError;

/// One [`DeviceMonitor`] per domain for the life of the process.
pub struct MonitorRegistry {
    services: Services,
    settings: MonitorSettings,
    monitors: Mutex<HashMap<String, Arc<DeviceMonitor>>>,
}

impl MonitorRegistry {
    pub fn new(services: Services, settings: MonitorSettings) -> Self {
        Self {
            services,
            settings,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Return the live monitor for `domain`, loading (or creating) its record
    /// on first use.
    pub async fn get_or_create(&self, domain: &str) -> Result<Arc<DeviceMonitor>, StoreError> {
        let mut monitors = self.monitors.lock().await;
        if let Some(monitor) = monitors.get(domain) {
            return Ok(Arc::clone(monitor));
        }

        let record = self.services.devices.find_or_create(domain).await?;
        let monitor = DeviceMonitor::new(record, self.services.clone(), self.settings);
        monitors.insert(domain.to_string(), Arc::clone(&monitor));
        Ok(monitor)
    }

    pub async fn get(&self, domain: &str) -> Option<Arc<DeviceMonitor>> {
        self.monitors.lock().await.get(domain).cloned()
    }

    pub async fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.monitors.lock().await.keys().cloned().collect();
        domains.sort();
        domains
    }

    pub async fn start(&self, domain: &str) -> Result<bool, StoreError> {
        let monitor = self.get_or_create(domain).await?;
        Ok(monitor.start().await)
    }

    /// Returns `false` when the domain has no live monitor or it was idle.
    pub async fn stop(&self, domain: &str) -> bool {
        match self.get(domain).await {
            Some(monitor) => monitor.stop(),
            None => false,
        }
    }

    /// Start a monitor for every persisted device. Returns how many started.
    pub async fn start_all(&self) -> Result<usize, StoreError> {
        let domains = self.services.devices.list_domains().await?;
        let mut started = 0;

        for domain in &domains {
            match self.start(domain).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(domain = %domain, error = %e, "failed to load device"),
            }
        }

        info!(started, known = domains.len(), "monitors started");
        Ok(started)
    }

    pub async fn stop_all(&self) {
        let monitors: Vec<Arc<DeviceMonitor>> =
            self.monitors.lock().await.values().cloned().collect();
        let stopped = monitors.iter().filter(|m| m.stop()).count();
        info!(stopped, "monitors stopped");
    }
}
