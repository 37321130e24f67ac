use std::time::Duration;

use shared::domain::ScrollSettings;

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub initial_settings: ScrollSettings,
    pub service_enabled: bool,
    pub event_queue_capacity: usize,
    pub notification_capacity: usize,
    pub classification_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            initial_settings: ScrollSettings::default(),
            service_enabled: false,
            event_queue_capacity: 64,
            notification_capacity: 256,
            classification_timeout: Duration::from_millis(500),
        }
    }
}
