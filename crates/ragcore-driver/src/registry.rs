use std::collections::HashMap;
use std::sync::Arc;

use ragcore_domain::{DriverId, Endpoint};

use crate::driver::Driver;
use crate::error::DriverError;

/// Dispatches ingestion-engine calls to the driver registered for an endpoint's `driver_id`.
/// Generalizes the orchestration tool's cloud-keyed `DriverRegistry` from a fixed
/// `CloudTarget` enum to an open string-keyed `DriverId`, since source drivers (unlike cloud
/// targets) are not a closed set known at compile time.
pub struct DriverRegistry {
    drivers: HashMap<DriverId, Arc<dyn Driver>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: DriverId, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(id, driver);
        self
    }

    pub fn for_endpoint(&self, endpoint: &Endpoint) -> Result<Arc<dyn Driver>, DriverError> {
        self.for_id(&endpoint.driver_id)
    }

    pub fn for_id(&self, id: &DriverId) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotConfigured(id.clone()))
    }

    pub fn registered_ids(&self) -> Vec<DriverId> {
        self.drivers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoDriver;

    #[test]
    fn unregistered_driver_id_is_not_configured() {
        let registry = DriverRegistry::new();
        let err = registry.for_id(&DriverId::new("demo")).unwrap_err();
        assert!(matches!(err, DriverError::DriverNotConfigured(_)));
    }

    #[test]
    fn registered_driver_resolves_by_id() {
        let mut registry = DriverRegistry::new();
        registry.register(DriverId::new("demo"), Arc::new(DemoDriver::new()));
        assert!(registry.for_id(&DriverId::new("demo")).is_ok());
    }
}
