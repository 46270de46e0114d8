//! Best-effort acquisition of device coordinates.
//!
//! Acquisition is gated on the location permission; a denied gate
//! resolves immediately without attempting a fix. No retries happen
//! here — a failed attempt resolves the call, and the enrichment
//! pipeline treats that as "skip enrichment".

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LocationError;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Caller-supplied accuracy hint; providers may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    High,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Location,
    Notifications,
}

/// OS permission state, as seen by the core.
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn is_granted(&self, _capability: Capability) -> bool {
        true
    }
}

pub struct AlwaysDenied;

impl PermissionGate for AlwaysDenied {
    fn is_granted(&self, _capability: Capability) -> bool {
        false
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn acquire(&self, accuracy: Accuracy) -> Result<Coordinates, LocationError>;
}

/// Serves the configured default coordinates when the permission is
/// granted. Stands in for a platform positioning service; the default
/// pair doubles as the "last known" value.
pub struct FallbackLocationProvider {
    gate: Arc<dyn PermissionGate>,
    settings: Arc<SettingsStore>,
}

impl FallbackLocationProvider {
    pub fn new(gate: Arc<dyn PermissionGate>, settings: Arc<SettingsStore>) -> Self {
        Self { gate, settings }
    }
}

#[async_trait]
impl LocationProvider for FallbackLocationProvider {
    async fn acquire(&self, _accuracy: Accuracy) -> Result<Coordinates, LocationError> {
        if !self.gate.is_granted(Capability::Location) {
            return Err(LocationError::PermissionDenied);
        }

        let location = self.settings.location();
        Ok(Coordinates {
            latitude: location.default_latitude,
            longitude: location.default_longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn settings(dir: &TempDir) -> Arc<SettingsStore> {
        Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap())
    }

    #[tokio::test]
    async fn denied_permission_resolves_without_acquisition() {
        let dir = TempDir::new().unwrap();
        let provider = FallbackLocationProvider::new(Arc::new(AlwaysDenied), settings(&dir));

        let err = provider.acquire(Accuracy::High).await.unwrap_err();
        assert!(matches!(err, LocationError::PermissionDenied));
    }

    #[tokio::test]
    async fn granted_permission_serves_configured_defaults() {
        let dir = TempDir::new().unwrap();
        let provider = FallbackLocationProvider::new(Arc::new(AlwaysGranted), settings(&dir));

        let fix = provider.acquire(Accuracy::Balanced).await.unwrap();
        assert!((fix.latitude - 65.01236).abs() < 1e-9);
        assert!((fix.longitude - 25.46816).abs() < 1e-9);
    }
}
