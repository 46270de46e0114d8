use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Daily reminder preferences, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 20,
            minute: 0,
        }
    }
}

/// Fallback coordinates used when no device fix is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    pub default_latitude: f64,
    pub default_longitude: f64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        // Oulu, Finland
        Self {
            default_latitude: 65.01236,
            default_longitude: 25.46816,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    notifications: NotificationSettings,
    #[serde(default)]
    location: LocationSettings,
    #[serde(default)]
    weather_api_key: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn notifications(&self) -> NotificationSettings {
        self.data.read().unwrap().notifications.clone()
    }

    pub fn update_notifications(&self, settings: NotificationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.notifications = settings;
        self.persist(&guard)
    }

    pub fn location(&self) -> LocationSettings {
        self.data.read().unwrap().location.clone()
    }

    pub fn update_location(&self, settings: LocationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.location = settings;
        self.persist(&guard)
    }

    pub fn weather_api_key(&self) -> Option<String> {
        self.data.read().unwrap().weather_api_key.clone()
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
