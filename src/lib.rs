pub mod db;
pub mod entry;
pub mod error;
pub mod live;
pub mod location;
pub mod media;
pub mod reminder;
pub mod settings;
pub mod weather;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::warn;

use db::{Database, DiaryEntry};
use entry::{EntryCreator, EntryDraft};
use error::{CreateEntryError, StorageError};
use live::{LiveQueries, QueryKey, Subscription};
use location::{FallbackLocationProvider, PermissionGate};
use media::MediaStore;
use reminder::{Notifier, ReminderScheduler};
use settings::{NotificationSettings, SettingsStore};
use weather::WeatherClient;

/// The assembled diary core. UI layers call into this; nothing here
/// renders or routes.
pub struct App {
    pub db: Database,
    pub media: Arc<MediaStore>,
    pub settings: Arc<SettingsStore>,
    pub live: LiveQueries,
    pub creator: EntryCreator,
    pub reminders: ReminderScheduler,
}

impl App {
    pub fn bootstrap(
        data_dir: &Path,
        gate: Arc<dyn PermissionGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("diary.sqlite3"))?;
        let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);
        let media = Arc::new(MediaStore::new(data_dir.join("images"))?);
        let live = LiveQueries::new(db.clone());

        let api_key = settings
            .weather_api_key()
            .or_else(|| std::env::var("OPENWEATHER_API_KEY").ok());
        let weather = WeatherClient::new(api_key)?;
        let location = Arc::new(FallbackLocationProvider::new(
            Arc::clone(&gate),
            Arc::clone(&settings),
        ));

        let creator = EntryCreator::new(
            db.clone(),
            Arc::clone(&media),
            location,
            Arc::new(weather),
        );
        let reminders = ReminderScheduler::new(notifier, gate);

        Ok(Self {
            db,
            media,
            settings,
            live,
            creator,
            reminders,
        })
    }

    pub async fn create_entry(&self, draft: EntryDraft) -> Result<DiaryEntry, CreateEntryError> {
        self.creator.create_entry(draft).await
    }

    pub async fn update_entry(
        &self,
        id: i64,
        title: String,
        description: Option<String>,
    ) -> Result<(), StorageError> {
        self.db.update_entry(id, title, description).await
    }

    /// Deletes the entry and its stored image. Unknown ids are a no-op.
    pub async fn delete_entry(&self, id: i64) -> Result<(), StorageError> {
        if let Some(image_ref) = self.db.delete_entry(id).await? {
            if let Err(err) = self.media.remove(&image_ref) {
                warn!("failed to remove image {image_ref}: {err}");
            }
        }
        Ok(())
    }

    /// Live view of all entries, newest first.
    pub fn watch_entries(&self) -> Subscription {
        self.live.subscribe(QueryKey::AllEntries)
    }

    /// Live view of one entry; emits `None` once it is deleted.
    pub fn watch_entry(&self, id: i64) -> Subscription {
        self.live.subscribe(QueryKey::EntryById(id))
    }

    /// Arms or disarms the daily reminder from the persisted settings.
    /// Called at startup so the alarm survives process restarts.
    pub async fn apply_reminder_settings(&self) {
        let notifications = self.settings.notifications();
        if notifications.enabled {
            self.reminders
                .arm(notifications.hour, notifications.minute)
                .await;
        } else {
            self.reminders.disarm().await;
        }
    }

    /// Persists a new reminder configuration and re-arms accordingly.
    pub async fn set_reminder(&self, settings: NotificationSettings) -> Result<()> {
        self.settings.update_notifications(settings)?;
        self.apply_reminder_settings().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::live::LiveSnapshot;
    use crate::location::AlwaysDenied;
    use crate::reminder::LogNotifier;

    fn write_test_image(dir: &Path) -> PathBuf {
        let path = dir.join("picked.png");
        image::RgbImage::new(2, 2).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn created_entries_flow_to_live_subscribers_without_refresh() {
        let dir = TempDir::new().unwrap();
        // Denied location permission: creation degrades to a plain
        // entry without touching the network.
        let app = App::bootstrap(
            dir.path(),
            Arc::new(AlwaysDenied),
            Arc::new(LogNotifier),
        )
        .unwrap();

        let mut feed = app.watch_entries();
        match feed.next().await.unwrap() {
            LiveSnapshot::Entries(entries) => assert!(entries.is_empty()),
            other => panic!("expected empty list, got {other:?}"),
        }

        let image = write_test_image(dir.path());
        let created = app
            .create_entry(EntryDraft {
                title: "Lake view".into(),
                description: None,
                image: Some(image),
            })
            .await
            .unwrap();
        assert!(!created.has_enrichment());

        match feed.next().await.unwrap() {
            LiveSnapshot::Entries(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].id, created.id);
            }
            other => panic!("expected one entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_removes_the_stored_image_with_the_record() {
        let dir = TempDir::new().unwrap();
        let app = App::bootstrap(
            dir.path(),
            Arc::new(AlwaysDenied),
            Arc::new(LogNotifier),
        )
        .unwrap();

        let image = write_test_image(dir.path());
        let created = app
            .create_entry(EntryDraft {
                title: "Short lived".into(),
                description: None,
                image: Some(image),
            })
            .await
            .unwrap();
        let stored = app.media.resolve(&created.image_ref);
        assert!(stored.exists());

        app.delete_entry(created.id).await.unwrap();
        assert!(!stored.exists());
        assert!(app.db.entry_by_id(created.id).await.unwrap().is_none());
    }
}
