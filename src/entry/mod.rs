//! Entry creation: validation, image persistence, best-effort weather
//! enrichment, durable insert.
//!
//! Location and weather run sequentially under one bounded wait and are
//! individually allowed to fail; the enrichment triple is committed
//! all-or-nothing. Only validation, the image write and the store
//! insert can fail the whole call.

use std::{path::PathBuf, sync::Arc, time::Duration};

use log::{info, warn};

use crate::db::{Database, DiaryEntry, NewEntry};
use crate::error::{CreateEntryError, ValidationError};
use crate::location::{Accuracy, LocationProvider};
use crate::media::MediaStore;
use crate::weather::WeatherApi;

const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// User-supplied fields for a new entry. `image` is the picked or
/// captured source file, not yet inside the app's storage.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Enrichment {
    temperature_c: f64,
    weather_label: String,
    location_name: String,
}

pub struct EntryCreator {
    db: Database,
    media: Arc<MediaStore>,
    location: Arc<dyn LocationProvider>,
    weather: Arc<dyn WeatherApi>,
    enrichment_timeout: Duration,
}

impl EntryCreator {
    pub fn new(
        db: Database,
        media: Arc<MediaStore>,
        location: Arc<dyn LocationProvider>,
        weather: Arc<dyn WeatherApi>,
    ) -> Self {
        Self {
            db,
            media,
            location,
            weather,
            enrichment_timeout: DEFAULT_ENRICHMENT_TIMEOUT,
        }
    }

    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    pub async fn create_entry(&self, draft: EntryDraft) -> Result<DiaryEntry, CreateEntryError> {
        if draft.title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let source = draft.image.as_deref().ok_or(ValidationError::MissingImage)?;

        let image_ref = self
            .media
            .persist(source)
            .await
            .map_err(ValidationError::ImageRejected)?;

        let enrichment =
            match tokio::time::timeout(self.enrichment_timeout, self.fetch_enrichment()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "enrichment timed out after {:?}; saving entry without weather",
                        self.enrichment_timeout
                    );
                    None
                }
            };

        let record = NewEntry {
            image_ref,
            title: draft.title,
            description: draft.description,
            temperature_c: enrichment.as_ref().map(|e| e.temperature_c),
            weather_label: enrichment.as_ref().map(|e| e.weather_label.clone()),
            location_name: enrichment.map(|e| e.location_name),
        };

        let entry = self.db.insert_entry(record).await?;
        info!("created diary entry {} ({})", entry.id, entry.title);
        Ok(entry)
    }

    /// Location then weather, each allowed to fail. Location success
    /// alone is never committed.
    async fn fetch_enrichment(&self) -> Option<Enrichment> {
        let fix = match self.location.acquire(Accuracy::High).await {
            Ok(fix) => fix,
            Err(err) => {
                info!("location unavailable, skipping enrichment: {err}");
                return None;
            }
        };

        match self.weather.current(fix).await {
            Ok(weather) => Some(Enrichment {
                temperature_c: weather.temperature_c,
                weather_label: weather.label,
                location_name: weather.place,
            }),
            Err(err) => {
                warn!("weather lookup failed, skipping enrichment: {err}");
                None
            }
        }
    }
}
