use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A diary entry as persisted in the `entries` table.
///
/// `id` is assigned by the store on first insert and never reused.
/// The three weather fields are all-or-nothing: a single enrichment run
/// either sets all of them or none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    pub id: i64,
    pub image_ref: String,
    pub title: String,
    pub description: Option<String>,
    pub temperature_c: Option<f64>,
    pub weather_label: Option<String>,
    pub location_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DiaryEntry {
    /// True when the enrichment triple is fully populated.
    pub fn has_enrichment(&self) -> bool {
        self.temperature_c.is_some()
            && self.weather_label.is_some()
            && self.location_name.is_some()
    }
}

/// Fields for a not-yet-persisted entry; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub image_ref: String,
    pub title: String,
    pub description: Option<String>,
    pub temperature_c: Option<f64>,
    pub weather_label: Option<String>,
    pub location_name: Option<String>,
}

/// Change notification emitted after a successful mutation, in commit
/// order.
#[derive(Debug, Clone)]
pub enum EntryChange {
    Inserted(DiaryEntry),
    Updated(DiaryEntry),
    Deleted(i64),
}

impl EntryChange {
    pub fn entry_id(&self) -> i64 {
        match self {
            EntryChange::Inserted(entry) | EntryChange::Updated(entry) => entry.id,
            EntryChange::Deleted(id) => *id,
        }
    }
}
