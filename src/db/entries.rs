use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    models::{DiaryEntry, EntryChange, NewEntry},
};
use crate::error::StorageError;

const ENTRY_COLUMNS: &str =
    "id, image_ref, title, description, temperature_c, weather_label, location_name, created_at";

fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StorageError::InvalidData(format!("failed to parse {field}: {err}")))
}

fn row_to_entry(row: &Row) -> Result<DiaryEntry, StorageError> {
    let created_at: String = row.get("created_at")?;

    Ok(DiaryEntry {
        id: row.get("id")?,
        image_ref: row.get("image_ref")?,
        title: row.get("title")?,
        description: row.get("description")?,
        temperature_c: row.get("temperature_c")?,
        weather_label: row.get("weather_label")?,
        location_name: row.get("location_name")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Inserts a new entry and returns the persisted record carrying its
    /// assigned id. Durable before return; emits `Inserted` on success.
    pub async fn insert_entry(&self, entry: NewEntry) -> Result<DiaryEntry, StorageError> {
        if entry.title.is_empty() {
            return Err(StorageError::InvalidData("title must not be empty".into()));
        }
        if entry.image_ref.is_empty() {
            return Err(StorageError::InvalidData(
                "image_ref must not be empty".into(),
            ));
        }

        let changes = self.change_sender();
        let created_at = Utc::now();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO entries (image_ref, title, description, temperature_c, weather_label, location_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.image_ref,
                    entry.title,
                    entry.description,
                    entry.temperature_c,
                    entry.weather_label,
                    entry.location_name,
                    created_at.to_rfc3339(),
                ],
            )?;

            let record = DiaryEntry {
                id: conn.last_insert_rowid(),
                image_ref: entry.image_ref,
                title: entry.title,
                description: entry.description,
                temperature_c: entry.temperature_c,
                weather_label: entry.weather_label,
                location_name: entry.location_name,
                created_at,
            };

            let _ = changes.send(EntryChange::Inserted(record.clone()));
            Ok(record)
        })
        .await
    }

    /// Replaces title and description of an existing entry, preserving
    /// the image reference and any prior weather fields. A no-op when
    /// the id is unknown: Ok, no event.
    pub async fn update_entry(
        &self,
        id: i64,
        title: String,
        description: Option<String>,
    ) -> Result<(), StorageError> {
        if title.is_empty() {
            return Err(StorageError::InvalidData("title must not be empty".into()));
        }

        let changes = self.change_sender();

        self.execute(move |conn| {
            let affected = conn.execute(
                "UPDATE entries SET title = ?1, description = ?2 WHERE id = ?3",
                params![title, description, id],
            )?;
            if affected == 0 {
                return Ok(());
            }

            let record = conn.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id],
                |row| Ok(row_to_entry(row)),
            )??;

            let _ = changes.send(EntryChange::Updated(record));
            Ok(())
        })
        .await
    }

    /// Deletes an entry, returning the image reference of the removed
    /// row so the caller can discard the blob. A no-op when the id is
    /// unknown: Ok(None), no event.
    pub async fn delete_entry(&self, id: i64) -> Result<Option<String>, StorageError> {
        let changes = self.change_sender();

        self.execute(move |conn| {
            let image_ref: Option<String> = conn
                .query_row(
                    "SELECT image_ref FROM entries WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(image_ref) = image_ref else {
                return Ok(None);
            };

            conn.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
            let _ = changes.send(EntryChange::Deleted(id));
            Ok(Some(image_ref))
        })
        .await
    }

    /// All entries, newest id first.
    pub async fn all_entries(&self) -> Result<Vec<DiaryEntry>, StorageError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }

    pub async fn entry_by_id(&self, id: i64) -> Result<Option<DiaryEntry>, StorageError> {
        self.execute(move |conn| {
            let entry = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                    params![id],
                    |row| Ok(row_to_entry(row)),
                )
                .optional()?
                .transpose()?;

            Ok(entry)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn draft(title: &str) -> NewEntry {
        NewEntry {
            image_ref: "img_1.jpg".into(),
            title: title.into(),
            description: None,
            temperature_c: None,
            weather_label: None,
            location_name: None,
        }
    }

    fn open_db(dir: &TempDir) -> Database {
        Database::new(dir.path().join("diary.sqlite3")).expect("open database")
    }

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let first = db.insert_entry(draft("First")).await.unwrap();
        let second = db.insert_entry(draft("Second")).await.unwrap();

        assert!(second.id > first.id);

        let listed = db.all_entries().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Second");
        assert_eq!(listed[1].title, "First");
    }

    #[tokio::test]
    async fn insert_rejects_empty_required_fields() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let err = db.insert_entry(draft("")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));

        let mut missing_image = draft("Lake view");
        missing_image.image_ref.clear();
        let err = db.insert_entry(missing_image).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));

        assert!(db.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_preserves_image_and_weather_fields() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let mut enriched = draft("Morning");
        enriched.temperature_c = Some(21.5);
        enriched.weather_label = Some("Rain".into());
        enriched.location_name = Some("Oulu".into());
        let inserted = db.insert_entry(enriched).await.unwrap();

        db.update_entry(inserted.id, "Evening".into(), Some("edited".into()))
            .await
            .unwrap();

        let updated = db.entry_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "Evening");
        assert_eq!(updated.description.as_deref(), Some("edited"));
        assert_eq!(updated.image_ref, inserted.image_ref);
        assert_eq!(updated.temperature_c, Some(21.5));
        assert_eq!(updated.weather_label.as_deref(), Some("Rain"));
        assert_eq!(updated.location_name.as_deref(), Some("Oulu"));
    }

    #[tokio::test]
    async fn mutations_emit_changes_in_commit_order() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let mut changes = db.subscribe_changes();

        let inserted = db.insert_entry(draft("First")).await.unwrap();
        db.update_entry(inserted.id, "Renamed".into(), None)
            .await
            .unwrap();
        db.delete_entry(inserted.id).await.unwrap();

        match changes.recv().await.unwrap() {
            EntryChange::Inserted(entry) => assert_eq!(entry.id, inserted.id),
            other => panic!("expected Inserted, got {other:?}"),
        }
        match changes.recv().await.unwrap() {
            EntryChange::Updated(entry) => assert_eq!(entry.title, "Renamed"),
            other => panic!("expected Updated, got {other:?}"),
        }
        match changes.recv().await.unwrap() {
            EntryChange::Deleted(id) => assert_eq!(id, inserted.id),
            other => panic!("expected Deleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_id_update_and_delete_are_silent_noops() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let mut changes = db.subscribe_changes();

        db.update_entry(999, "Ghost".into(), None).await.unwrap();
        let removed = db.delete_entry(999).await.unwrap();

        assert!(removed.is_none());
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn delete_returns_image_ref_of_removed_row() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let inserted = db.insert_entry(draft("To remove")).await.unwrap();
        let removed = db.delete_entry(inserted.id).await.unwrap();

        assert_eq!(removed.as_deref(), Some("img_1.jpg"));
        assert!(db.entry_by_id(inserted.id).await.unwrap().is_none());
    }
}
