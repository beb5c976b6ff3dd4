//! Collection repository over the `collections` table.
//!
//! Item and artifact lists are stored as JSON text columns and always
//! written whole.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::job_repo::{format_timestamp, parse_timestamp};
use super::{Database, DatabaseError};
use crate::collection::{Collection, CollectionId};
use crate::scan::CollectionKind;

pub trait CollectionRepository: Send + Sync {
    fn insert(&self, collection: &Collection) -> Result<(), DatabaseError>;

    fn find_by_id(&self, id: &CollectionId) -> Result<Option<Collection>, DatabaseError>;

    fn find_by_path(&self, path: &Path) -> Result<Option<Collection>, DatabaseError>;

    /// Overwrites name, kind and the item/artifact lists. Returns `false`
    /// if no such collection exists.
    fn update(&self, collection: &Collection) -> Result<bool, DatabaseError>;

    /// Empties the item, thumbnail and cache lists, keeping metadata.
    fn clear_artifacts(&self, id: &CollectionId) -> Result<bool, DatabaseError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCollectionRepository {
    db: Database,
}

impl SqliteCollectionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn to_json<T: Serialize>(value: &T, column: &'static str) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Json { column, source: e })
}

fn from_json<T: DeserializeOwned>(text: &str, column: &'static str) -> Result<T, DatabaseError> {
    serde_json::from_str(text).map_err(|e| DatabaseError::Json { column, source: e })
}

struct CollectionRow {
    id: String,
    name: String,
    path: String,
    kind: String,
    images: String,
    thumbnails: String,
    cache_images: String,
    created_at: String,
    updated_at: String,
}

fn raw_row(row: &Row<'_>) -> Result<CollectionRow, rusqlite::Error> {
    Ok(CollectionRow {
        id: row.get("id")?,
        name: row.get("name")?,
        path: row.get("path")?,
        kind: row.get("kind")?,
        images: row.get("images")?,
        thumbnails: row.get("thumbnails")?,
        cache_images: row.get("cache_images")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl CollectionRow {
    fn into_collection(self) -> Result<Collection, DatabaseError> {
        let id = CollectionId::parse(&self.id).ok_or(DatabaseError::UnknownValue {
            field: "collection id",
            value: self.id.clone(),
        })?;
        let kind = CollectionKind::parse(&self.kind).ok_or(DatabaseError::UnknownValue {
            field: "collection kind",
            value: self.kind.clone(),
        })?;
        Ok(Collection {
            id,
            name: self.name,
            path: PathBuf::from(self.path),
            kind,
            images: from_json(&self.images, "images")?,
            thumbnails: from_json(&self.thumbnails, "thumbnails")?,
            cache_images: from_json(&self.cache_images, "cache_images")?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn query_one(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<Collection>, DatabaseError> {
    conn.query_row(sql, params![key], raw_row)
        .optional()?
        .map(CollectionRow::into_collection)
        .transpose()
}

impl CollectionRepository for SqliteCollectionRepository {
    fn insert(&self, collection: &Collection) -> Result<(), DatabaseError> {
        let images = to_json(&collection.images, "images")?;
        let thumbnails = to_json(&collection.thumbnails, "thumbnails")?;
        let cache_images = to_json(&collection.cache_images, "cache_images")?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (id, name, path, kind, images, thumbnails,
                 cache_images, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    collection.id.to_string(),
                    collection.name,
                    collection.path.to_string_lossy(),
                    collection.kind.as_str(),
                    images,
                    thumbnails,
                    cache_images,
                    format_timestamp(collection.created_at),
                    format_timestamp(collection.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: &CollectionId) -> Result<Option<Collection>, DatabaseError> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                "SELECT * FROM collections WHERE id = ?1",
                &id.to_string(),
            )
        })
    }

    fn find_by_path(&self, path: &Path) -> Result<Option<Collection>, DatabaseError> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                "SELECT * FROM collections WHERE path = ?1",
                &path.to_string_lossy(),
            )
        })
    }

    fn update(&self, collection: &Collection) -> Result<bool, DatabaseError> {
        let images = to_json(&collection.images, "images")?;
        let thumbnails = to_json(&collection.thumbnails, "thumbnails")?;
        let cache_images = to_json(&collection.cache_images, "cache_images")?;

        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE collections SET name = ?2, kind = ?3, images = ?4, thumbnails = ?5,
                 cache_images = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    collection.id.to_string(),
                    collection.name,
                    collection.kind.as_str(),
                    images,
                    thumbnails,
                    cache_images,
                    format_timestamp(Utc::now()),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn clear_artifacts(&self, id: &CollectionId) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE collections SET images = '[]', thumbnails = '[]', cache_images = '[]',
                 updated_at = ?2
                 WHERE id = ?1",
                params![id.to_string(), format_timestamp(Utc::now())],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{ArtifactRef, ImageEntry};
    use crate::scan::CandidateCollection;

    fn test_repo() -> SqliteCollectionRepository {
        SqliteCollectionRepository::new(
            Database::open_in_memory().expect("Failed to create test database"),
        )
    }

    fn sample() -> Collection {
        let candidate = CandidateCollection::archive(Path::new("/media/set.zip"), CollectionKind::Zip);
        let mut collection = Collection::from_candidate(&candidate);
        collection.images.push(ImageEntry::new("img-1", "001.jpg"));
        collection.images.push(ImageEntry::new("img-2", "002.jpg"));
        collection.thumbnails.push(ArtifactRef::new("img-1"));
        collection
    }

    #[test]
    fn test_insert_and_find() {
        let repo = test_repo();
        let collection = sample();
        repo.insert(&collection).unwrap();

        let by_id = repo.find_by_id(&collection.id).unwrap().unwrap();
        assert_eq!(by_id.name, "set");
        assert_eq!(by_id.kind, CollectionKind::Zip);
        assert_eq!(by_id.images.len(), 2);
        assert_eq!(by_id.thumbnails, vec![ArtifactRef::new("img-1")]);

        let by_path = repo.find_by_path(Path::new("/media/set.zip")).unwrap().unwrap();
        assert_eq!(by_path.id, collection.id);
        assert!(repo.find_by_path(Path::new("/media/other.zip")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let repo = test_repo();
        let collection = sample();
        repo.insert(&collection).unwrap();
        assert!(repo.insert(&collection).is_err());
    }

    #[test]
    fn test_update_lists() {
        let repo = test_repo();
        let mut collection = sample();
        repo.insert(&collection).unwrap();

        collection.cache_images.push(ArtifactRef::new("img-2"));
        assert!(repo.update(&collection).unwrap());

        let found = repo.find_by_id(&collection.id).unwrap().unwrap();
        assert_eq!(found.cache_images.len(), 1);
    }

    #[test]
    fn test_clear_artifacts_keeps_metadata() {
        let repo = test_repo();
        let collection = sample();
        repo.insert(&collection).unwrap();

        assert!(repo.clear_artifacts(&collection.id).unwrap());
        let found = repo.find_by_id(&collection.id).unwrap().unwrap();
        assert!(found.images.is_empty());
        assert!(found.thumbnails.is_empty());
        assert_eq!(found.name, "set");
        assert_eq!(found.path, PathBuf::from("/media/set.zip"));
    }

    #[test]
    fn test_missing_collection() {
        let repo = test_repo();
        let id = CollectionId::for_path(Path::new("/nowhere"));
        assert!(repo.find_by_id(&id).unwrap().is_none());
        assert!(!repo.update(&sample()).unwrap());
        assert!(!repo.clear_artifacts(&id).unwrap());
    }
}
