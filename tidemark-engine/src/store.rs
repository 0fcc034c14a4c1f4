//! Migration state tracking.
//!
//! Applied migrations are stored as documents in a remote collection, one
//! document per migration keyed by the migration's ID.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{Databases, Documents, Query, ServiceClient, ServiceError};
use crate::config::TrackingLocation;
use crate::error::{MigrateResult, MigrationError};
use crate::poller::AttributePoller;

/// Page size used when listing applied migrations.
pub const PAGE_SIZE: u32 = 100;

/// Upper bound on records read by [`StateStore::list_applied_ids`].
pub const MAX_APPLIED_RECORDS: u32 = 5000;

/// Maximum length of the `name` attribute.
pub const NAME_ATTRIBUTE_SIZE: u32 = 255;

const NAME_ATTRIBUTE: &str = "name";
const APPLIED_AT_ATTRIBUTE: &str = "appliedAt";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigrationRecord {
    /// Migration ID (document key).
    #[serde(rename = "$id")]
    pub id: String,
    /// Version directory name.
    pub name: String,
    /// When the migration completed.
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigrationRecord {
    /// A record for a migration completing now.
    pub fn now(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            applied_at: Utc::now(),
        }
    }

    /// Document body, without the key.
    pub fn data(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "appliedAt": self.applied_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

/// Migration state store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the tracking database and collection if missing.
    async fn ensure_tracking_collection(&self) -> MigrateResult<()>;

    /// IDs of all applied migrations. Empty if nothing is tracked yet.
    async fn list_applied_ids(&self) -> MigrateResult<BTreeSet<String>>;

    /// Record a migration as applied. Fails if it is already recorded.
    async fn record_applied(&self, id: &str, name: &str) -> MigrateResult<()>;
}

/// [`StateStore`] backed by the remote document store.
pub struct RemoteStateStore {
    client: ServiceClient,
    location: TrackingLocation,
    poll_interval: Duration,
}

impl RemoteStateStore {
    /// Create a store for `location` on the given connection.
    pub fn new(client: ServiceClient, location: TrackingLocation) -> Self {
        Self {
            client,
            location,
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Set the delay between attribute checks after creating the collection.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn databases(&self) -> Databases {
        self.client.databases()
    }

    fn documents(&self) -> Documents {
        self.client.documents()
    }

    async fn ensure_database(&self) -> Result<(), ServiceError> {
        let db = &self.location.database_id;
        match self.databases().get(db).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(database = %db, "Creating tracking database");
                self.databases().create(db, "Migrations").await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns whether any attribute had to be created.
    ///
    /// An existing collection is checked for both attributes, so a
    /// collection left half-created by an earlier failure is completed.
    async fn ensure_collection(&self) -> Result<bool, ServiceError> {
        let TrackingLocation {
            database_id: db,
            collection_id: coll,
        } = &self.location;
        let databases = self.databases();

        let existing: Vec<String> = match databases.get_collection(db, coll).await {
            Ok(_) => databases
                .list_attributes(db, coll)
                .await?
                .into_iter()
                .map(|a| a.key)
                .collect(),
            Err(e) if e.is_not_found() => {
                tracing::info!(database = %db, collection = %coll, "Creating tracking collection");
                databases.create_collection(db, coll, "Applied migrations").await?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let missing = |key: &str| !existing.iter().any(|k| k == key);

        let mut created = false;
        if missing(NAME_ATTRIBUTE) {
            tracing::info!(collection = %coll, attribute = NAME_ATTRIBUTE, "Creating tracking attribute");
            databases
                .create_string_attribute(db, coll, NAME_ATTRIBUTE, NAME_ATTRIBUTE_SIZE, true)
                .await?;
            created = true;
        }
        if missing(APPLIED_AT_ATTRIBUTE) {
            tracing::info!(collection = %coll, attribute = APPLIED_AT_ATTRIBUTE, "Creating tracking attribute");
            databases
                .create_datetime_attribute(db, coll, APPLIED_AT_ATTRIBUTE, true)
                .await?;
            created = true;
        }
        Ok(created)
    }
}

#[async_trait]
impl StateStore for RemoteStateStore {
    async fn ensure_tracking_collection(&self) -> MigrateResult<()> {
        self.ensure_database().await?;
        if self.ensure_collection().await? {
            AttributePoller::new(&self.client, self.poll_interval)
                .wait_for_table(&self.location.database_id, &self.location.collection_id)
                .await?;
        }
        Ok(())
    }

    async fn list_applied_ids(&self) -> MigrateResult<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        let mut offset = 0;
        let mut truncated = true;

        while offset < MAX_APPLIED_RECORDS {
            let queries = [Query::limit(PAGE_SIZE), Query::offset(offset), Query::select(&["$id"])];
            let page = match self
                .documents()
                .list(&self.location.database_id, &self.location.collection_id, &queries)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Tracking collection does not exist yet");
                    return Ok(BTreeSet::new());
                }
                Err(e) => return Err(e.into()),
            };

            let fetched = page.documents.len() as u32;
            ids.extend(page.documents.into_iter().map(|d| d.id));
            offset += fetched;

            if fetched < PAGE_SIZE || u64::from(offset) >= page.total {
                truncated = false;
                break;
            }
        }

        if truncated {
            tracing::warn!(limit = MAX_APPLIED_RECORDS, "Applied migration list truncated");
        }
        Ok(ids)
    }

    async fn record_applied(&self, id: &str, name: &str) -> MigrateResult<()> {
        let record = AppliedMigrationRecord::now(id, name);
        self.documents()
            .create(
                &self.location.database_id,
                &self.location.collection_id,
                &record.id,
                record.data(),
            )
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    MigrationError::state_write(format!("migration '{}' is already recorded", id))
                } else {
                    MigrationError::state_write(format!("could not record '{}': {}", id, e))
                }
            })?;
        Ok(())
    }
}
