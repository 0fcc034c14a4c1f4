//! Attribute-availability polling.
//!
//! Attribute creation is asynchronous on the remote side: a pushed schema is
//! accepted immediately but its attributes stay `processing` for a while.
//! Data logic must not run until every declared attribute is `available`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::{AttributeInfo, ServiceClient, ServiceError};
use crate::error::{MigrateResult, MigrationError};
use crate::snapshot::SchemaSnapshot;

/// Source of remote attribute status.
#[async_trait]
pub trait AttributeStatusSource: Send + Sync {
    /// List the attributes of a table with their current status.
    async fn list_attributes(&self, database_id: &str, table_id: &str) -> Result<Vec<AttributeInfo>, ServiceError>;
}

#[async_trait]
impl AttributeStatusSource for ServiceClient {
    async fn list_attributes(&self, database_id: &str, table_id: &str) -> Result<Vec<AttributeInfo>, ServiceError> {
        self.databases().list_attributes(database_id, table_id).await
    }
}

/// Blocks until the attributes declared in a snapshot are available.
pub struct AttributePoller<'a> {
    source: &'a dyn AttributeStatusSource,
    interval: Duration,
    timeout: Option<Duration>,
}

impl<'a> AttributePoller<'a> {
    /// Create a poller with the given retry interval and no overall bound.
    pub fn new(source: &'a dyn AttributeStatusSource, interval: Duration) -> Self {
        Self {
            source,
            interval,
            timeout: None,
        }
    }

    /// Bound the wait per table.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for every table in `snapshot`.
    pub async fn wait_for_snapshot(&self, snapshot: &SchemaSnapshot) -> MigrateResult<()> {
        for table in &snapshot.tables {
            let Some(database_id) = snapshot.database_for(table) else {
                tracing::warn!(table = %table.id, "No database ID for table, skipping attribute check");
                continue;
            };
            self.wait_for_table(database_id, &table.id).await?;
        }
        Ok(())
    }

    /// Wait until every attribute of one table is available.
    ///
    /// A server-side error ends the wait for that table; any other error is
    /// retried after the interval.
    pub async fn wait_for_table(&self, database_id: &str, table_id: &str) -> MigrateResult<()> {
        let started = Instant::now();

        loop {
            match self.source.list_attributes(database_id, table_id).await {
                Ok(attributes) => {
                    let pending: Vec<&str> = attributes
                        .iter()
                        .filter(|a| !a.is_available())
                        .map(|a| a.key.as_str())
                        .collect();
                    if pending.is_empty() {
                        tracing::debug!(table = %table_id, "All attributes available");
                        return Ok(());
                    }
                    tracing::info!(
                        table = %table_id,
                        pending = %pending.join(", "),
                        "Waiting for attributes"
                    );
                }
                Err(e) if e.is_server_error() => {
                    tracing::warn!(table = %table_id, error = %e, "Server error while checking attributes, giving up on table");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(table = %table_id, error = %e, "Attribute check failed, retrying");
                }
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() + self.interval > limit {
                    return Err(MigrationError::PollTimeout {
                        table: table_id.to_string(),
                    });
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses; repeats the last one when exhausted.
    struct Replay {
        responses: Mutex<VecDeque<Result<Vec<AttributeInfo>, ServiceError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Replay {
        fn new(responses: Vec<Result<Vec<AttributeInfo>, ServiceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AttributeStatusSource for Replay {
        async fn list_attributes(&self, database_id: &str, table_id: &str) -> Result<Vec<AttributeInfo>, ServiceError> {
            self.calls.lock().unwrap().push(format!("{}/{}", database_id, table_id));
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn attr(key: &str, status: &str) -> AttributeInfo {
        AttributeInfo {
            key: key.to_string(),
            kind: "string".to_string(),
            status: status.to_string(),
        }
    }

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::parse(
            r#"{ "tables": [{ "$id": "orders", "databaseId": "main", "columns": [{ "key": "total" }] }] }"#,
        )
        .unwrap()
    }

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_returns_without_sleeping_when_available() {
        let source = Replay::new(vec![Ok(vec![attr("total", "available")])]);
        let start = Instant::now();

        AttributePoller::new(&source, INTERVAL)
            .wait_for_snapshot(&snapshot())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(source.calls(), vec!["main/orders"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_retry_takes_exactly_one_interval() {
        let source = Replay::new(vec![
            Ok(vec![attr("total", "processing")]),
            Ok(vec![attr("total", "available")]),
        ]);
        let start = Instant::now();

        AttributePoller::new(&source, INTERVAL)
            .wait_for_snapshot(&snapshot())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), INTERVAL);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let source = Replay::new(vec![
            Err(ServiceError::transport("connection reset")),
            Err(ServiceError::new(404, "collection_not_found", "not yet")),
            Ok(vec![attr("total", "available")]),
        ]);

        AttributePoller::new(&source, INTERVAL)
            .wait_for_table("main", "orders")
            .await
            .unwrap();

        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_gives_up_on_table() {
        let source = Replay::new(vec![Err(ServiceError::new(500, "general_unknown", "boom"))]);
        let start = Instant::now();

        AttributePoller::new(&source, INTERVAL)
            .wait_for_table("main", "orders")
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_without_database_is_skipped() {
        let source = Replay::new(vec![Ok(vec![])]);
        let snapshot = SchemaSnapshot::parse(r#"{ "collections": [{ "$id": "orphan" }] }"#).unwrap();

        AttributePoller::new(&source, INTERVAL)
            .wait_for_snapshot(&snapshot)
            .await
            .unwrap();

        assert!(source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opt_in_timeout() {
        let source = Replay::new(vec![Ok(vec![attr("total", "processing")])]);

        let err = AttributePoller::new(&source, INTERVAL)
            .with_timeout(Some(Duration::from_secs(5)))
            .wait_for_table("main", "orders")
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::PollTimeout { ref table } if table == "orders"));
    }
}
