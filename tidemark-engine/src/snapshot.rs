//! Schema snapshot documents.
//!
//! Snapshots are the JSON files exported by the schema tool. Tidemark only
//! reads the parts it needs (tables and their attributes) and otherwise
//! treats the document as opaque.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{MigrateResult, MigrationError};

/// A database declared in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseDecl {
    /// Database ID.
    #[serde(rename = "$id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// An attribute (column) declared on a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeDecl {
    /// Attribute key.
    pub key: String,
    /// Declared type.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Status at export time.
    #[serde(default)]
    pub status: Option<String>,
}

/// A table (collection) declared in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableDecl {
    /// Table ID.
    #[serde(rename = "$id")]
    pub id: String,
    /// Parent database ID.
    #[serde(default, rename = "databaseId")]
    pub database_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Declared attributes.
    #[serde(default, alias = "columns")]
    pub attributes: Vec<AttributeDecl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default, alias = "tablesDB")]
    databases: Vec<DatabaseDecl>,
    #[serde(default)]
    tables: Vec<TableDecl>,
    #[serde(default)]
    collections: Vec<TableDecl>,
}

/// Decoded view of a schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    /// Project the snapshot was exported from.
    pub project_id: Option<String>,
    /// Declared databases.
    pub databases: Vec<DatabaseDecl>,
    /// Declared tables and collections.
    pub tables: Vec<TableDecl>,
}

impl SchemaSnapshot {
    /// Decode a snapshot from JSON text.
    pub fn parse(content: &str) -> MigrateResult<Self> {
        let raw: RawSnapshot = serde_json::from_str(content)?;
        let mut tables = raw.tables;
        tables.extend(raw.collections);

        Ok(Self {
            project_id: raw.project_id,
            databases: raw.databases,
            tables,
        })
    }

    /// Read and decode a snapshot file.
    pub async fn load(path: &Path) -> MigrateResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content).map_err(|e| match e {
            MigrationError::Json(err) => MigrationError::SchemaPush(format!(
                "invalid snapshot {}: {}",
                path.display(),
                err
            )),
            other => other,
        })
    }

    /// Resolve the parent database of a table.
    ///
    /// Falls back to the only declared database when the table omits one.
    pub fn database_for<'a>(&'a self, table: &'a TableDecl) -> Option<&'a str> {
        match table.database_id.as_deref() {
            Some(id) if !id.is_empty() => Some(id),
            _ => match self.databases.as_slice() {
                [only] => Some(only.id.as_str()),
                _ => None,
            },
        }
    }
}

/// Rewrite the embedded project ID of a snapshot document.
///
/// Lets one snapshot be replayed against any environment.
pub fn retarget_project(content: &str, project_id: &str) -> MigrateResult<String> {
    let mut document: Value = serde_json::from_str(content)?;
    let object = document
        .as_object_mut()
        .ok_or_else(|| MigrationError::schema_push("snapshot root must be a JSON object"))?;
    object.insert("projectId".to_string(), Value::String(project_id.to_string()));
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "projectId": "staging",
        "projectName": "Shop",
        "databases": [{ "$id": "main", "name": "Main" }],
        "tables": [
            { "$id": "orders", "databaseId": "main", "name": "Orders",
              "columns": [{ "key": "total", "type": "double", "status": "available" }] }
        ],
        "collections": [
            { "$id": "profiles", "name": "Profiles",
              "attributes": [{ "key": "bio", "type": "string" }] }
        ],
        "buckets": []
    }"#;

    #[test]
    fn test_parse_merges_tables_and_collections() {
        let snapshot = SchemaSnapshot::parse(SNAPSHOT).unwrap();

        assert_eq!(snapshot.project_id.as_deref(), Some("staging"));
        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.tables[0].attributes[0].key, "total");
        assert_eq!(snapshot.tables[1].attributes[0].status, None);
    }

    #[test]
    fn test_database_resolution() {
        let snapshot = SchemaSnapshot::parse(SNAPSHOT).unwrap();
        assert_eq!(snapshot.database_for(&snapshot.tables[0]), Some("main"));
        // Falls back to the single declared database.
        assert_eq!(snapshot.database_for(&snapshot.tables[1]), Some("main"));

        let ambiguous = SchemaSnapshot::parse(
            r#"{ "databases": [{ "$id": "a" }, { "$id": "b" }], "collections": [{ "$id": "x" }] }"#,
        )
        .unwrap();
        assert_eq!(ambiguous.database_for(&ambiguous.tables[0]), None);
    }

    #[test]
    fn test_retarget_project() {
        let rewritten = retarget_project(SNAPSHOT, "production").unwrap();
        let value: Value = serde_json::from_str(&rewritten).unwrap();

        assert_eq!(value["projectId"], "production");
        assert_eq!(value["projectName"], "Shop");
        assert_eq!(value["tables"][0]["$id"], "orders");
    }

    #[test]
    fn test_retarget_rejects_non_object() {
        assert!(retarget_project("[1, 2]", "p").is_err());
    }
}
