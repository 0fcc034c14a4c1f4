//! Remote service client.
//!
//! A thin adapter over the backend's REST API. Only the calls the engine and
//! migration scripts need are exposed: database/collection management,
//! attribute listing and document CRUD.

use std::fmt;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::Credentials;
use crate::error::{MigrateResult, MigrationError};

/// Error returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Remote error {code} ({kind}): {message}")]
pub struct ServiceError {
    /// HTTP status code, `0` for transport failures.
    pub code: u16,
    /// Service error type, e.g. `collection_not_found`.
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(code: u16, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an error for a request that never got a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, "transport", message)
    }

    /// Resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }

    /// Resource already exists.
    pub fn is_conflict(&self) -> bool {
        self.code == 409
    }

    /// Server-side failure.
    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::new(status.as_u16(), "http", err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Connection handle to one remote project.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Create a client scoped to the given credentials.
    pub fn new(credentials: &Credentials) -> MigrateResult<Self> {
        url::Url::parse(&credentials.endpoint).map_err(|e| {
            MigrationError::configuration(format!("invalid ENDPOINT '{}': {}", credentials.endpoint, e))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("tidemark/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ServiceError::from)?;

        Ok(Self {
            http,
            endpoint: credentials.endpoint.trim_end_matches('/').to_string(),
            project_id: credentials.project_id.clone(),
            api_key: credentials.api_key.clone(),
        })
    }

    /// The project this client talks to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Database and collection management on this connection.
    pub fn databases(&self) -> Databases {
        Databases {
            client: self.clone(),
        }
    }

    /// Document store on this connection.
    pub fn documents(&self) -> Documents {
        Documents {
            client: self.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.endpoint, path))
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
    }

    /// Send a GET request with optional queries.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, queries: &[String]) -> Result<T, ServiceError> {
        let params: Vec<(&str, &str)> = queries.iter().map(|q| ("queries[]", q.as_str())).collect();
        self.send(self.request(Method::GET, path).query(&params)).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ServiceError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ServiceError> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let response = self.request(Method::DELETE, path).send().await?;
        check_status(response).await.map(|_| ())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => ServiceError::new(
            status.as_u16(),
            parsed.kind.unwrap_or_else(|| "unknown".to_string()),
            parsed.message,
        ),
        Err(_) => ServiceError::new(status.as_u16(), "unknown", body),
    })
}

/// Attribute descriptor as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeInfo {
    /// Attribute key.
    pub key: String,
    /// Attribute type.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Provisioning status (`available`, `processing`, `failed`, ...).
    #[serde(default)]
    pub status: String,
}

impl AttributeInfo {
    /// Whether the attribute is ready for use.
    pub fn is_available(&self) -> bool {
        self.status == "available"
    }
}

#[derive(Debug, Deserialize)]
struct AttributeList {
    #[serde(default)]
    attributes: Vec<AttributeInfo>,
}

/// Database and collection management.
#[derive(Debug, Clone)]
pub struct Databases {
    client: ServiceClient,
}

impl Databases {
    /// Fetch a database.
    pub async fn get(&self, database_id: &str) -> Result<Value, ServiceError> {
        self.client.get(&format!("/databases/{}", database_id), &[]).await
    }

    /// Create a database.
    pub async fn create(&self, database_id: &str, name: &str) -> Result<Value, ServiceError> {
        self.client
            .post("/databases", &json!({ "databaseId": database_id, "name": name }))
            .await
    }

    /// Fetch a collection.
    pub async fn get_collection(&self, database_id: &str, collection_id: &str) -> Result<Value, ServiceError> {
        self.client
            .get(&format!("/databases/{}/collections/{}", database_id, collection_id), &[])
            .await
    }

    /// Create a collection with document security disabled.
    pub async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        name: &str,
    ) -> Result<Value, ServiceError> {
        self.client
            .post(
                &format!("/databases/{}/collections", database_id),
                &json!({
                    "collectionId": collection_id,
                    "name": name,
                    "permissions": [],
                    "documentSecurity": false,
                }),
            )
            .await
    }

    /// Create a string attribute.
    pub async fn create_string_attribute(
        &self,
        database_id: &str,
        collection_id: &str,
        key: &str,
        size: u32,
        required: bool,
    ) -> Result<Value, ServiceError> {
        self.client
            .post(
                &format!("/databases/{}/collections/{}/attributes/string", database_id, collection_id),
                &json!({ "key": key, "size": size, "required": required }),
            )
            .await
    }

    /// Create a datetime attribute.
    pub async fn create_datetime_attribute(
        &self,
        database_id: &str,
        collection_id: &str,
        key: &str,
        required: bool,
    ) -> Result<Value, ServiceError> {
        self.client
            .post(
                &format!("/databases/{}/collections/{}/attributes/datetime", database_id, collection_id),
                &json!({ "key": key, "required": required }),
            )
            .await
    }

    /// List the attributes of a collection.
    pub async fn list_attributes(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<AttributeInfo>, ServiceError> {
        let list: AttributeList = self
            .client
            .get(&format!("/databases/{}/collections/{}/attributes", database_id, collection_id), &[])
            .await?;
        Ok(list.attributes)
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID.
    #[serde(rename = "$id")]
    pub id: String,
    /// Remaining fields, including system attributes.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// A page of documents.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentList {
    /// Total number of matching documents.
    #[serde(default)]
    pub total: u64,
    /// Documents in this page.
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Document store handle.
#[derive(Debug, Clone)]
pub struct Documents {
    client: ServiceClient,
}

impl Documents {
    fn path(database_id: &str, collection_id: &str) -> String {
        format!("/databases/{}/collections/{}/documents", database_id, collection_id)
    }

    /// List documents matching the given queries (see [`Query`]).
    pub async fn list(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[String],
    ) -> Result<DocumentList, ServiceError> {
        self.client.get(&Self::path(database_id, collection_id), queries).await
    }

    /// Fetch a single document.
    pub async fn get(&self, database_id: &str, collection_id: &str, document_id: &str) -> Result<Document, ServiceError> {
        self.client
            .get(&format!("{}/{}", Self::path(database_id, collection_id), document_id), &[])
            .await
    }

    /// Create a document with an explicit ID.
    pub async fn create(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, ServiceError> {
        self.client
            .post(
                &Self::path(database_id, collection_id),
                &json!({ "documentId": document_id, "data": data }),
            )
            .await
    }

    /// Update fields of a document.
    pub async fn update(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, ServiceError> {
        self.client
            .patch(
                &format!("{}/{}", Self::path(database_id, collection_id), document_id),
                &json!({ "data": data }),
            )
            .await
    }

    /// Delete a document.
    pub async fn delete(&self, database_id: &str, collection_id: &str, document_id: &str) -> Result<(), ServiceError> {
        self.client
            .delete(&format!("{}/{}", Self::path(database_id, collection_id), document_id))
            .await
    }
}

/// Query string builders for list endpoints.
pub struct Query;

impl Query {
    /// Limit the number of results.
    pub fn limit(limit: u32) -> String {
        json!({ "method": "limit", "values": [limit] }).to_string()
    }

    /// Skip the first `offset` results.
    pub fn offset(offset: u32) -> String {
        json!({ "method": "offset", "values": [offset] }).to_string()
    }

    /// Return only the given attributes.
    pub fn select(attributes: &[&str]) -> String {
        json!({ "method": "select", "values": attributes }).to_string()
    }

    /// Match documents whose attribute equals one of the values.
    pub fn equal(attribute: &str, values: &[Value]) -> String {
        json!({ "method": "equal", "attribute": attribute, "values": values }).to_string()
    }
}
