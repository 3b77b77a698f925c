use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::sleep;

use super::{DocumentStore, Order, Query, Snapshot, Subscription};
use crate::error::StoreError;
use crate::rooms::{Message, NewMessage, Timestamp};

const API_ROOT: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;
const AUTO_ID_LEN: usize = 20;

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
    error: Option<ApiError>,
}

/// Firestore REST backend.
///
/// Live queries are served by polling `runQuery`; a new snapshot is pushed
/// only when the result set differs from the previous one.
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http: reqwest::Client,
    documents_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    id_token: Arc<RwLock<Option<String>>>,
}

impl FirestoreStore {
    pub fn new(project_id: &str, api_key: Option<String>, poll_interval: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            documents_url: format!("{}/projects/{}/databases/(default)/documents", API_ROOT, project_id),
            api_key,
            poll_interval,
            id_token: Arc::new(RwLock::new(None)),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.query(&[("key", key)]);
        }
        let token = self
            .id_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn run_query(&self, collection: &str, query: &Query) -> Result<Vec<Message>, StoreError> {
        let url = format!("{}:runQuery", self.documents_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&structured_query(collection, query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(classify_error_body(&body, status.as_u16()));
        }
        parse_run_query(response.json().await?)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn scan_all(&self, collection: &str) -> Result<Vec<Message>, StoreError> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(reqwest::Method::GET, &url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                return Err(classify_error_body(&body, status.as_u16()));
            }

            let page: ListResponse = response.json().await?;
            messages.extend(page.documents.iter().filter_map(decode_document));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(collection, count = messages.len(), "scanned collection");
        Ok(messages)
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription, StoreError> {
        let store = self.clone();
        let collection = collection.to_string();

        Ok(Subscription::spawn(move |tx| async move {
            let mut last: Option<Vec<Message>> = None;
            loop {
                match store.run_query(&collection, &query).await {
                    Ok(messages) => {
                        if last.as_ref() != Some(&messages) {
                            last = Some(messages.clone());
                            if tx.send(Ok(Snapshot { messages })).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) if err.is_transient() => {
                        tracing::warn!(%collection, error = %err, "poll failed, retrying");
                    }
                    Err(err) => {
                        // A failed listener stops; the caller decides how to recover.
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
                sleep(store.poll_interval).await;
            }
        }))
    }

    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, StoreError> {
        let id = auto_id();
        let url = format!("{}:commit", self.documents_url);
        let document_name = format!("{}/{}/{}", self.document_root(), collection, id);

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&commit_body(&document_name, &record))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(classify_error_body(&body, status.as_u16()));
        }

        tracing::debug!(collection, id = %id, "committed message");
        Ok(id)
    }

    fn set_credential(&self, id_token: Option<String>) {
        *self
            .id_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = id_token;
    }
}

impl FirestoreStore {
    /// Resource name prefix used inside request bodies.
    fn document_root(&self) -> &str {
        self.documents_url
            .strip_prefix(API_ROOT)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(&self.documents_url)
    }
}

/// Firestore-style random document id.
fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}

fn structured_query(collection: &str, query: &Query) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": collection }],
    });
    if let Some(room) = &query.room {
        structured["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": "room" },
                "op": "EQUAL",
                "value": { "stringValue": room },
            }
        });
    }
    if let Some(Order::CreatedAtAscending) = query.order {
        structured["orderBy"] = json!([{
            "field": { "fieldPath": "createdAt" },
            "direction": "ASCENDING",
        }]);
    }
    json!({ "structuredQuery": structured })
}

fn commit_body(document_name: &str, record: &NewMessage) -> Value {
    json!({
        "writes": [{
            "update": {
                "name": document_name,
                "fields": {
                    "text": { "stringValue": record.text },
                    "user": { "stringValue": record.author },
                    "room": { "stringValue": record.room },
                },
            },
            "updateTransforms": [{
                "fieldPath": "createdAt",
                "setToServerValue": "REQUEST_TIME",
            }],
            "currentDocument": { "exists": false },
        }]
    })
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name)?.get("stringValue")?.as_str()
}

fn timestamp_field(fields: &Map<String, Value>, name: &str) -> Timestamp {
    fields
        .get(name)
        .and_then(|value| value.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
        .into()
}

fn decode_document(document: &Document) -> Option<Message> {
    let id = document.name.rsplit('/').next().unwrap_or_default();
    let (Some(text), Some(room)) = (
        string_field(&document.fields, "text"),
        string_field(&document.fields, "room"),
    ) else {
        tracing::warn!(document = %document.name, "skipping document without text or room");
        return None;
    };

    Some(Message {
        id: id.to_string(),
        text: text.to_string(),
        author: string_field(&document.fields, "user").unwrap_or_default().to_string(),
        room: room.to_string(),
        created_at: timestamp_field(&document.fields, "createdAt"),
    })
}

fn parse_run_query(body: Value) -> Result<Vec<Message>, StoreError> {
    let items: Vec<RunQueryItem> =
        serde_json::from_value(body).map_err(|e| StoreError::failed(format!("malformed query response: {}", e)))?;

    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        if let Some(error) = item.error {
            return Err(classify_error(&error));
        }
        if let Some(document) = item.document {
            messages.extend(decode_document(&document));
        }
    }
    Ok(messages)
}

fn classify_error(error: &ApiError) -> StoreError {
    match error.status.as_str() {
        "FAILED_PRECONDITION" => StoreError::OrderingUnsupported(error.message.clone()),
        "UNAVAILABLE" | "DEADLINE_EXCEEDED" => StoreError::Unavailable(error.message.clone()),
        _ => StoreError::Failed(error.message.clone()),
    }
}

/// Errors come back either as one envelope or inside a `runQuery` array.
fn classify_error_body(body: &Value, http_status: u16) -> StoreError {
    let envelope = match body {
        Value::Array(items) => items.iter().find_map(|item| serde_json::from_value::<ErrorEnvelope>(item.clone()).ok()),
        other => serde_json::from_value::<ErrorEnvelope>(other.clone()).ok(),
    };
    let err = match envelope {
        Some(envelope) => classify_error(&envelope.error),
        None => StoreError::Failed(format!("request failed with HTTP {}", http_status)),
    };
    match err {
        StoreError::Failed(detail) if http_status >= 500 => StoreError::Unavailable(detail),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ordered_room_query() {
        let body = structured_query("messages", &Query::room("general").ordered_by_created_at());
        let query = &body["structuredQuery"];
        assert_eq!(query["from"][0]["collectionId"], "messages");
        assert_eq!(query["where"]["fieldFilter"]["value"]["stringValue"], "general");
        assert_eq!(query["orderBy"][0]["field"]["fieldPath"], "createdAt");
    }

    #[test]
    fn unordered_query_has_no_order_clause() {
        let body = structured_query("messages", &Query::room("general"));
        assert!(body["structuredQuery"].get("orderBy").is_none());

        let body = structured_query("messages", &Query::all());
        assert!(body["structuredQuery"].get("where").is_none());
    }

    #[test]
    fn commit_requests_server_timestamp() {
        let record = NewMessage {
            text: "  hi  ".into(),
            author: "<b>alice</b>".into(),
            room: "general".into(),
        };
        let body = commit_body("projects/p/databases/(default)/documents/messages/abc", &record);
        let write = &body["writes"][0];
        assert_eq!(write["update"]["fields"]["text"]["stringValue"], "  hi  ");
        assert_eq!(write["update"]["fields"]["user"]["stringValue"], "<b>alice</b>");
        assert_eq!(write["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
    }

    #[test]
    fn decodes_run_query_results_with_pending_timestamps() {
        let body = json!([
            {
                "document": {
                    "name": "projects/p/databases/(default)/documents/messages/m1",
                    "fields": {
                        "text": { "stringValue": "hi" },
                        "user": { "stringValue": "alice" },
                        "room": { "stringValue": "general" },
                        "createdAt": { "timestampValue": "2024-05-01T12:00:00.123456Z" }
                    }
                },
                "readTime": "2024-05-01T12:00:01Z"
            },
            {
                "document": {
                    "name": "projects/p/databases/(default)/documents/messages/m2",
                    "fields": {
                        "text": { "stringValue": "there" },
                        "room": { "stringValue": "general" },
                        "createdAt": { "nullValue": null }
                    }
                }
            },
            { "readTime": "2024-05-01T12:00:01Z" }
        ]);

        let messages = parse_run_query(body).expect("response should decode");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert!(messages[0].created_at.resolved().is_some());
        assert_eq!(messages[1].author, "");
        assert_eq!(messages[1].created_at, Timestamp::Pending);
    }

    #[test]
    fn skips_documents_without_room() {
        let body = json!([{
            "document": {
                "name": "projects/p/databases/(default)/documents/messages/m1",
                "fields": { "text": { "stringValue": "orphan" } }
            }
        }]);
        assert!(parse_run_query(body).expect("response should decode").is_empty());
    }

    #[test]
    fn failed_precondition_means_missing_index() {
        let body = json!([{
            "error": {
                "code": 400,
                "message": "The query requires an index. You can create it here: https://console.firebase.google.com/...",
                "status": "FAILED_PRECONDITION"
            }
        }]);
        assert!(classify_error_body(&body, 400).is_ordering_unsupported());

        let body = json!({
            "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
        });
        assert_eq!(
            classify_error_body(&body, 403),
            StoreError::Failed("Missing or insufficient permissions.".into())
        );

    }

    #[test]
    fn outages_are_transient_and_rule_rejections_are_not() {
        let body = json!({
            "error": { "code": 503, "message": "The service is currently unavailable.", "status": "UNAVAILABLE" }
        });
        assert!(classify_error_body(&body, 503).is_transient());

        let body = json!([{
            "error": { "code": 504, "message": "Deadline exceeded", "status": "DEADLINE_EXCEEDED" }
        }]);
        assert!(classify_error_body(&body, 504).is_transient());

        // HTML error pages from a proxy carry no envelope.
        assert_eq!(
            classify_error_body(&Value::Null, 502),
            StoreError::Unavailable("request failed with HTTP 502".into())
        );

        for (status, code) in [("PERMISSION_DENIED", 403), ("INVALID_ARGUMENT", 400), ("FAILED_PRECONDITION", 400)] {
            let body = json!({ "error": { "code": code, "message": "nope", "status": status } });
            assert!(!classify_error_body(&body, code).is_transient(), "{} should end the listener", status);
        }
        assert!(!classify_error_body(&Value::Null, 404).is_transient());
    }

    #[test]
    fn auto_ids_look_like_firestore_ids() {
        let id = auto_id();
        assert_eq!(id.len(), AUTO_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn resource_names_drop_the_api_root() {
        let store = FirestoreStore::new("demo", None, Duration::from_millis(500)).expect("client should build");
        assert_eq!(store.document_root(), "projects/demo/databases/(default)/documents");
    }
}
