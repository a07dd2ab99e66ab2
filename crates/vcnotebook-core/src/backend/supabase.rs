//! Supabase REST client: PostgREST tables and Storage objects.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::{ensure_success, AttachmentBackend, NoteBackend, ObjectStorage};
use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentId, NewAttachment, Note, NoteDraft, NoteId};
use crate::util::{is_http_url, trim_base_url};

/// Storage bucket holding attachment objects.
pub const DEFAULT_BUCKET: &str = "note-attachments";

const NOTES_TABLE: &str = "notes";
const ATTACHMENTS_TABLE: &str = "file_attachments";
const FTS_COLUMN: &str = "title_content_fts";

/// Client for one Supabase project, acting as the anonymous role or, when an
/// access token is attached, as the signed-in user.
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    bucket: String,
    client: Client,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let base_url = trim_base_url(url);
        if !is_http_url(&base_url) {
            return Err(Error::NotConfigured(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        let anon_key = anon_key.trim();
        if anon_key.is_empty() {
            return Err(Error::NotConfigured(
                "Supabase anon key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            anon_key: anon_key.to_string(),
            access_token: None,
            bucket: DEFAULT_BUCKET.to_string(),
            client: Client::builder().build()?,
        })
    }

    /// Act as the signed-in user instead of the anonymous role.
    #[must_use]
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = crate::util::normalize_text_option(Some(access_token.into()));
        self
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn object_url(&self, action: &str, path: &str) -> String {
        let encoded = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/storage/v1/object{action}/{}/{encoded}",
            self.base_url, self.bucket
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn fetch_rows<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        let response = self.authorize(request).send().await?;
        Ok(ensure_success(response).await?.json::<Vec<T>>().await?)
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl NoteBackend for SupabaseClient {
    async fn list_notes(&self, user_id: &str) -> Result<Vec<Note>> {
        self.fetch_rows(self.client.get(self.table_url(NOTES_TABLE)).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "updated_at.desc".to_string()),
        ]))
        .await
    }

    async fn search_notes(&self, user_id: &str, term: &str) -> Result<Vec<Note>> {
        self.fetch_rows(self.client.get(self.table_url(NOTES_TABLE)).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            (FTS_COLUMN, format!("fts.{}", term.trim())),
            ("order", "updated_at.desc".to_string()),
        ]))
        .await
    }

    async fn insert_note(&self, draft: &NoteDraft) -> Result<Note> {
        let rows: Vec<Note> = self
            .fetch_rows(
                self.client
                    .post(self.table_url(NOTES_TABLE))
                    .header("Prefer", "return=representation")
                    .json(draft),
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| Error::Api {
            status: 200,
            message: "Insert did not return the stored note".to_string(),
        })
    }

    async fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note> {
        let rows: Vec<Note> = self
            .fetch_rows(
                self.client
                    .patch(self.table_url(NOTES_TABLE))
                    .query(&[("id", eq(id.as_str())), ("user_id", eq(&draft.user_id))])
                    .header("Prefer", "return=representation")
                    .json(draft),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("note {id}")))
    }

    async fn delete_note(&self, user_id: &str, id: &NoteId) -> Result<()> {
        let request = self
            .client
            .delete(self.table_url(NOTES_TABLE))
            .query(&[("id", eq(id.as_str())), ("user_id", eq(user_id))]);
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentBackend for SupabaseClient {
    async fn list_attachments(&self, note_id: &NoteId) -> Result<Vec<Attachment>> {
        self.fetch_rows(self.client.get(self.table_url(ATTACHMENTS_TABLE)).query(&[
            ("select", "*".to_string()),
            ("note_id", eq(note_id.as_str())),
            ("order", "created_at.desc".to_string()),
        ]))
        .await
    }

    async fn insert_attachments(&self, rows: &[NewAttachment]) -> Result<Vec<Attachment>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_rows(
            self.client
                .post(self.table_url(ATTACHMENTS_TABLE))
                .header("Prefer", "return=representation")
                .json(rows),
        )
        .await
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> Result<()> {
        let request = self
            .client
            .delete(self.table_url(ATTACHMENTS_TABLE))
            .query(&[("id", eq(id.as_str()))]);
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let request = self
            .client
            .post(self.object_url("", path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        let response = self.authorize(request).send().await?;
        ensure_success(response)
            .await
            .map_err(|error| storage_error("upload", path, error))?;
        Ok(())
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/storage/v1/object/{}", self.base_url, self.bucket))
            .json(&serde_json::json!({ "prefixes": [path] }));
        let response = self.authorize(request).send().await?;
        ensure_success(response)
            .await
            .map_err(|error| storage_error("remove", path, error))?;
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        let request = self
            .client
            .post(self.object_url("/sign", path))
            .json(&serde_json::json!({ "expiresIn": expires_in_secs }));
        let response = self.authorize(request).send().await?;
        let payload = ensure_success(response)
            .await
            .map_err(|error| storage_error("sign", path, error))?
            .json::<SignedUrlResponse>()
            .await?;

        if is_http_url(&payload.signed_url) {
            return Ok(payload.signed_url);
        }
        let relative = payload.signed_url.trim_start_matches('/');
        Ok(format!("{}/storage/v1/{relative}", self.base_url))
    }
}

/// Keep credential and transport failures classified; everything else from
/// the storage API is a storage error.
fn storage_error(action: &str, path: &str, error: Error) -> Error {
    match error {
        Error::Api { status, message } => {
            Error::Storage(format!("Failed to {action} {path} (HTTP {status}): {message}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn note_row(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "content": "body",
            "user_id": "user-1",
            "created_at": "2024-05-01T10:00:00.123456+00:00",
            "updated_at": "2024-05-02T10:00:00+00:00"
        })
    }

    fn client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(&server.uri(), "anon-key").unwrap()
    }

    #[test]
    fn new_rejects_unusable_configuration() {
        assert!(SupabaseClient::new("demo.supabase.co", "key").is_err());
        assert!(SupabaseClient::new("https://demo.supabase.co", "  ").is_err());
        let client = SupabaseClient::new("https://demo.supabase.co/", "key").unwrap();
        assert_eq!(client.base_url(), "https://demo.supabase.co");
    }

    #[test]
    fn debug_redacts_keys() {
        let client = SupabaseClient::new("https://demo.supabase.co", "anon-secret")
            .unwrap()
            .with_access_token("user-secret");
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("anon-secret"));
        assert!(!rendered.contains("user-secret"));
    }

    #[tokio::test]
    async fn list_notes_scopes_to_user_and_sends_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/notes"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("order", "updated_at.desc"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([note_row("b", "Second"), note_row("a", "First")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let notes = client(&server)
            .with_access_token("user-token")
            .list_notes("user-1")
            .await
            .unwrap();
        let ids: Vec<_> = notes.iter().map(|note| note.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn search_uses_full_text_column() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/notes"))
            .and(query_param("title_content_fts", "fts.milk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([note_row("a", "Milk")])))
            .expect(1)
            .mount(&server)
            .await;

        let notes = client(&server).search_notes("user-1", " milk ").await.unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn insert_returns_stored_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/notes"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([note_row("uuid-1", "Hello")])))
            .mount(&server)
            .await;

        let draft = NoteDraft::from_input("user-1", "Hello", "", chrono::Utc::now(), true).unwrap();
        let note = client(&server).insert_note(&draft).await.unwrap();
        assert_eq!(note.id.as_str(), "uuid-1");
    }

    #[tokio::test]
    async fn update_without_rows_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/notes"))
            .and(query_param("id", "eq.missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let draft = NoteDraft::from_input("user-1", "T", "", chrono::Utc::now(), false).unwrap();
        let error = client(&server)
            .update_note(&NoteId::new("missing"), &draft)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn expired_token_is_a_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/notes"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})))
            .mount(&server)
            .await;

        let error = client(&server).list_notes("user-1").await.unwrap_err();
        assert!(error.is_transport_or_credential());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let client = SupabaseClient::new("http://127.0.0.1:9", "anon-key").unwrap();
        let error = client.list_notes("user-1").await.unwrap_err();
        assert!(matches!(error, Error::Transport(_)), "{error:?}");
    }

    #[tokio::test]
    async fn attachments_are_inserted_in_one_request() {
        let server = MockServer::start().await;
        let row = json!({
            "id": "att-1",
            "note_id": "note-1",
            "user_id": "user-1",
            "file_name": "a.png",
            "file_size": 3,
            "file_type": "image/png",
            "storage_path": "user-1/1_x.png",
            "storage_bucket": "note-attachments",
            "created_at": "2024-05-01T10:00:00+00:00"
        });
        Mock::given(method("POST"))
            .and(path("/rest/v1/file_attachments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row])))
            .expect(1)
            .mount(&server)
            .await;

        let new_row = NewAttachment {
            note_id: NoteId::new("note-1"),
            user_id: "user-1".to_string(),
            file_name: "a.png".to_string(),
            file_size: 3,
            file_type: "image/png".to_string(),
            storage_path: "user-1/1_x.png".to_string(),
            storage_bucket: DEFAULT_BUCKET.to_string(),
        };
        let stored = client(&server).insert_attachments(&[new_row]).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_temporary);
        assert_eq!(stored[0].note_id, Some(NoteId::new("note-1")));
    }

    #[tokio::test]
    async fn signed_url_is_resolved_against_storage_root() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/note-attachments/user-1/1_x.png"))
            .and(body_json(json!({"expiresIn": 3600})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "signedURL": "/object/sign/note-attachments/user-1/1_x.png?token=abc"
            })))
            .mount(&server)
            .await;

        let url = client(&server).signed_url("user-1/1_x.png", 3600).await.unwrap();
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/sign/note-attachments/user-1/1_x.png?token=abc",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn upload_failure_is_a_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/note-attachments/user-1/big.bin"))
            .respond_with(
                ResponseTemplate::new(413).set_body_json(json!({"error": "Payload too large"})),
            )
            .mount(&server)
            .await;

        let error = client(&server)
            .upload_object("user-1/big.bin", vec![0; 4], "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Storage(message) if message.contains("413")));
    }
}
