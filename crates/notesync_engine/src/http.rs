//! HTTP transport implementation.
//!
//! This module maps notes onto a REST resource:
//!
//! - `GET  {base}/notes/{key}` returns a note document or 404
//! - `PUT  {base}/notes/{key}` stores a note document
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! depend on a particular HTTP library.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::NoteTransport;
use notesync_store::Note;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err` means
/// no response was received at all (DNS, connection, TLS...); HTTP error
/// statuses are returned as responses.
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a PUT request with a JSON body.
    fn put_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        (**self).get(url)
    }

    fn put_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        (**self).put_json(url, body)
    }
}

/// HTTP-based note transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: Url,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `base_url` is not an absolute
    /// URL that can carry path segments.
    pub fn new(base_url: &str, client: C) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidConfig(format!(
                "base url {base_url} cannot carry a path"
            )));
        }
        Ok(Self { base_url, client })
    }

    /// Creates a transport for the server named in `config`.
    pub fn from_config(config: &SyncConfig, client: C) -> SyncResult<Self> {
        Self::new(&config.base_url, client)
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the resource URL for `key`, percent-encoded as one segment.
    pub fn note_url(&self, key: &str) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::InvalidConfig(format!("base url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .push("notes")
            .push(key);
        Ok(url)
    }
}

impl<C: HttpClient> NoteTransport for HttpTransport<C> {
    fn fetch(&self, key: &str) -> SyncResult<Option<Note>> {
        let url = self.note_url(key)?;
        let response = self
            .client
            .get(url.as_str())
            .map_err(|e| SyncError::fetch(key, e))?;

        if response.status == 404 {
            debug!(key = %key, "remote has no such note");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(SyncError::fetch(
                key,
                format!("unexpected status {}", response.status),
            ));
        }

        let note = Note::decode(&response.body)?;
        if note.key != key {
            return Err(SyncError::fetch(
                key,
                format!("server answered with note {:?}", note.key),
            ));
        }
        debug!(key = %key, version = note.version, "fetched note");
        Ok(Some(note))
    }

    fn push(&self, note: &Note) -> SyncResult<String> {
        let url = self.note_url(&note.key)?;
        let body = note.encode()?;
        let response = self
            .client
            .put_json(url.as_str(), body)
            .map_err(|e| SyncError::write(&note.key, e))?;

        if !response.is_success() {
            return Err(SyncError::write(
                &note.key,
                format!("unexpected status {}", response.status),
            ));
        }

        let ack = String::from_utf8_lossy(&response.body).into_owned();
        info!(key = %note.key, version = note.version, response = %ack, "pushed note");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TestClient {
        response: Mutex<Option<HttpResponse>>,
        requests: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl TestClient {
        fn respond(&self, status: u16, body: &str) {
            *self.response.lock() = Some(HttpResponse::new(status, body.as_bytes()));
        }

        fn requests(&self) -> Vec<(String, String, Vec<u8>)> {
            self.requests.lock().clone()
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, url: &str) -> Result<HttpResponse, String> {
            self.requests
                .lock()
                .push(("GET".into(), url.into(), Vec::new()));
            self.response
                .lock()
                .clone()
                .ok_or_else(|| "connection refused".into())
        }

        fn put_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
            self.requests.lock().push(("PUT".into(), url.into(), body));
            self.response
                .lock()
                .clone()
                .ok_or_else(|| "connection refused".into())
        }
    }

    fn transport() -> HttpTransport<TestClient> {
        HttpTransport::new("https://notes.example.com", TestClient::default()).unwrap()
    }

    #[test]
    fn note_url_percent_encodes_key() {
        let transport = transport();
        assert_eq!(
            transport.note_url("my shopping/list").unwrap().as_str(),
            "https://notes.example.com/notes/my%20shopping%2Flist"
        );

        let nested = HttpTransport::new("https://example.com/api/", TestClient::default()).unwrap();
        assert_eq!(
            nested.note_url("A").unwrap().as_str(),
            "https://example.com/api/notes/A"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpTransport::new("not a url", TestClient::default()),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpTransport::new("mailto:notes@example.com", TestClient::default()),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fetch_decodes_note() {
        let transport = transport();
        transport
            .client
            .respond(200, r#"{"title":"A","content":"hello","version":3}"#);

        let note = transport.fetch("A").unwrap().unwrap();
        assert_eq!(note, Note::new("A", "hello").with_version(3));
        assert_eq!(transport.client.requests()[0].0, "GET");
    }

    #[test]
    fn fetch_not_found() {
        let transport = transport();
        transport
            .client
            .respond(404, r#"{"detail":"Note not found."}"#);
        assert_eq!(transport.fetch("A").unwrap(), None);
    }

    #[test]
    fn fetch_failures() {
        let transport = transport();
        assert!(matches!(transport.fetch("A"), Err(SyncError::Fetch { .. })));

        transport.client.respond(500, "oops");
        assert!(matches!(transport.fetch("A"), Err(SyncError::Fetch { .. })));

        transport.client.respond(200, "<html>");
        assert!(matches!(transport.fetch("A"), Err(SyncError::Decode(_))));

        transport
            .client
            .respond(200, r#"{"title":"B","content":"","version":1}"#);
        assert!(matches!(transport.fetch("A"), Err(SyncError::Fetch { .. })));
    }

    #[test]
    fn push_sends_json_body() {
        let transport = transport();
        transport.client.respond(200, r#"{"ok":true}"#);

        let note = Note::new("A b", "new").with_version(6);
        let ack = transport.push(&note).unwrap();
        assert_eq!(ack, r#"{"ok":true}"#);

        let (method, url, body) = transport.client.requests().remove(0);
        assert_eq!(method, "PUT");
        assert_eq!(url, "https://notes.example.com/notes/A%20b");
        assert_eq!(Note::decode(&body).unwrap(), note);
    }

    #[test]
    fn push_failures() {
        let transport = transport();
        let note = Note::new("A", "x");
        assert!(matches!(transport.push(&note), Err(SyncError::Write { .. })));

        transport.client.respond(503, "");
        assert!(matches!(transport.push(&note), Err(SyncError::Write { .. })));
    }
}
