//! Purpose: Provide an HTTP client for the book inventory REST API.
//! Exports: `RemoteClient`, `DEFAULT_TIMEOUT`.
//! Role: Blocking client used by the terminal front-end and integration tests.
//! Invariants: Every request resolves to `Ok` or a typed `Error` (bounded by a timeout).
//! Invariants: Error envelopes from the server map back onto the same `ErrorKind`.
#![allow(clippy::result_large_err)]

use crate::core::book::{Book, BookFields};
use crate::core::error::{Error, ErrorKind};
use crate::core::key::BookKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    key: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                agent: build_agent(DEFAULT_TIMEOUT),
            }),
        })
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RemoteClientInner {
                base_url: self.inner.base_url.clone(),
                agent: build_agent(timeout),
            }),
        }
    }

    pub fn health(&self) -> ApiResult<()> {
        let url = build_url(&self.inner.base_url, &["healthz"])?;
        let _value: serde_json::Value = self.request_json("GET", &url, None::<&()>)?;
        Ok(())
    }

    pub fn list_books(&self) -> ApiResult<Vec<Book>> {
        let url = build_url(&self.inner.base_url, &["api", "books"])?;
        self.request_json("GET", &url, None::<&()>)
    }

    pub fn create_book(&self, fields: &BookFields) -> ApiResult<Book> {
        let url = build_url(&self.inner.base_url, &["api", "books"])?;
        self.request_json("POST", &url, Some(fields))
    }

    pub fn update_book(&self, key: &BookKey, fields: &BookFields) -> ApiResult<Book> {
        let key = key.to_string();
        let url = build_url(&self.inner.base_url, &["api", "books", &key])?;
        self.request_json("PUT", &url, Some(fields))
            .map_err(|err| attach_key(err, &key))
    }

    pub fn delete_book(&self, key: &BookKey) -> ApiResult<Book> {
        let key = key.to_string();
        let url = build_url(&self.inner.base_url, &["api", "books", &key])?;
        self.request_json("DELETE", &url, None::<&()>)
            .map_err(|err| attach_key(err, &key))
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_hint(format!(
                    "Check that the server is running at {}.",
                    self.inner.base_url
                ))
                .with_source(err)),
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("api base url must use http or https scheme")
        );
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("api base url must not include a path")
            .with_hint("Use the server root, e.g. http://localhost:5000."));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("api base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("remote error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let kind = ErrorKind::parse(&remote.kind).unwrap_or(ErrorKind::Internal);
    let mut err = Error::new(kind);
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(key) = remote.key {
        err = err.with_key(key);
    }
    err
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 415 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}

fn attach_key(err: Error, key: &str) -> Error {
    if err.key().is_some() {
        err
    } else {
        err.with_key(key)
    }
}
