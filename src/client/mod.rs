//! src/client/mod.rs
//!
//! The HTTP client handed out by a `Tester`. It is tied to the tester's event
//! loop and resolves relative targets against the server's base URL.

use crate::{
    config::TesterConfig,
    error::{Error, Result},
    event_loop::{EventLoop, LoopId},
    routes::under_origin,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    multipart, Method,
};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

mod response;

pub use response::FetchResponse;

/// A file uploaded as a `multipart/form-data` part.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
enum Body {
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// A request to send through an `HttpClient`.
///
/// `target` is either an absolute URL or a path resolved against the
/// server's base URL. When form fields or files are attached and no method
/// was chosen explicitly, the request is sent as `POST`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    target: String,
    method: Option<Method>,
    headers: HeaderMap,
    body: Option<Body>,
    form: Vec<(String, String)>,
    files: Vec<FilePart>,
    raise_error: bool,
}

impl FetchRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: None,
            headers: HeaderMap::new(),
            body: None,
            form: Vec::new(),
            files: Vec::new(),
            raise_error: true,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(target).method(Method::GET)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(target).method(Method::POST)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Bytes(body.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.body = Some(Body::Json(serde_json::to_value(value)?));
        Ok(self)
    }

    /// Adds a form field. Fields are sent urlencoded, or as text parts when
    /// files are attached too. Takes precedence over `body`/`json`.
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            filename: filename.into(),
            content: content.into(),
            content_type: None,
        });
        self
    }

    pub fn file_part(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Whether a non-2xx status is returned as `Error::Status` (the default)
    /// or as a plain `FetchResponse`.
    pub fn raise_error(mut self, raise: bool) -> Self {
        self.raise_error = raise;
        self
    }

    fn resolved_method(&self) -> Method {
        match &self.method {
            Some(method) => method.clone(),
            None if !self.form.is_empty() || !self.files.is_empty() => Method::POST,
            None => Method::GET,
        }
    }
}

/// Adjusts the `reqwest` client a tester builds, e.g. to add default
/// headers, a cookie store or a redirect policy. Runs after the harness's
/// own settings, so it may override them.
pub type ClientCustomizer =
    Arc<dyn Fn(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + Sync>;

/// An HTTP client whose requests are meant to run on one specific loop.
///
/// Requests polled while a different `EventLoop` is driving fail with
/// `Error::LoopMismatch` rather than waiting on a server that never runs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    loop_id: LoopId,
    base_url: Url,
}

impl HttpClient {
    pub fn new(
        event_loop: &EventLoop,
        base_url: Url,
        config: &TesterConfig,
        customize: Option<&ClientCustomizer>,
    ) -> Result<Self> {
        // The server is local; never route through a system proxy.
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(customize) = customize {
            builder = customize(builder);
        }
        Ok(Self {
            inner: builder.build()?,
            loop_id: event_loop.id(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(&self, target: impl Into<String>) -> Result<FetchResponse> {
        self.fetch(FetchRequest::get(target)).await
    }

    pub async fn post(
        &self,
        target: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Result<FetchResponse> {
        self.fetch(FetchRequest::post(target).body(body)).await
    }

    /// Paths starting with `/` are appended to the server's host and port;
    /// anything else is parsed as a URL reference against the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url> {
        if target.starts_with('/') {
            under_origin(&self.base_url, target)
        } else {
            Ok(self.base_url.join(target)?)
        }
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        if let Some(driving) = EventLoop::driving() {
            if driving != self.loop_id {
                return Err(Error::LoopMismatch);
            }
        }

        let url = self.resolve(&request.target)?;
        let method = request.resolved_method();
        tracing::debug!(%method, %url, "Dispatching test request");

        let mut builder = self.inner.request(method, url).headers(request.headers);
        if !request.files.is_empty() {
            let mut form = multipart::Form::new();
            for (key, value) in request.form {
                form = form.text(key, value);
            }
            for file in request.files {
                let mut part = multipart::Part::bytes(file.content).file_name(file.filename);
                if let Some(content_type) = file.content_type {
                    part = part.mime_str(&content_type)?;
                }
                form = form.part(file.field, part);
            }
            builder = builder.multipart(form);
        } else if !request.form.is_empty() {
            builder = builder.form(&request.form);
        } else if let Some(body) = request.body {
            builder = match body {
                Body::Bytes(bytes) => builder.body(bytes),
                Body::Json(value) => builder.json(&value),
            };
        }

        let response = FetchResponse::read(builder.send().await?).await?;
        tracing::debug!(status = %response.status, url = %response.url, "Test request completed");

        if request.raise_error && !response.status.is_success() {
            return Err(Error::Status(Box::new(response)));
        }
        Ok(response)
    }
}
