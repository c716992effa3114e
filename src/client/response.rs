//! src/client/response.rs
//!
//! A fully buffered HTTP response and helpers to read its body as text or
//! JSON.

use crate::error::{Error, Result};
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    StatusCode,
};
use serde::de::DeserializeOwned;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL, after any redirects.
    pub url: Url,
    pub body: Bytes,
}

impl FetchResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            url,
            body,
        })
    }

    /// The `charset` parameter of `Content-Type`, if present.
    pub fn charset(&self) -> Option<&str> {
        let content_type = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// Decodes the body using the response charset, defaulting to UTF-8.
    /// Bytes that are invalid in that charset are an error, never replaced.
    pub fn text(&self) -> Result<String> {
        let encoding = match self.charset() {
            Some(label) => Encoding::for_label(label.as_bytes())
                .ok_or_else(|| Error::UnsupportedCharset(label.to_string()))?,
            None => UTF_8,
        };
        if encoding == UTF_8 {
            return Ok(std::str::from_utf8(&self.body)?.to_owned());
        }
        encoding
            .decode_without_bom_handling_and_without_replacement(&self.body)
            .map(|text| text.into_owned())
            .ok_or(Error::MalformedText(encoding.name()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text()?)?)
    }
}
