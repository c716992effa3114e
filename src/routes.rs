//! src/routes.rs
//!
//! Named routes for building URLs against the server under test, plus a
//! query-string helper. `axum` has no reverse routing, so route patterns are
//! registered on the tester alongside the names tests refer to them by.

use crate::error::{Error, Result};
use std::collections::HashMap;
use url::Url;

/// A registry of `name -> pattern`, where a pattern is an `axum` path such
/// as `/user/:name` or `/static/*path`.
#[derive(Debug, Clone, Default)]
pub struct RouteNames {
    patterns: HashMap<String, String>,
}

impl RouteNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.patterns.insert(name.into(), pattern.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Fills the captures of the pattern named `name` with `args`, in order,
    /// and joins the result onto `base`.
    pub fn reverse(&self, base: &Url, name: &str, args: &[&str]) -> Result<Url> {
        let pattern = self
            .patterns
            .get(name)
            .ok_or_else(|| Error::UnknownRoute(name.to_string()))?;

        let segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
        let expected = segments.iter().filter(|s| is_capture(s)).count();
        if expected != args.len() {
            return Err(Error::RouteArguments {
                name: name.to_string(),
                expected,
                given: args.len(),
            });
        }

        let mut url = base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.clear();
            let mut args = args.iter();
            for segment in segments {
                match segment.as_bytes().first() {
                    Some(b':') => path.push(args.next().copied().unwrap_or_default()),
                    // A wildcard may span several segments.
                    Some(b'*') => {
                        path.extend(args.next().copied().unwrap_or_default().split('/'))
                    }
                    _ => path.push(segment),
                };
            }
        }
        Ok(url)
    }
}

fn is_capture(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('*')
}

/// Appends `path` (which starts with `/`) to the scheme, host and port of
/// `base`. The path is never resolved as a reference, so `//x/y` stays on
/// `base`'s host. Query and fragment are kept; dot segments are normalized by
/// URL parsing, as any HTTP client would before sending.
pub fn under_origin(base: &Url, path: &str) -> Result<Url> {
    let origin = base.origin().ascii_serialization();
    Ok(Url::parse(&format!("{origin}{path}"))?)
}

/// Appends URL-encoded `params` to `url`'s query, keeping any existing query
/// and fragment.
pub fn with_query<K, V>(mut url: Url, params: &[(K, V)]) -> Url
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
    }
    url
}
