//! Ambient environment materialization.
//!
//! # Responsibilities
//! - Map method and request URI to `REQUEST_METHOD` / `REQUEST_URI`
//! - Map every forwarded header to `HTTP_<NAME>`
//! - Set `CONTENT_LENGTH` when the script will receive a body
//! - Drop `Host` and `Content-Length`
//!
//! # Design Decisions
//! - Values are stored verbatim; escaping happens only in the script assembler
//! - Keys live in a `BTreeMap` so rendering order never depends on header order
//! - Repeated headers (or names that normalize to the same key) are joined
//!   with `, ` so every key appears once

use std::collections::BTreeMap;

use crate::bridge::body::delivers_body;
use crate::bridge::request::InboundRequest;

pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const REQUEST_URI: &str = "REQUEST_URI";
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
pub const HEADER_PREFIX: &str = "HTTP_";

/// Headers never forwarded to the script.
const EXCLUDED_HEADERS: [&str; 2] = ["host", "content-length"];

/// Variables a CGI-style script reads to learn about its request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientEnvironment {
    vars: BTreeMap<String, String>,
}

impl AmbientEnvironment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn append(&mut self, key: String, value: String) {
        self.vars
            .entry(key)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
}

/// `X-Test` → `HTTP_X_TEST`. Anything that is not ASCII alphanumeric becomes `_`.
pub fn header_key(name: &str) -> String {
    let mut key = String::with_capacity(HEADER_PREFIX.len() + name.len());
    key.push_str(HEADER_PREFIX);
    key.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    key
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Derive the ambient environment for one request.
pub fn materialize(request: &InboundRequest) -> AmbientEnvironment {
    let mut env = AmbientEnvironment::default();
    env.vars.insert(REQUEST_METHOD.to_string(), request.method.as_str().to_string());
    env.vars.insert(REQUEST_URI.to_string(), request.request_uri());
    if delivers_body(request.method, &request.body) {
        env.vars.insert(CONTENT_LENGTH.to_string(), request.body.len().to_string());
    }

    for name in request.headers.keys() {
        if is_excluded(name.as_str()) {
            continue;
        }
        let key = header_key(name.as_str());
        for value in request.headers.get_all(name) {
            env.append(key.clone(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
    }

    env
}
