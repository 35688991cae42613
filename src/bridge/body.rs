//! Request body relay.
//!
//! Decides whether the script gets a body at all. Only POST and PUT with a
//! non-empty body produce a [`BodyInstall`]; everything else runs with no
//! body, even when the client sent one.
//!
//! A relayed body travels two ways: as the installation statement in the
//! program text, and as a file the gateway writes next to the run. The file's
//! path is exported to the interpreter as [`BODY_FILE_VAR`] and its size as
//! `CONTENT_LENGTH`, so a script can read the raw bytes without the program
//! text being involved.

use std::borrow::Cow;

use axum::body::Bytes;

use crate::bridge::request::RequestMethod;

/// Process environment variable holding the path of the raw body file.
pub const BODY_FILE_VAR: &str = "REQUEST_BODY_FILE";

/// A body the script assembler must install before the entry point runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyInstall {
    body: Bytes,
}

impl BodyInstall {
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Shared handle to the body bytes.
    pub fn raw(&self) -> Bytes {
        self.body.clone()
    }

    /// The body decoded as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Whether a request with this method and body hands the body to the script.
pub fn delivers_body(method: RequestMethod, body: &[u8]) -> bool {
    method.carries_body() && !body.is_empty()
}

/// Produce body-installation instructions for a request, if any are due.
pub fn relay_body(method: RequestMethod, body: &Bytes) -> Option<BodyInstall> {
    if delivers_body(method, body) {
        Some(BodyInstall { body: body.clone() })
    } else {
        None
    }
}
