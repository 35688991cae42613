//! Script payload assembly.
//!
//! # Responsibilities
//! - Render environment assignments, body installation, `chdir` and the
//!   entry-point include, in that order, as one PHP program
//! - Embed every untrusted value through [`quote_literal`]
//!
//! # Design Decisions
//! - Assembly is pure: same inputs, byte-identical payload
//! - Values only ever appear inside single-quoted literals. Escaping `\` and
//!   `'` is the complete escape set for that literal form
//! - No closing `?>` tag, so trailing whitespace cannot leak into the output

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::bridge::body::{BodyInstall, BODY_FILE_VAR};
use crate::bridge::environment::AmbientEnvironment;
use crate::config::BodyEncoding;

/// Global the installed body is assigned to.
pub const BODY_VARIABLE: &str = "$HTTP_RAW_POST_DATA";

/// A complete, self-contained program for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPayload {
    text: String,
}

impl ScriptPayload {
    /// Wrap program text that was produced elsewhere.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl std::fmt::Display for ScriptPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Wrap `value` in a PHP single-quoted literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Builds payloads for a fixed interpreter root and entry point.
#[derive(Debug, Clone)]
pub struct ScriptAssembler {
    root: PathBuf,
    entry_point: String,
    encoding: BodyEncoding,
}

impl ScriptAssembler {
    pub fn new(root: impl Into<PathBuf>, entry_point: impl Into<String>, encoding: BodyEncoding) -> Self {
        Self {
            root: root.into(),
            entry_point: entry_point.into(),
            encoding,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assemble(&self, env: &AmbientEnvironment, body: Option<&BodyInstall>) -> ScriptPayload {
        let mut text = String::from("<?php\n");

        for (key, value) in env.iter() {
            // Infallible: writing into a String.
            let _ = writeln!(text, "$_SERVER[{}] = {};", quote_literal(key), quote_literal(value));
        }

        if let Some(body) = body {
            let _ = writeln!(text, "{} = {};", BODY_VARIABLE, self.body_expression(body));
        }

        let root = self.root.display().to_string();
        let entry = self.root.join(&self.entry_point).display().to_string();
        let _ = writeln!(text, "chdir({});", quote_literal(&root));
        let _ = writeln!(text, "include {};", quote_literal(&entry));

        ScriptPayload { text }
    }

    fn body_expression(&self, body: &BodyInstall) -> String {
        match self.encoding {
            BodyEncoding::Base64 => {
                format!("base64_decode({})", quote_literal(&BASE64.encode(body.bytes())))
            }
            BodyEncoding::Literal => quote_literal(&body.text()),
            BodyEncoding::File => format!("file_get_contents(getenv({}))", quote_literal(BODY_FILE_VAR)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::body::relay_body;
    use crate::bridge::environment::materialize;
    use crate::bridge::request::{InboundRequest, RequestMethod};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue};

    /// Walks the payload with PHP single-quote rules. Returns every literal's
    /// decoded value, or `None` when a literal is left open.
    fn php_literals(source: &str) -> Option<Vec<String>> {
        let mut literals = Vec::new();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            if c != '\'' {
                continue;
            }
            let mut value = String::new();
            loop {
                match chars.next()? {
                    '\'' => break,
                    '\\' => match chars.next()? {
                        c @ ('\\' | '\'') => value.push(c),
                        c => {
                            value.push('\\');
                            value.push(c);
                        }
                    },
                    c => value.push(c),
                }
            }
            literals.push(value);
        }
        Some(literals)
    }

    fn request(method: RequestMethod, body: &'static [u8]) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("abc"));
        headers.insert("host", HeaderValue::from_static("localhost:5000"));
        InboundRequest::new(method, "/api", "admin_login_simple.php", headers, Bytes::from_static(body))
    }

    fn assemble(req: &InboundRequest, encoding: BodyEncoding) -> ScriptPayload {
        let assembler = ScriptAssembler::new("/srv/backend", "index.php", encoding);
        let env = materialize(req);
        let body = relay_body(req.method, &req.body);
        assembler.assemble(&env, body.as_ref())
    }

    #[test]
    fn test_golden_payload() {
        let payload = assemble(&request(RequestMethod::Get, b""), BodyEncoding::Base64);
        assert_eq!(
            payload.as_str(),
            "<?php\n\
             $_SERVER['HTTP_X_TEST'] = 'abc';\n\
             $_SERVER['REQUEST_METHOD'] = 'GET';\n\
             $_SERVER['REQUEST_URI'] = '/api/admin_login_simple.php';\n\
             chdir('/srv/backend');\n\
             include '/srv/backend/index.php';\n"
        );
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let req = request(RequestMethod::Post, b"{\"a\":1}");
        let first = assemble(&req, BodyEncoding::Base64);
        let second = assemble(&req, BodyEncoding::Base64);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_fixed_statement_order() {
        let payload = assemble(&request(RequestMethod::Put, b"data"), BodyEncoding::Literal);
        let text = payload.as_str();

        let env_at = text.find("$_SERVER[").unwrap();
        let body_at = text.find(BODY_VARIABLE).unwrap();
        let chdir_at = text.find("chdir(").unwrap();
        let include_at = text.find("include ").unwrap();
        assert!(env_at < body_at && body_at < chdir_at && chdir_at < include_at);
    }

    #[test]
    fn test_single_body_instruction_for_post_and_put() {
        for method in [RequestMethod::Post, RequestMethod::Put] {
            let payload = assemble(&request(method, b"payload"), BodyEncoding::Literal);
            assert_eq!(payload.as_str().matches(BODY_VARIABLE).count(), 1);
            assert!(payload.as_str().contains("$HTTP_RAW_POST_DATA = 'payload';"));
        }
        for method in [RequestMethod::Get, RequestMethod::Delete, RequestMethod::Options] {
            let payload = assemble(&request(method, b"payload"), BodyEncoding::Literal);
            assert!(!payload.as_str().contains(BODY_VARIABLE), "{method} got a body");
        }
    }

    #[test]
    fn test_quote_in_body_stays_inside_literal() {
        let payload = assemble(&request(RequestMethod::Post, b"can't stop"), BodyEncoding::Literal);

        let literals = php_literals(payload.as_str()).expect("payload left a literal open");
        assert!(literals.iter().any(|l| l == "can't stop"));
        assert!(payload.as_str().contains(r"$HTTP_RAW_POST_DATA = 'can\'t stop';"));
        assert!(payload.as_str().ends_with("include '/srv/backend/index.php';\n"));
    }

    #[test]
    fn test_breakout_attempts_are_neutralized() {
        let hostile: &'static [u8] = b"x\\'; system('id'); $a = '\n?>";
        let payload = assemble(&request(RequestMethod::Post, hostile), BodyEncoding::Literal);

        let literals = php_literals(payload.as_str()).unwrap();
        let body = std::str::from_utf8(hostile).unwrap();
        assert!(literals.iter().any(|l| l == body), "body must round-trip as one literal");

        let outside: String = {
            // Everything outside literals must be our own statements.
            let mut out = String::new();
            let mut in_literal = false;
            let mut escaped = false;
            for c in payload.as_str().chars() {
                if in_literal {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '\'' {
                        in_literal = false;
                    }
                } else if c == '\'' {
                    in_literal = true;
                } else {
                    out.push(c);
                }
            }
            out
        };
        assert!(!outside.contains("system"));
    }

    #[test]
    fn test_base64_body_is_binary_safe() {
        let payload = assemble(&request(RequestMethod::Post, b"can't\x00\xff"), BodyEncoding::Base64);
        let expected = format!("$HTTP_RAW_POST_DATA = base64_decode('{}');", BASE64.encode(b"can't\x00\xff"));
        assert!(payload.as_str().contains(&expected));
        assert!(php_literals(payload.as_str()).is_some());
    }

    #[test]
    fn test_file_encoding_keeps_body_out_of_program() {
        let payload = assemble(&request(RequestMethod::Post, b"SECRETBODY"), BodyEncoding::File);
        let text = payload.as_str();

        assert!(!text.contains("SECRETBODY"));
        assert!(text.contains("$HTTP_RAW_POST_DATA = file_get_contents(getenv('REQUEST_BODY_FILE'));\n"));
        assert!(text.contains("$_SERVER['CONTENT_LENGTH'] = '10';\n"));
    }

    #[test]
    fn test_header_values_are_escaped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-evil", HeaderValue::from_static("it's \\ here"));
        let req = InboundRequest::new(RequestMethod::Get, "/api", "x", headers, Bytes::new());
        let payload = assemble(&req, BodyEncoding::Base64);

        assert!(payload.as_str().contains(r"$_SERVER['HTTP_X_EVIL'] = 'it\'s \\ here';"));
        let literals = php_literals(payload.as_str()).unwrap();
        assert!(literals.iter().any(|l| l == "it's \\ here"));
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal(""), "''");
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("a'b"), r"'a\'b'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
        assert_eq!(quote_literal(r"end\"), r"'end\\'");
    }
}
