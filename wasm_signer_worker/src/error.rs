use std::fmt;
use wasm_bindgen::JsValue;

// === SECRET SCRUBBING ===
// Error strings can embed whole payloads (serde errors do this), so every
// message that crosses the worker boundary is scrubbed of secret-bearing
// JSON string fields first. Both plain and escape-quoted forms are handled
// because errors are often double-serialized on their way out.

const REDACTED: &str = "[REDACTED]";

#[derive(Clone, Copy)]
enum QuoteForm {
    Plain,
    Escaped,
}

impl QuoteForm {
    fn quote(self) -> &'static str {
        match self {
            QuoteForm::Plain => "\"",
            QuoteForm::Escaped => "\\\"",
        }
    }
}

/// Keys whose string values are always redacted.
const SECRET_KEYS: [&str; 11] = [
    "nearPrivateKey",
    "near_private_key",
    "privateKey",
    "wrapKeySeed",
    "wrap_key_seed",
    "prfOutput",
    "prf_output",
    "prfFirst",
    "prf_first",
    "prfSecond",
    "prf_second",
];

pub fn scrub_error_message(message: &str) -> String {
    let mut scrubbed = message.to_string();
    for key in SECRET_KEYS {
        for form in [QuoteForm::Plain, QuoteForm::Escaped] {
            let quote = form.quote();
            let pattern = format!("{quote}{key}{quote}");
            scrubbed = scrub_one_key(&scrubbed, &pattern, form);
        }
    }
    // A `prf` object means its `first`/`second` members are PRF outputs
    if scrubbed.contains("\"prf\"") || scrubbed.contains("\\\"prf\\\"") {
        for key in ["first", "second"] {
            for form in [QuoteForm::Plain, QuoteForm::Escaped] {
                let quote = form.quote();
                let pattern = format!("{quote}{key}{quote}");
                scrubbed = scrub_one_key(&scrubbed, &pattern, form);
            }
        }
    }
    scrubbed
}

fn scrub_one_key(input: &str, key_pattern: &str, form: QuoteForm) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before_key, after_key)) = rest.split_once(key_pattern) {
        out.push_str(before_key);
        out.push_str(key_pattern);
        rest = after_key;

        let Some((before_colon, after_colon)) = rest.split_once(':') else {
            out.push_str(rest);
            return out;
        };

        out.push_str(before_colon);
        out.push(':');
        rest = after_colon.trim_start_matches(' ');
        for _ in 0..after_colon.len() - rest.len() {
            out.push(' ');
        }

        let quote = form.quote();
        let Some(after_open) = rest.strip_prefix(quote) else {
            out.push_str(rest);
            return out;
        };

        out.push_str(quote);
        out.push_str(REDACTED);
        out.push_str(quote);

        rest = match skip_quoted_value(after_open, form) {
            Some(after_close) => after_close,
            None => return out,
        };
    }

    out.push_str(rest);
    out
}

fn skip_quoted_value(s: &str, form: QuoteForm) -> Option<&str> {
    match form {
        QuoteForm::Plain => {
            let mut escaped = false;
            for (idx, ch) in s.char_indices() {
                if escaped {
                    escaped = false;
                    continue;
                }
                if ch == '\\' {
                    escaped = true;
                    continue;
                }
                if ch == '"' {
                    return Some(&s[idx + ch.len_utf8()..]);
                }
            }
            None
        }
        QuoteForm::Escaped => s.find("\\\"").map(|idx| &s[idx + 2..]),
    }
}

pub fn scrub_js_error_value(err: JsValue) -> JsValue {
    if let Some(message) = err.as_string() {
        return JsValue::from_str(&scrub_error_message(&message));
    }
    JsValue::from_str(&scrub_error_message(&format!("{err:?}")))
}

// === KDF ERRORS ===

#[derive(Debug)]
pub enum KdfError {
    JsonParseError(String),
    Base64DecodeError(String),
    MissingField(&'static str),
    HkdfError,
    InvalidInput(String),
    EncryptionError(String),
}

impl fmt::Display for KdfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KdfError::JsonParseError(e) => write!(f, "JSON parse error: {}", e),
            KdfError::Base64DecodeError(e) => write!(f, "Base64 decode error: {}", e),
            KdfError::MissingField(field) => write!(f, "Missing field: {}", field),
            KdfError::HkdfError => write!(f, "HKDF operation failed"),
            KdfError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            KdfError::EncryptionError(e) => write!(f, "Encryption error: {}", e),
        }
    }
}

impl std::error::Error for KdfError {}

impl From<KdfError> for JsValue {
    fn from(err: KdfError) -> Self {
        scrub_js_error_value(JsValue::from_str(&err.to_string()))
    }
}

impl From<KdfError> for String {
    fn from(err: KdfError) -> Self {
        err.to_string()
    }
}

impl From<String> for KdfError {
    fn from(err: String) -> Self {
        KdfError::Base64DecodeError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::scrub_error_message;

    #[test]
    fn scrubs_plain_json_string_fields() {
        let input = r#"{"nearPrivateKey":"ed25519:SECRET","wrapKeySeed":"SEED","ok":true}"#;
        let scrubbed = scrub_error_message(input);
        assert!(scrubbed.contains(r#""nearPrivateKey":"[REDACTED]""#));
        assert!(scrubbed.contains(r#""wrapKeySeed":"[REDACTED]""#));
        assert!(scrubbed.contains(r#""ok":true"#));
        assert!(!scrubbed.contains("ed25519:SECRET"));
        assert!(!scrubbed.contains("SEED"));
    }

    #[test]
    fn scrubs_escaped_json_string_fields() {
        let input = r#"{\"nearPrivateKey\":\"ed25519:SECRET\",\"wrapKeySeed\":\"SEED\"}"#;
        let scrubbed = scrub_error_message(input);
        assert!(scrubbed.contains(r#"\"nearPrivateKey\":\"[REDACTED]\""#));
        assert!(scrubbed.contains(r#"\"wrapKeySeed\":\"[REDACTED]\""#));
        assert!(!scrubbed.contains("ed25519:SECRET"));
        assert!(!scrubbed.contains("SEED"));
    }

    #[test]
    fn scrubs_prf_first_second_when_prf_present() {
        let input = r#"{"prf":{"first":"AAA","second":"BBB"}}"#;
        let scrubbed = scrub_error_message(input);
        assert!(scrubbed.contains(r#""first":"[REDACTED]""#));
        assert!(scrubbed.contains(r#""second":"[REDACTED]""#));
        assert!(!scrubbed.contains(r#""first":"AAA""#));
        assert!(!scrubbed.contains(r#""second":"BBB""#));
    }

    #[test]
    fn leaves_first_second_alone_without_prf_context() {
        let input = r#"{"first":"page-1","second":"page-2"}"#;
        let scrubbed = scrub_error_message(input);
        assert_eq!(scrubbed, input);
    }
}
