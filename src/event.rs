//! Nostr event model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Lowest kind of the ephemeral range accepted by this relay.
pub const EPHEMERAL_MIN: u64 = 20_000;
/// Exclusive upper bound of the ephemeral range.
pub const EPHEMERAL_MAX: u64 = 30_000;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. Common examples include:
///
/// - `p` – references another author's public key
/// - `e` – links to another event ID
/// - `t` – free-form topic or hashtag
///
/// Each tag is kept verbatim so uncommon or custom tags survive the trip
/// through the relay untouched. An empty tag has no name and can never be
/// selected by a `#<letter>` filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name, i.e. the first element.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First positional value, or `""` for a tag that only carries a name.
    pub fn value(&self) -> &str {
        self.0.get(1).map(String::as_str).unwrap_or("")
    }
}

/// Signed Nostr event as it travels over the wire.
///
/// ```json
/// {
///   "id": "4376c65d...",
///   "pubkey": "79be667e...",
///   "created_at": 1700000000,
///   "kind": 20001,
///   "tags": [["t", "news"], ["p", "79be667e..."]],
///   "content": "hello",
///   "sig": "e8551d85..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex, x-only).
    pub pubkey: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Kind number, e.g. `20001`.
    pub kind: u64,
    /// Arbitrary tags such as `p` (pubkey) or `t` (topic).
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Reasons an event object fails the structural schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("event is not a valid object: {0}")]
    Shape(String),
    #[error("{field} must be {len} lowercase hex characters")]
    Hex { field: &'static str, len: usize },
}

impl Event {
    /// Parse and shape-check an event from a generic JSON value.
    pub fn from_value(val: &Value) -> Result<Self, SchemaError> {
        if !val.is_object() {
            return Err(SchemaError::Shape("expected a JSON object".into()));
        }
        let ev: Event = serde_json::from_value(val.clone())
            .map_err(|e| SchemaError::Shape(e.to_string()))?;
        ev.check_shape()?;
        Ok(ev)
    }

    /// Check the fixed-width hex fields.
    pub fn check_shape(&self) -> Result<(), SchemaError> {
        check_hex("id", &self.id, 64)?;
        check_hex("pubkey", &self.pubkey, 64)?;
        check_hex("sig", &self.sig, 128)
    }

    /// Whether the kind falls into the ephemeral range `[20000, 30000)`.
    pub fn is_ephemeral(&self) -> bool {
        is_ephemeral(self.kind)
    }

    /// Canonical NIP-01 digest of the event's signed fields.
    pub fn digest(&self) -> [u8; 32] {
        let arr = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        // Serializing a `json!` value cannot fail.
        let data = arr.to_string();
        Sha256::digest(data.as_bytes()).into()
    }
}

/// Ephemeral kinds are relayed but never meant to be stored.
pub fn is_ephemeral(kind: u64) -> bool {
    (EPHEMERAL_MIN..EPHEMERAL_MAX).contains(&kind)
}

fn check_hex(field: &'static str, s: &str, len: usize) -> Result<(), SchemaError> {
    let ok = s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if ok {
        Ok(())
    } else {
        Err(SchemaError::Hex { field, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> Value {
        json!({
            "id": "a".repeat(64),
            "pubkey": "b".repeat(64),
            "created_at": 1_700_000_000,
            "kind": 20001,
            "tags": [["t", "news"], ["p"]],
            "content": "hi",
            "sig": "c".repeat(128),
        })
    }

    #[test]
    fn parses_valid_event() {
        let ev = Event::from_value(&raw()).unwrap();
        assert_eq!(ev.kind, 20001);
        assert_eq!(ev.tags[0].name(), Some("t"));
        assert_eq!(ev.tags[0].value(), "news");
        assert_eq!(ev.tags[1].value(), "");
        assert!(ev.is_ephemeral());
    }

    #[test]
    fn rejects_uppercase_and_short_hex() {
        let mut v = raw();
        v["id"] = json!("A".repeat(64));
        assert_eq!(
            Event::from_value(&v),
            Err(SchemaError::Hex { field: "id", len: 64 })
        );
        let mut v = raw();
        v["sig"] = json!("c".repeat(127));
        assert!(matches!(
            Event::from_value(&v),
            Err(SchemaError::Hex { field: "sig", .. })
        ));
    }

    #[test]
    fn rejects_wrong_field_types() {
        for (field, bad) in [
            ("tags", json!([["t", 1]])),
            ("tags", json!(["t"])),
            ("kind", json!(-1)),
            ("created_at", json!("now")),
            ("content", json!(null)),
        ] {
            let mut v = raw();
            v[field] = bad;
            assert!(Event::from_value(&v).is_err(), "{field}");
        }
        let mut v = raw();
        v.as_object_mut().unwrap().remove("pubkey");
        assert!(Event::from_value(&v).is_err());
        assert!(Event::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn accepts_negative_timestamp_and_empty_tag() {
        let mut v = raw();
        v["created_at"] = json!(-5);
        v["tags"] = json!([[]]);
        let ev = Event::from_value(&v).unwrap();
        assert_eq!(ev.created_at, -5);
        assert_eq!(ev.tags[0].name(), None);
    }

    #[test]
    fn ephemeral_range_bounds() {
        assert!(!is_ephemeral(19_999));
        assert!(is_ephemeral(20_000));
        assert!(is_ephemeral(29_999));
        assert!(!is_ephemeral(30_000));
        assert!(!is_ephemeral(1));
    }

    #[test]
    fn digest_matches_reference() {
        let ev = Event {
            id: String::new(),
            pubkey: "p".into(),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        let expected = Sha256::digest(br#"[0,"p",1,1,[],""]"#);
        assert_eq!(ev.digest(), <[u8; 32]>::from(expected));
    }
}
