//! NIP-01 wire messages: decoding client frames and encoding relay frames.

use serde_json::{json, Value};
use thiserror::Error;

use crate::{event::Event, filter::Filter};

/// Message types a client may send. Only the first three are implemented.
const KNOWN_TYPES: [&str; 5] = ["EVENT", "REQ", "CLOSE", "AUTH", "COUNT"];

/// A decoded client-to-relay message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Event),
    /// `["REQ", <sub id>, <filter>...]`
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <sub id>]`
    Close(String),
}

/// Why a client frame could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed message")]
    Malformed,
    #[error("unsupported message type: {0}")]
    Unsupported(String),
}

impl ClientMessage {
    /// Parse one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let val: Value = serde_json::from_str(text).map_err(|_| DecodeError::Malformed)?;
        let arr = val.as_array().ok_or(DecodeError::Malformed)?;
        let kind = arr
            .first()
            .and_then(Value::as_str)
            .ok_or(DecodeError::Malformed)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(DecodeError::Malformed);
        }
        match kind {
            "EVENT" => {
                let [_, ev] = arr.as_slice() else {
                    return Err(DecodeError::Malformed);
                };
                let ev = Event::from_value(ev).map_err(|_| DecodeError::Malformed)?;
                Ok(ClientMessage::Event(ev))
            }
            "REQ" => {
                if arr.len() < 3 {
                    return Err(DecodeError::Malformed);
                }
                let sub_id = arr[1].as_str().ok_or(DecodeError::Malformed)?;
                let filters = arr[2..]
                    .iter()
                    .map(Filter::from_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| DecodeError::Malformed)?;
                Ok(ClientMessage::Req {
                    sub_id: sub_id.to_string(),
                    filters,
                })
            }
            "CLOSE" => match arr.as_slice() {
                [_, Value::String(sub_id)] => Ok(ClientMessage::Close(sub_id.clone())),
                _ => Err(DecodeError::Malformed),
            },
            other => Err(DecodeError::Unsupported(other.to_string())),
        }
    }
}

/// A relay-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose(String),
    Notice(String),
}

impl RelayMessage {
    pub fn ok(event_id: impl Into<String>, accepted: bool, message: impl Into<String>) -> Self {
        RelayMessage::Ok {
            event_id: event_id.into(),
            accepted,
            message: message.into(),
        }
    }

    /// Serialize to the JSON text frame.
    pub fn encode(&self) -> String {
        let val = match self {
            RelayMessage::Event { sub_id, event } => json!(["EVENT", sub_id, event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Eose(sub_id) => json!(["EOSE", sub_id]),
            RelayMessage::Notice(msg) => json!(["NOTICE", msg]),
        };
        val.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;

    fn event() -> Event {
        Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 1_700_000_000,
            kind: 20001,
            tags: vec![Tag(vec!["t".into(), "news".into()])],
            content: "hi \"there\"".into(),
            sig: "c".repeat(128),
        }
    }

    #[test]
    fn decodes_event() {
        let frame = json!(["EVENT", event()]).to_string();
        assert_eq!(
            ClientMessage::decode(&frame),
            Ok(ClientMessage::Event(event()))
        );
    }

    #[test]
    fn decodes_req_with_several_filters() {
        let frame = r##"["REQ","sub1",{"kinds":[20001]},{"#t":["news"],"#ab":["x"]}]"##;
        let Ok(ClientMessage::Req { sub_id, filters }) = ClientMessage::decode(frame) else {
            panic!("expected REQ");
        };
        assert_eq!(sub_id, "sub1");
        assert_eq!(filters.len(), 2);
        assert!(filters[1].tags.contains_key("t"));
        assert_eq!(filters[1].tags.len(), 1);
    }

    #[test]
    fn decodes_close() {
        assert_eq!(
            ClientMessage::decode(r#"["CLOSE","sub1"]"#),
            Ok(ClientMessage::Close("sub1".into()))
        );
    }

    #[test]
    fn malformed_frames() {
        let bad_event = json!(["EVENT", {"id": "short"}]).to_string();
        let frames = [
            "not json",
            "{}",
            "[]",
            "[1]",
            r#"["HELLO"]"#,
            r#"["EVENT"]"#,
            r#"["EVENT",{},{}]"#,
            r#"["EVENT","x"]"#,
            bad_event.as_str(),
            r#"["REQ","sub1"]"#,
            r#"["REQ",1,{}]"#,
            r#"["REQ","sub1",[]]"#,
            r#"["REQ","sub1",{"kinds":1}]"#,
            r#"["REQ","sub1",{"since":"yesterday"}]"#,
            r##"["REQ","sub1",{"#e":"x"}]"##,
            r#"["REQ","sub1",{"search":1}]"#,
            r#"["CLOSE"]"#,
            r#"["CLOSE",1]"#,
            r#"["CLOSE","a","b"]"#,
        ];
        for f in frames {
            assert_eq!(ClientMessage::decode(f), Err(DecodeError::Malformed), "{f}");
        }
    }

    #[test]
    fn known_but_unimplemented_types() {
        assert_eq!(
            ClientMessage::decode(r#"["AUTH",{}]"#),
            Err(DecodeError::Unsupported("AUTH".into()))
        );
        assert_eq!(
            ClientMessage::decode(r#"["COUNT","c",{}]"#),
            Err(DecodeError::Unsupported("COUNT".into()))
        );
    }

    #[test]
    fn encodes_relay_messages() {
        assert_eq!(RelayMessage::Eose("s".into()).encode(), r#"["EOSE","s"]"#);
        assert_eq!(
            RelayMessage::Notice("malformed message".into()).encode(),
            r#"["NOTICE","malformed message"]"#
        );
        let id = "a".repeat(64);
        assert_eq!(
            RelayMessage::ok(id.clone(), false, "blocked: no").encode(),
            format!(r#"["OK","{id}",false,"blocked: no"]"#)
        );
        assert_eq!(
            RelayMessage::ok(id.clone(), true, "").encode(),
            format!(r#"["OK","{id}",true,""]"#)
        );
    }

    #[test]
    fn event_message_round_trips() {
        let msg = RelayMessage::Event {
            sub_id: "sub1".into(),
            event: event(),
        };
        let val: Value = serde_json::from_str(&msg.encode()).unwrap();
        assert_eq!(val[0], "EVENT");
        assert_eq!(val[1], "sub1");
        let ev: Event = serde_json::from_value(val[2].clone()).unwrap();
        assert_eq!(ev, event());
        assert_eq!(val.as_array().unwrap().len(), 3);
    }
}
