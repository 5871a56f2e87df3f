//! Control-plane messages sent by the client
//!
//! ```text
//! {"action":"subscribe","topic":"<name>"}
//! {"action":"unsubscribe","topic":"<name>"}
//! {"type":"heartbeat","timestamp":<epoch-ms>}
//! {"pong":<echoed-value>}
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::frame::{Frame, Payload};
use crate::time::{now_millis, EpochMillis};

/// Client → server control message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Control {
    Topic(TopicAction),
    Heartbeat(Heartbeat),
    Pong { pong: Value },
}

/// Topic subscription request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TopicAction {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Liveness heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "heartbeat")]
pub struct Heartbeat {
    pub timestamp: EpochMillis,
}

impl Control {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Control::Topic(TopicAction::Subscribe {
            topic: topic.into(),
        })
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Control::Topic(TopicAction::Unsubscribe {
            topic: topic.into(),
        })
    }

    /// Heartbeat stamped with the current wall clock
    pub fn heartbeat() -> Self {
        Control::Heartbeat(Heartbeat {
            timestamp: now_millis(),
        })
    }

    pub fn pong(value: Value) -> Self {
        Control::Pong { pong: value }
    }

    pub fn to_value(&self) -> Value {
        // Serialization of these shapes cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::Text(self.to_value().to_string())
    }
}

impl From<Control> for Payload {
    fn from(control: Control) -> Self {
        Payload::Json(control.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_actions() {
        assert_eq!(
            Control::subscribe("quotes").to_value(),
            json!({"action": "subscribe", "topic": "quotes"})
        );
        assert_eq!(
            Control::unsubscribe("quotes").to_value(),
            json!({"action": "unsubscribe", "topic": "quotes"})
        );
    }

    #[test]
    fn test_heartbeat_shape() {
        let value = Control::Heartbeat(Heartbeat { timestamp: 1700 }).to_value();
        assert_eq!(value, json!({"type": "heartbeat", "timestamp": 1700}));
    }

    #[test]
    fn test_pong_echoes_value() {
        assert_eq!(Control::pong(json!(42)).to_frame(), Frame::Text(r#"{"pong":42}"#.into()));
    }
}
