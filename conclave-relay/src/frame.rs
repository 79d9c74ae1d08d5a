#![forbid(unsafe_code)]

//! Wire frames: JSON arrays with a leading type tag.
//!
//! Client to relay: `["EVENT", event]`, `["REQ", subId, filter, ...]`,
//! `["CLOSE", subId]`, `["AUTH", event]`. Relay to client: `["EVENT",
//! subId, event]`, `["OK", id, bool, message]`, `["EOSE", subId]`,
//! `["CLOSED", subId, reason]`, `["NOTICE", text]`, `["AUTH", challenge]`.

use serde_json::{json, Value};

use crate::error::{RelayError, Result};
use crate::event::Event;
use crate::filter::Filter;

pub const MAX_FRAME_SIZE: usize = 256 * 1024;
pub const MAX_SUBSCRIPTION_ID_LENGTH: usize = 64;
pub const MAX_FILTERS_PER_REQ: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Event(Event),
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Close {
        sub_id: String,
    },
    Auth(Event),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Event {
        sub_id: String,
        event: Event,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose(String),
    Closed {
        sub_id: String,
        reason: String,
    },
    Notice(String),
    Auth {
        challenge: String,
    },
}

impl ClientFrame {
    pub fn from_json(json: &str) -> Result<Self> {
        if json.len() > MAX_FRAME_SIZE {
            return Err(RelayError::Protocol("frame exceeds maximum size".into()));
        }

        let value: Value = serde_json::from_str(json)?;
        let array = value
            .as_array()
            .ok_or_else(|| RelayError::Protocol("frame must be a JSON array".into()))?;
        let tag = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Protocol("missing frame type tag".into()))?;

        match tag {
            "EVENT" => {
                let event = array
                    .get(1)
                    .cloned()
                    .ok_or_else(|| RelayError::Protocol("EVENT frame missing event".into()))?;
                Ok(ClientFrame::Event(serde_json::from_value(event)?))
            }
            "REQ" => {
                let sub_id = subscription_id(array.get(1))?;
                if array.len() < 3 {
                    return Err(RelayError::Protocol("REQ frame missing filters".into()));
                }
                if array.len() - 2 > MAX_FILTERS_PER_REQ {
                    return Err(RelayError::Protocol("too many filters".into()));
                }
                let filters = array[2..]
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()).map_err(RelayError::from))
                    .collect::<Result<Vec<Filter>>>()?;
                Ok(ClientFrame::Req { sub_id, filters })
            }
            "CLOSE" => Ok(ClientFrame::Close {
                sub_id: subscription_id(array.get(1))?,
            }),
            "AUTH" => {
                let event = array
                    .get(1)
                    .cloned()
                    .ok_or_else(|| RelayError::Protocol("AUTH frame missing event".into()))?;
                Ok(ClientFrame::Auth(serde_json::from_value(event)?))
            }
            other => Err(RelayError::Protocol(format!("unknown frame type: {other}"))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            ClientFrame::Event(event) => json!(["EVENT", event]),
            ClientFrame::Req { sub_id, filters } => {
                let mut array = vec![json!("REQ"), json!(sub_id)];
                for filter in filters {
                    array.push(serde_json::to_value(filter)?);
                }
                Value::Array(array)
            }
            ClientFrame::Close { sub_id } => json!(["CLOSE", sub_id]),
            ClientFrame::Auth(event) => json!(["AUTH", event]),
        };
        Ok(value.to_string())
    }
}

impl RelayFrame {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            RelayFrame::Event { sub_id, event } => json!(["EVENT", sub_id, event]),
            RelayFrame::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayFrame::Eose(sub_id) => json!(["EOSE", sub_id]),
            RelayFrame::Closed { sub_id, reason } => json!(["CLOSED", sub_id, reason]),
            RelayFrame::Notice(text) => json!(["NOTICE", text]),
            RelayFrame::Auth { challenge } => json!(["AUTH", challenge]),
        };
        Ok(value.to_string())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let array = value
            .as_array()
            .ok_or_else(|| RelayError::Protocol("frame must be a JSON array".into()))?;
        let tag = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Protocol("missing frame type tag".into()))?;

        let str_at = |i: usize| -> Result<String> {
            array
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RelayError::Protocol("malformed frame field".into()))
        };

        match tag {
            "EVENT" => Ok(RelayFrame::Event {
                sub_id: str_at(1)?,
                event: serde_json::from_value(
                    array
                        .get(2)
                        .cloned()
                        .ok_or_else(|| RelayError::Protocol("EVENT frame missing event".into()))?,
                )?,
            }),
            "OK" => Ok(RelayFrame::Ok {
                event_id: str_at(1)?,
                accepted: array
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| RelayError::Protocol("malformed OK flag".into()))?,
                message: str_at(3)?,
            }),
            "EOSE" => Ok(RelayFrame::Eose(str_at(1)?)),
            "CLOSED" => Ok(RelayFrame::Closed {
                sub_id: str_at(1)?,
                reason: str_at(2)?,
            }),
            "NOTICE" => Ok(RelayFrame::Notice(str_at(1)?)),
            "AUTH" => Ok(RelayFrame::Auth {
                challenge: str_at(1)?,
            }),
            other => Err(RelayError::Protocol(format!("unknown frame type: {other}"))),
        }
    }
}

fn subscription_id(value: Option<&Value>) -> Result<String> {
    let sub_id = value
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::Protocol("missing subscription id".into()))?;
    if sub_id.is_empty() || sub_id.len() > MAX_SUBSCRIPTION_ID_LENGTH {
        return Err(RelayError::Protocol("invalid subscription id".into()));
    }
    Ok(sub_id.to_string())
}
