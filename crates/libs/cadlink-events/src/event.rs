use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::category::{EventCategory, EventType};
use crate::error::EventError;

pub type JsonMap = serde_json::Map<String, JsonValue>;

/// Header keys of the log form.
pub const RESERVED_KEYS: [&str; 7] =
    ["event_type", "category", "action", "timestamp", "source", "session_id", "origin"];

/// Log form key holding the payload entries that cannot sit at the top level: those named like
/// a header key, like this key itself, or `type` (the push frame marker).
pub const NESTED_PAYLOAD_KEY: &str = "data";

fn needs_nesting(key: &str) -> bool {
    key == NESTED_PAYLOAD_KEY || key == "type" || RESERVED_KEYS.contains(&key)
}

/// Attribution of an event to its likely cause.
///
/// The wire protocol carries no causal link between a command and the events it triggers, so
/// this is decided by a time-window heuristic: see `cadlink_mux::attribution`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOrigin {
    /// Observed while a recently issued command was still inside the attribution window.
    Command { request_id: String, command_type: String },
    /// No recently issued command to attribute the event to.
    User,
}

impl EventOrigin {
    pub fn is_command_triggered(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

/// One detected occurrence in the remote application.
///
/// `source` and `session_id` belong to the notifier that emits the event; producers leave them
/// empty and the notifier stamps them on emission.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardEvent {
    event_type: EventType,
    action: String,
    timestamp: OffsetDateTime,
    data: JsonMap,
    source: String,
    session_id: String,
    origin: Option<EventOrigin>,
}

impl StandardEvent {
    /// A categorised event, e.g. `(Layer, "renamed")`.
    pub fn standard(category: EventCategory, action: impl Into<String>, data: JsonMap) -> Self {
        Self::new(EventType::Standard(category), action.into(), data)
    }

    /// A tool-specific event such as `"rhino.boolean_operation"`. The action is part of the
    /// name, so it is left empty.
    pub fn custom(event_type: impl Into<String>, data: JsonMap) -> Self {
        Self::new(EventType::Custom(event_type.into()), String::new(), data)
    }

    fn new(event_type: EventType, action: String, data: JsonMap) -> Self {
        Self {
            event_type,
            action,
            timestamp: OffsetDateTime::now_utc(),
            data,
            source: String::new(),
            session_id: String::new(),
            origin: None,
        }
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn data(&self) -> &JsonMap {
        &self.data
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn origin(&self) -> Option<&EventOrigin> {
        self.origin.as_ref()
    }

    pub fn category(&self) -> &str {
        self.event_type.category()
    }

    pub fn full_event_type(&self) -> String {
        self.event_type.full_name(&self.action)
    }

    /// Rebuilds the event with the emitting notifier's identity.
    pub fn stamped(self, source: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self { source: source.into(), session_id: session_id.into(), ..self }
    }

    pub fn with_origin(self, origin: EventOrigin) -> Self {
        Self { origin: Some(origin), ..self }
    }

    pub fn with_timestamp(self, timestamp: OffsetDateTime) -> Self {
        Self { timestamp, ..self }
    }

    /// Flat log form: the header fields next to the payload entries. Payload entries whose
    /// names collide are kept under [`NESTED_PAYLOAD_KEY`].
    pub fn to_log_map(&self) -> JsonMap {
        let mut map = JsonMap::new();
        let mut nested = JsonMap::new();
        for (key, value) in &self.data {
            if needs_nesting(key) {
                nested.insert(key.clone(), value.clone());
            } else {
                map.insert(key.clone(), value.clone());
            }
        }
        if !nested.is_empty() {
            map.insert(NESTED_PAYLOAD_KEY.into(), JsonValue::Object(nested));
        }
        map.insert("event_type".into(), JsonValue::String(self.full_event_type()));
        map.insert("category".into(), JsonValue::String(self.category().to_string()));
        map.insert("action".into(), JsonValue::String(self.action.clone()));
        map.insert("timestamp".into(), JsonValue::String(format_timestamp(self.timestamp)));
        map.insert("source".into(), JsonValue::String(self.source.clone()));
        map.insert("session_id".into(), JsonValue::String(self.session_id.clone()));
        if let Some(origin) = &self.origin {
            if let Ok(value) = serde_json::to_value(origin) {
                map.insert("origin".into(), value);
            }
        }
        map
    }

    pub fn to_json(&self) -> String {
        JsonValue::Object(self.to_log_map()).to_string()
    }

    pub fn from_json(input: &str) -> Result<Self, EventError> {
        match serde_json::from_str(input) {
            Ok(JsonValue::Object(map)) => Self::from_log_map(map),
            Ok(_) => Err(EventError::InvalidJson { message: "expected a json object".into() }),
            Err(err) => Err(EventError::InvalidJson { message: err.to_string() }),
        }
    }

    /// Reconstructs an event from [`to_log_map`](Self::to_log_map) output.
    ///
    /// The event is standard only when `category` is a known tag and `event_type` equals
    /// `"{category}.{action}"`; everything else is rebuilt as a custom event.
    pub fn from_log_map(mut map: JsonMap) -> Result<Self, EventError> {
        let header = Header::take(&mut map)?;
        if matches!(map.get(NESTED_PAYLOAD_KEY), Some(JsonValue::Object(_))) {
            if let Some(JsonValue::Object(nested)) = map.remove(NESTED_PAYLOAD_KEY) {
                map.extend(nested);
            }
        }
        let event_type = match header.category.as_deref().map(str::parse::<EventCategory>) {
            Some(Ok(category))
                if header.event_type == format!("{}.{}", category.as_str(), header.action) =>
            {
                EventType::Standard(category)
            }
            _ => EventType::Custom(header.event_type.clone()),
        };
        Ok(header.into_event(event_type, map))
    }

    /// Parses an unsolicited `{"type": "event", ...}` frame from the remote application.
    ///
    /// Remote producers are looser than the log form: `category` may be omitted, and
    /// `event_type` may name a bare category (`"layer"` with action `"added"`).
    pub fn from_wire(mut map: JsonMap) -> Result<Self, EventError> {
        map.remove("type");
        let header = Header::take(&mut map)?;
        let event_type = match header.event_type.parse::<EventCategory>() {
            Ok(category) => EventType::Standard(category),
            Err(_) => {
                let inferred = header.category.clone().or_else(|| {
                    header.event_type.split_once('.').map(|(prefix, _)| prefix.to_string())
                });
                match inferred.as_deref().map(str::parse::<EventCategory>) {
                    Some(Ok(category))
                        if !header.action.is_empty()
                            && header.event_type
                                == format!("{}.{}", category.as_str(), header.action) =>
                    {
                        EventType::Standard(category)
                    }
                    _ => EventType::Custom(header.event_type.clone()),
                }
            }
        };
        Ok(header.into_event(event_type, map))
    }
}

struct Header {
    event_type: String,
    category: Option<String>,
    action: String,
    timestamp: OffsetDateTime,
    source: String,
    session_id: String,
    origin: Option<EventOrigin>,
}

impl Header {
    fn take(map: &mut JsonMap) -> Result<Self, EventError> {
        let event_type = take_string(map, "event_type")?
            .ok_or(EventError::MissingField { field: "event_type" })?;
        let category = take_string(map, "category")?;
        let action = take_string(map, "action")?.unwrap_or_default();
        let timestamp = match take_string(map, "timestamp")? {
            Some(raw) => parse_timestamp(&raw)?,
            None => OffsetDateTime::now_utc(),
        };
        let source = take_string(map, "source")?.unwrap_or_default();
        let session_id = take_string(map, "session_id")?.unwrap_or_default();
        let origin = match map.remove("origin") {
            None | Some(JsonValue::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|err| EventError::invalid("origin", err.to_string()))?,
            ),
        };
        Ok(Self { event_type, category, action, timestamp, source, session_id, origin })
    }

    fn into_event(self, event_type: EventType, data: JsonMap) -> StandardEvent {
        StandardEvent {
            event_type,
            action: self.action,
            timestamp: self.timestamp,
            data,
            source: self.source,
            session_id: self.session_id,
            origin: self.origin,
        }
    }
}

fn take_string(map: &mut JsonMap, field: &'static str) -> Result<Option<String>, EventError> {
    match map.remove(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(value)) => Ok(Some(value)),
        Some(other) => Err(EventError::invalid(field, format!("expected string, got {other}"))),
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}

/// RFC 3339, or an offset-less ISO 8601 timestamp which is taken as UTC.
fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, EventError> {
    if let Ok(timestamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(timestamp);
    }
    let naive = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(raw, naive)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|err| EventError::invalid("timestamp", format!("{raw}: {err}")))
}
