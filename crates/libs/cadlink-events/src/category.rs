use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Tool-neutral event categories shared by most CAD and 3D applications.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Geometry,
    Selection,
    Layer,
    Group,
    /// Block definitions and instances (collections in other tools).
    Block,
    Material,
    Texture,
    View,
    Display,
    Document,
    Custom,
    Error,
}

impl EventCategory {
    pub const ALL: [EventCategory; 12] = [
        Self::Geometry,
        Self::Selection,
        Self::Layer,
        Self::Group,
        Self::Block,
        Self::Material,
        Self::Texture,
        Self::View,
        Self::Display,
        Self::Document,
        Self::Custom,
        Self::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Selection => "selection",
            Self::Layer => "layer",
            Self::Group => "group",
            Self::Block => "block",
            Self::Material => "material",
            Self::Texture => "texture",
            Self::View => "view",
            Self::Display => "display",
            Self::Document => "document",
            Self::Custom => "custom",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = EventError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| EventError::UnknownCategory { value: value.to_string() })
    }
}

/// Either a standard category or a tool-specific event string.
///
/// Custom strings conventionally look like `"<tool>.<what_happened>"`; the part before the
/// first `.` is reported as their category.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Standard(EventCategory),
    Custom(String),
}

impl EventType {
    /// Display category: the standard tag, or the prefix of a dotted custom string.
    pub fn category(&self) -> &str {
        match self {
            Self::Standard(category) => category.as_str(),
            Self::Custom(name) => match name.split_once('.') {
                Some((prefix, _)) => prefix,
                None => EventCategory::Custom.as_str(),
            },
        }
    }

    /// Full event name; standard categories are joined with their action.
    pub fn full_name(&self, action: &str) -> String {
        match self {
            Self::Standard(category) => format!("{}.{}", category.as_str(), action),
            Self::Custom(name) => name.clone(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<EventCategory> for EventType {
    fn from(category: EventCategory) -> Self {
        Self::Standard(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_roundtrip_through_from_str() {
        for category in EventCategory::ALL {
            let parsed: EventCategory = category.as_str().parse().expect("known category");
            assert_eq!(parsed, category);
        }
        assert!(matches!(
            "nurbs".parse::<EventCategory>(),
            Err(EventError::UnknownCategory { value }) if value == "nurbs"
        ));
    }

    #[test]
    fn custom_category_is_prefix_before_first_dot() {
        let event_type = EventType::Custom("rhino.grasshopper.baked".into());
        assert_eq!(event_type.category(), "rhino");
        assert_eq!(event_type.full_name("ignored"), "rhino.grasshopper.baked");
    }

    #[test]
    fn undotted_custom_string_reports_custom_category() {
        assert_eq!(EventType::Custom("snapshot".into()).category(), "custom");
    }

    #[test]
    fn standard_full_name_joins_action() {
        let event_type = EventType::from(EventCategory::Layer);
        assert_eq!(event_type.category(), "layer");
        assert_eq!(event_type.full_name("renamed"), "layer.renamed");
        assert!(!event_type.is_custom());
    }
}
