//! Typed callers for the remote application's command set.
//!
//! Each builder only assembles the parameter object; what a command does is up to the remote
//! plugin. [`Command::from_request`] maps a client request onto the matching builder.

use cadlink_events::JsonMap;
use cadlink_mux::{Multiplexer, MuxError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Request parameters that do not fit the named command.
#[derive(Debug, thiserror::Error)]
#[error("invalid params for {command}: {message}")]
pub struct InvalidParams {
    pub command: String,
    pub message: String,
}

impl InvalidParams {
    fn new(command: &str, message: impl Into<String>) -> Self {
        Self { command: command.to_string(), message: message.into() }
    }
}

/// One command ready to be sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    command_type: &'static str,
    params: JsonMap,
}

/// Identifies a single object or layer by id or by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Id(String),
    Name(String),
}

impl Target {
    fn insert_into(&self, params: &mut JsonMap, id_key: &str) {
        match self {
            Self::Id(id) => params.insert(id_key.to_string(), json!(id)),
            Self::Name(name) => params.insert("name".to_string(), json!(name)),
        };
    }
}

/// Placement applied to a created or modified object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    /// Radians around x, y and z.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f64; 3]>,
}

/// Parameters of one object to create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// `POINT`, `LINE`, `BOX`, `SPHERE`, ...
    #[serde(rename = "type", default = "default_object_type")]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    /// Geometry specific parameters.
    #[serde(default)]
    pub params: JsonMap,
    #[serde(flatten)]
    pub transform: Transform,
}

fn default_object_type() -> String {
    "BOX".to_string()
}

impl ObjectSpec {
    pub fn new(object_type: impl Into<String>, params: JsonMap) -> Self {
        Self {
            object_type: object_type.into(),
            name: None,
            color: None,
            params,
            transform: Transform::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn colored(mut self, color: [u8; 3]) -> Self {
        self.color = Some(color);
        self
    }

    pub fn transformed(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// Changes to one existing object. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_color: Option<[u8; 3]>,
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    And,
    Or,
}

impl FilterMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// How a request addresses its object or layer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Addressed {
    id: Option<String>,
    guid: Option<String>,
    name: Option<String>,
    all: bool,
}

impl Addressed {
    /// The id wins when both id and name are given.
    fn target(self, id_key: &str) -> Option<Target> {
        let id = if id_key == "guid" { self.guid } else { self.id };
        id.map(Target::Id).or(self.name.map(Target::Name))
    }
}

#[derive(Deserialize)]
struct Batch<T> {
    objects: Vec<T>,
    #[serde(default)]
    all: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct SelectedInfo {
    include_attributes: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Selection {
    filters: JsonMap,
    filters_type: FilterMode,
}

#[derive(Deserialize)]
struct NewLayer {
    name: String,
    color: Option<[u8; 3]>,
    parent: Option<String>,
}

#[derive(Deserialize)]
struct Script {
    code: String,
}

fn parse<T: DeserializeOwned>(command: &str, params: &JsonValue) -> Result<T, InvalidParams> {
    T::deserialize(params).map_err(|err| InvalidParams::new(command, err.to_string()))
}

fn required_target(command: &str, params: &JsonValue, id_key: &str) -> Result<Target, InvalidParams> {
    parse::<Addressed>(command, params)?
        .target(id_key)
        .ok_or_else(|| InvalidParams::new(command, format!("{id_key} or name is required")))
}

impl Command {
    /// Builds a known command from request parameters.
    ///
    /// `Ok(None)` means the name is not one of the typed commands; such requests are forwarded
    /// unchanged. `null` params count as an empty object.
    pub fn from_request(command_type: &str, params: &JsonValue) -> Result<Option<Self>, InvalidParams> {
        let empty = JsonValue::Object(JsonMap::new());
        let params = match params {
            JsonValue::Null => &empty,
            JsonValue::Object(_) => params,
            _ => return Err(InvalidParams::new(command_type, "params must be an object")),
        };
        let command = match command_type {
            "get_document_info" => Self::get_document_info(),
            "get_object_info" => Self::get_object_info(&required_target(command_type, params, "id")?),
            "get_selected_objects_info" => {
                let info: SelectedInfo = parse(command_type, params)?;
                Self::get_selected_objects_info(info.include_attributes)
            }
            "create_object" => Self::create_object(&parse(command_type, params)?),
            "create_objects" => {
                let batch: Batch<ObjectSpec> = parse(command_type, params)?;
                Self::create_objects(&batch.objects)
            }
            "modify_object" => Self::modify_object(
                &required_target(command_type, params, "id")?,
                &parse(command_type, params)?,
            ),
            "modify_objects" => {
                let batch: Batch<JsonMap> = parse(command_type, params)?;
                Self::modify_objects(batch.objects, batch.all)
            }
            "delete_object" => {
                let addressed: Addressed = parse(command_type, params)?;
                if addressed.all {
                    Self::delete_all_objects()
                } else {
                    let target = addressed
                        .target("id")
                        .ok_or_else(|| InvalidParams::new(command_type, "id, name or all is required"))?;
                    Self::delete_object(&target)
                }
            }
            "select_objects" => {
                let selection: Selection = parse(command_type, params)?;
                Self::select_objects(selection.filters, selection.filters_type)
            }
            "create_layer" => {
                let layer: NewLayer = parse(command_type, params)?;
                Self::create_layer(&layer.name, layer.color, layer.parent.as_deref())
            }
            "delete_layer" => Self::delete_layer(&required_target(command_type, params, "guid")?),
            "get_or_set_current_layer" => {
                let addressed: Addressed = parse(command_type, params)?;
                Self::get_or_set_current_layer(addressed.target("guid").as_ref())
            }
            "execute_rhinoscript_python_code" => {
                let script: Script = parse(command_type, params)?;
                Self::execute_rhinoscript_python_code(&script.code)
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    fn new(command_type: &'static str) -> Self {
        Self { command_type, params: JsonMap::new() }
    }

    fn with(mut self, key: &str, value: JsonValue) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    fn with_serialized(mut self, value: &impl Serialize) -> Self {
        if let Ok(JsonValue::Object(map)) = serde_json::to_value(value) {
            self.params.extend(map);
        }
        self
    }

    pub fn command_type(&self) -> &'static str {
        self.command_type
    }

    pub fn params(&self) -> &JsonMap {
        &self.params
    }

    pub async fn send(self, mux: &Multiplexer) -> Result<JsonValue, MuxError> {
        mux.send_command(self.command_type, JsonValue::Object(self.params)).await
    }

    pub fn get_document_info() -> Self {
        Self::new("get_document_info")
    }

    pub fn get_object_info(target: &Target) -> Self {
        let mut command = Self::new("get_object_info");
        target.insert_into(&mut command.params, "id");
        command
    }

    pub fn get_selected_objects_info(include_attributes: bool) -> Self {
        Self::new("get_selected_objects_info").with("include_attributes", json!(include_attributes))
    }

    pub fn create_object(spec: &ObjectSpec) -> Self {
        Self::new("create_object").with_serialized(spec)
    }

    pub fn create_objects(specs: &[ObjectSpec]) -> Self {
        Self::new("create_objects").with("objects", json!(specs))
    }

    pub fn modify_object(target: &Target, changes: &ObjectChanges) -> Self {
        let mut command = Self::new("modify_object").with_serialized(changes);
        target.insert_into(&mut command.params, "id");
        command
    }

    /// `all` applies the first entry of `objects` to every object in the document.
    pub fn modify_objects(objects: Vec<JsonMap>, all: bool) -> Self {
        let command = Self::new("modify_objects").with("objects", json!(objects));
        if all {
            command.with("all", json!(true))
        } else {
            command
        }
    }

    pub fn delete_object(target: &Target) -> Self {
        let mut command = Self::new("delete_object");
        target.insert_into(&mut command.params, "id");
        command
    }

    pub fn delete_all_objects() -> Self {
        Self::new("delete_object").with("all", json!(true))
    }

    /// Every filter value is a list of accepted values. No filters selects everything.
    pub fn select_objects(filters: JsonMap, mode: FilterMode) -> Self {
        Self::new("select_objects")
            .with("filters", JsonValue::Object(filters))
            .with("filters_type", json!(mode.as_str()))
    }

    pub fn create_layer(name: &str, color: Option<[u8; 3]>, parent: Option<&str>) -> Self {
        let mut command = Self::new("create_layer").with("name", json!(name));
        if let Some(color) = color {
            command = command.with("color", json!(color));
        }
        if let Some(parent) = parent {
            command = command.with("parent", json!(parent));
        }
        command
    }

    pub fn delete_layer(target: &Target) -> Self {
        let mut command = Self::new("delete_layer");
        target.insert_into(&mut command.params, "guid");
        command
    }

    /// Reads the current layer when `target` is `None`, otherwise switches to it.
    pub fn get_or_set_current_layer(target: Option<&Target>) -> Self {
        let mut command = Self::new("get_or_set_current_layer");
        if let Some(target) = target {
            target.insert_into(&mut command.params, "guid");
        }
        command
    }

    pub fn execute_rhinoscript_python_code(code: &str) -> Self {
        Self::new("execute_rhinoscript_python_code").with("code", json!(code))
    }
}
