use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PortaError;

/// Parses a raw backend body into a shape-less JSON object.
pub type Decoder = fn(&[u8]) -> Result<Map<String, Value>, PortaError>;

/// Response encodings a backend may declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Xml,
    Yaml,
    Toml,
}

impl Encoding {
    /// Resolve the decoder for this encoding. The choice is made once at
    /// pipeline compilation, never per request.
    pub fn decoder(&self) -> Decoder {
        match self {
            Encoding::Json => json_decoder,
            Encoding::Xml => xml_decoder,
            Encoding::Yaml => yaml_decoder,
            Encoding::Toml => toml_decoder,
        }
    }
}

pub fn json_decoder(body: &[u8]) -> Result<Map<String, Value>, PortaError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PortaError::Decode(e.to_string()))?;
    into_object(value)
}

pub fn xml_decoder(body: &[u8]) -> Result<Map<String, Value>, PortaError> {
    let text = std::str::from_utf8(body).map_err(|e| PortaError::Decode(e.to_string()))?;
    let value: Value =
        quick_xml::de::from_str(text).map_err(|e| PortaError::Decode(e.to_string()))?;
    into_object(value)
}

pub fn yaml_decoder(body: &[u8]) -> Result<Map<String, Value>, PortaError> {
    let value: Value =
        serde_yaml::from_slice(body).map_err(|e| PortaError::Decode(e.to_string()))?;
    into_object(value)
}

pub fn toml_decoder(body: &[u8]) -> Result<Map<String, Value>, PortaError> {
    let text = std::str::from_utf8(body).map_err(|e| PortaError::Decode(e.to_string()))?;
    let value: Value = toml::from_str(text).map_err(|e| PortaError::Decode(e.to_string()))?;
    into_object(value)
}

fn into_object(value: Value) -> Result<Map<String, Value>, PortaError> {
    match value {
        Value::Object(data) => Ok(data),
        other => Err(PortaError::Decode(format!(
            "expected a document with an object root, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
