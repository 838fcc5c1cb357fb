use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single field as declared by the caller: either a shorthand type string
/// or the long object form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDeclaration {
    Shorthand(String),
    Full(FieldSpec),
}

/// The long form of a field declaration. Everything but `type` is optional;
/// normalization fills in what is left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Field type enumeration. Unrecognized type names are carried through as
/// `Custom` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Fk,
    #[serde(untagged)]
    Custom(std::string::String),
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "fk" => Self::Fk,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl FieldType {
    /// The type-derived default used when a declaration does not override it.
    pub fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Float => serde_json::json!(0.0),
            Self::Integer | Self::Fk | Self::Custom(_) => serde_json::json!(0),
        }
    }
}

/// A fully normalized field: type, required flag, and default value are all
/// resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Value,
}

/// The canonical descriptor for one model type: the normalized schema plus
/// the aggregated foreign-key map (field name → target model name).
/// Created once at registration and immutable afterward.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: HashMap<String, FieldDescriptor>,
    pub foreign_keys: HashMap<String, String>,
}
