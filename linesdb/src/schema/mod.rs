// Schema normalization - turns caller declarations into model descriptors

mod types;

pub use types::{FieldDeclaration, FieldDescriptor, FieldSpec, FieldType, ModelDescriptor};

use crate::error::{LinesDbError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Check the model naming convention: non-empty, leading ASCII uppercase,
/// alphanumeric throughout.
pub fn check_model_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => first.is_ascii_uppercase() && chars.all(|c| c.is_ascii_alphanumeric()),
        None => false,
    };

    if !valid {
        return Err(LinesDbError::Schema(format!(
            "Model naming mismatch: '{name}' must be alphanumeric and start with an uppercase letter"
        )));
    }
    Ok(())
}

/// Normalize a raw schema declaration into a model descriptor.
///
/// A string value is shorthand for `{type: value}`; an object value is used
/// as-is. Every field must resolve a type. Each field is completed with
/// `required: false` and a type-derived default unless the declaration
/// overrides them. `fk` fields must name a target `model` and are
/// aggregated into the descriptor's foreign-key map.
pub fn normalize(name: &str, declaration: &Value) -> Result<ModelDescriptor> {
    check_model_name(name)?;

    let raw: HashMap<String, FieldDeclaration> = serde_json::from_value(declaration.clone())
        .map_err(|e| {
            LinesDbError::Schema(format!("Malformed schema for model '{name}': {e}"))
        })?;

    if raw.is_empty() {
        return Err(LinesDbError::Schema(format!("Missing schema for model '{name}'")));
    }

    let mut fields = HashMap::new();
    let mut foreign_keys = HashMap::new();

    for (field_name, declared) in &raw {
        let (field_type, spec) = match declared {
            FieldDeclaration::Shorthand(type_name) => (FieldType::from(type_name.as_str()), None),
            FieldDeclaration::Full(spec) => {
                let type_name = spec.field_type.as_deref().ok_or_else(|| {
                    LinesDbError::Schema(format!(
                        "Field '{field_name}' on model '{name}' does not declare a type"
                    ))
                })?;
                (FieldType::from(type_name), Some(spec))
            }
        };

        if field_type == FieldType::Fk {
            let target = spec.and_then(|s| s.model.as_deref()).ok_or_else(|| {
                LinesDbError::Schema(format!(
                    "FK field '{field_name}' on model '{name}' does not name a target model"
                ))
            })?;
            foreign_keys.insert(field_name.clone(), target.to_string());
        }

        let descriptor = FieldDescriptor {
            required: spec.and_then(|s| s.required).unwrap_or(false),
            default: spec
                .and_then(|s| s.default.clone())
                .unwrap_or_else(|| field_type.default_value()),
            field_type,
        };
        fields.insert(field_name.clone(), descriptor);
    }

    Ok(ModelDescriptor {
        name: name.to_string(),
        fields,
        foreign_keys,
    })
}
