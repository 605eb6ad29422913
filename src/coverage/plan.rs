//! Plan tree walk

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::errors::{CoverageError, CoverageResult};

/// Field naming a plan node's operator
pub const OPERATOR_FIELD: &str = "#operator";
/// Operator that reads documents from primary storage
pub const FETCH_OPERATOR: &str = "Fetch";

/// True when no object in the tree is a `Fetch` operator.
///
/// Objects are searched through all their values. Arrays are searched
/// through their object elements only; scalars are ignored.
pub fn is_covered(plan: &Map<String, Value>) -> bool {
    for (field, value) in plan {
        if field == OPERATOR_FIELD && value.as_str() == Some(FETCH_OPERATOR) {
            return false;
        }
        match value {
            Value::Object(child) => {
                if !is_covered(child) {
                    return false;
                }
            }
            Value::Array(items) => {
                let fetch_in_items = items.iter().any(|item| match item {
                    Value::Object(child) => !is_covered(child),
                    _ => false,
                });
                if fetch_in_items {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// `is_covered` over an arbitrary JSON value. The root must be an object.
pub fn check_plan(plan: &Value) -> CoverageResult<bool> {
    match plan {
        Value::Object(map) => Ok(is_covered(map)),
        Value::Null => Err(CoverageError::NotAnObject("null")),
        Value::Bool(_) => Err(CoverageError::NotAnObject("boolean")),
        Value::Number(_) => Err(CoverageError::NotAnObject("number")),
        Value::String(_) => Err(CoverageError::NotAnObject("string")),
        Value::Array(_) => Err(CoverageError::NotAnObject("array")),
    }
}

/// Reads an explain plan from a JSON file
pub fn load_plan(path: &Path) -> CoverageResult<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
