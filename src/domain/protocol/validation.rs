//! Structural validation of JSON values against [`Schema`] trees.
//!
//! Validation never stops at the first problem: every mismatch is reported
//! with the path of the offending value, so a client can fix all fields of a
//! rejected envelope in one round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{Definitions, ObjectSchema, Schema, SchemaKind};

/// Schemas nested deeper than this are reported instead of walked.
const MAX_DEPTH: usize = 128;

/// One step of a location path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A single client-visible problem.
///
/// Serialized as `{"type": ..., "loc": [...], "msg": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub loc: Vec<PathSegment>,
    pub msg: String,
}

impl ErrorEntry {
    pub fn new(kind: impl Into<String>, loc: Vec<PathSegment>, msg: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            loc,
            msg: msg.into(),
        }
    }
}

/// Validates `value` against `schema`, appending problems under `loc`.
pub fn validate(
    value: &Value,
    schema: &Schema,
    defs: &Definitions,
    loc: &[PathSegment],
) -> Vec<ErrorEntry> {
    let mut walker = Walker {
        defs,
        path: loc.to_vec(),
        problems: Vec::new(),
    };
    walker.check(value, schema, 0);
    walker.problems
}

struct Walker<'a> {
    defs: &'a Definitions,
    path: Vec<PathSegment>,
    problems: Vec<ErrorEntry>,
}

impl Walker<'_> {
    fn report(&mut self, kind: &str, msg: impl Into<String>) {
        self.problems.push(ErrorEntry::new(kind, self.path.clone(), msg));
    }

    fn nested(&mut self, segment: PathSegment, value: &Value, schema: &Schema, depth: usize) {
        self.path.push(segment);
        self.check(value, schema, depth + 1);
        self.path.pop();
    }

    fn check(&mut self, value: &Value, schema: &Schema, depth: usize) {
        if depth > MAX_DEPTH {
            self.report("recursion_limit", "Value is nested too deeply");
            return;
        }

        match &schema.kind {
            SchemaKind::Any => {}
            SchemaKind::Null => {
                if !value.is_null() {
                    self.report("none_required", "Input should be null");
                }
            }
            SchemaKind::Boolean => {
                if !value.is_boolean() {
                    self.report("bool_type", "Input should be a valid boolean");
                }
            }
            SchemaKind::Integer => {
                if !(value.is_i64() || value.is_u64()) {
                    self.report("int_type", "Input should be a valid integer");
                }
            }
            SchemaKind::Number => {
                if !value.is_number() {
                    self.report("float_type", "Input should be a valid number");
                }
            }
            SchemaKind::String => {
                if !value.is_string() {
                    self.report("string_type", "Input should be a valid string");
                }
            }
            SchemaKind::Const(expected) => {
                if value.as_str() != Some(expected.as_str()) {
                    self.report("literal_error", format!("Input should be '{}'", expected));
                }
            }
            SchemaKind::Enum(allowed) => {
                let ok = value
                    .as_str()
                    .is_some_and(|s| allowed.iter().any(|a| a == s));
                if !ok {
                    let options: Vec<String> = allowed.iter().map(|a| format!("'{}'", a)).collect();
                    self.report("enum", format!("Input should be {}", options.join(", ")));
                }
            }
            SchemaKind::Array(items) => match value.as_array() {
                Some(elements) => {
                    for (index, element) in elements.iter().enumerate() {
                        self.nested(PathSegment::Index(index), element, items, depth);
                    }
                }
                None => self.report("list_type", "Input should be a valid list"),
            },
            SchemaKind::Map(values) => match value.as_object() {
                Some(entries) => {
                    for (key, entry) in entries {
                        self.nested(PathSegment::Key(key.clone()), entry, values, depth);
                    }
                }
                None => self.report("dict_type", "Input should be a valid dictionary"),
            },
            SchemaKind::Object(object) => self.check_object(value, object, depth),
            SchemaKind::Nullable(inner) => {
                if !value.is_null() {
                    self.check(value, inner, depth + 1);
                }
            }
            SchemaKind::OneOf(variants) => {
                let matches = variants
                    .iter()
                    .any(|variant| validate(value, variant, self.defs, &self.path).is_empty());
                if !matches {
                    self.report("union_type", "Input does not match any allowed variant");
                }
            }
            SchemaKind::Ref(name) => {
                let defs = self.defs;
                match defs.get(name) {
                    Some(target) => self.check(value, target, depth + 1),
                    None => self.report("schema_error", format!("Unresolved schema '{}'", name)),
                }
            }
        }
    }

    fn check_object(&mut self, value: &Value, object: &ObjectSchema, depth: usize) {
        let Some(fields) = value.as_object() else {
            self.report("model_type", "Input should be a valid dictionary or object");
            return;
        };

        for property in &object.properties {
            match fields.get(&property.name) {
                Some(field) => {
                    self.nested(PathSegment::Key(property.name.clone()), field, &property.schema, depth)
                }
                None if property.required => {
                    self.path.push(PathSegment::Key(property.name.clone()));
                    self.report("missing", "Field required");
                    self.path.pop();
                }
                None => {}
            }
        }

        if !object.additional_properties {
            for key in fields.keys() {
                if !object.properties.iter().any(|p| &p.name == key) {
                    self.path.push(PathSegment::Key(key.clone()));
                    self.report("extra_forbidden", "Extra inputs are not permitted");
                    self.path.pop();
                }
            }
        }
    }
}
