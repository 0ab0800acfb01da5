//! Payload schema model.
//!
//! Message payload types describe themselves through [`MessageSchema`]. The
//! resulting [`Schema`] tree drives both runtime validation and the protocol
//! document, so the wire contract and its documentation cannot drift apart.
//!
//! Named types are hoisted into a single [`Definitions`] table and referenced
//! by name. A definition is reserved *before* its body is expanded, so a
//! recursive type resolves to its own slot and a sub-schema shared by many
//! parents is emitted once.
//!
//! # Example
//!
//! ```ignore
//! impl MessageSchema for ChatMessage {
//!     fn schema_name() -> Option<Cow<'static, str>> {
//!         Some("ChatMessage".into())
//!     }
//!
//!     fn json_schema(defs: &mut Definitions) -> Schema {
//!         ObjectSchema::new()
//!             .required("text", defs.subschema::<String>().describe("Message body"))
//!             .optional("reply_to", defs.subschema::<Option<String>>())
//!             .build()
//!     }
//! }
//! ```

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::foundation::{ConnectionId, GroupName, Timestamp};

/// JSON pointer prefix under which definitions are published.
pub const COMPONENTS_REF_PREFIX: &str = "#/components/schemas/";

/// Shape of a value accepted by a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// Any JSON value.
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    /// Exactly this string.
    Const(String),
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    Array(Box<Schema>),
    /// Object with arbitrary keys and homogeneous values.
    Map(Box<Schema>),
    Object(ObjectSchema),
    /// The inner schema, or `null`.
    Nullable(Box<Schema>),
    OneOf(Vec<Schema>),
    /// Reference into [`Definitions`].
    Ref(String),
}

/// A schema node with optional documentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub description: Option<String>,
}

impl Schema {
    /// Wraps a kind without description.
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn null() -> Self {
        Self::new(SchemaKind::Null)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Integer)
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number)
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String)
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Self::new(SchemaKind::Const(value.into()))
    }

    pub fn string_enum<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(SchemaKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn array(items: Schema) -> Self {
        Self::new(SchemaKind::Array(Box::new(items)))
    }

    pub fn map(values: Schema) -> Self {
        Self::new(SchemaKind::Map(Box::new(values)))
    }

    pub fn nullable(inner: Schema) -> Self {
        Self::new(SchemaKind::Nullable(Box::new(inner)))
    }

    pub fn one_of(variants: Vec<Schema>) -> Self {
        Self::new(SchemaKind::OneOf(variants))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(SchemaKind::Ref(name.into()))
    }

    /// Attaches a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True if an absent value is acceptable where this schema is expected.
    pub fn accepts_absent(&self, defs: &Definitions) -> bool {
        match &self.kind {
            SchemaKind::Any | SchemaKind::Null | SchemaKind::Nullable(_) => true,
            SchemaKind::Ref(_) => defs
                .resolve(self)
                .is_some_and(|target| target.accepts_absent(defs)),
            _ => false,
        }
    }

    /// Renders the node as JSON Schema, references pointing at
    /// [`COMPONENTS_REF_PREFIX`].
    pub fn to_json(&self) -> Value {
        let mut value = match &self.kind {
            SchemaKind::Any => json!({}),
            SchemaKind::Null => json!({ "type": "null" }),
            SchemaKind::Boolean => json!({ "type": "boolean" }),
            SchemaKind::Integer => json!({ "type": "integer" }),
            SchemaKind::Number => json!({ "type": "number" }),
            SchemaKind::String => json!({ "type": "string" }),
            SchemaKind::Const(v) => json!({ "type": "string", "const": v }),
            SchemaKind::Enum(values) => json!({ "type": "string", "enum": values }),
            SchemaKind::Array(items) => json!({ "type": "array", "items": items.to_json() }),
            SchemaKind::Map(values) => {
                json!({ "type": "object", "additionalProperties": values.to_json() })
            }
            SchemaKind::Object(object) => object.to_json(),
            SchemaKind::Nullable(inner) => {
                json!({ "anyOf": [inner.to_json(), { "type": "null" }] })
            }
            SchemaKind::OneOf(variants) => {
                json!({ "oneOf": variants.iter().map(Schema::to_json).collect::<Vec<_>>() })
            }
            SchemaKind::Ref(name) => json!({ "$ref": format!("{}{}", COMPONENTS_REF_PREFIX, name) }),
        };

        if let (Some(description), Value::Object(map)) = (&self.description, &mut value) {
            map.insert("description".to_string(), Value::String(description.clone()));
        }
        value
    }
}

/// One named property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

/// Object schema with ordered properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    /// When false, unknown keys are rejected.
    pub additional_properties: bool,
}

impl ObjectSchema {
    /// Creates an empty object schema that tolerates unknown keys.
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            additional_properties: true,
        }
    }

    /// Adds a property that must be present.
    pub fn required(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.push(Property {
            name: name.into(),
            schema,
            required: true,
        });
        self
    }

    /// Adds a property that may be omitted.
    pub fn optional(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.push(Property {
            name: name.into(),
            schema,
            required: false,
        });
        self
    }

    /// Rejects keys not declared as properties.
    pub fn deny_unknown(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Finishes the object as a schema node.
    pub fn build(self) -> Schema {
        Schema::new(SchemaKind::Object(self))
    }

    fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for property in &self.properties {
            properties.insert(property.name.clone(), property.schema.to_json());
        }
        let required: Vec<&str> = self
            .properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut value = json!({ "type": "object", "properties": properties });
        if let Value::Object(map) = &mut value {
            if !required.is_empty() {
                map.insert("required".to_string(), json!(required));
            }
            if !self.additional_properties {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
        }
        value
    }
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised while assembling definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two distinct types published the same schema name.
    #[error("Schema name '{name}' is used by both {first} and {second}")]
    ConflictingName {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    type_id: TypeId,
    type_name: &'static str,
}

/// Table of hoisted named schemas.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    entries: BTreeMap<String, Schema>,
    owners: HashMap<String, Owner>,
    conflicts: Vec<SchemaError>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema for `T`: a reference when `T` is named, inline otherwise.
    ///
    /// Named types are expanded once. A reference requested while the same
    /// name is still being expanded (recursion) finds the name already owned
    /// and resolves to the same reference.
    pub fn subschema<T: MessageSchema + ?Sized + 'static>(&mut self) -> Schema {
        let Some(name) = T::schema_name() else {
            return T::json_schema(self);
        };
        let name = name.into_owned();
        let owner = Owner {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        };

        match self.owners.get(&name) {
            Some(existing) if existing.type_id != owner.type_id => {
                self.conflicts.push(SchemaError::ConflictingName {
                    name: name.clone(),
                    first: existing.type_name,
                    second: owner.type_name,
                });
            }
            Some(_) => {}
            None => {
                // Claimed before expansion so recursive references stop here.
                self.owners.insert(name.clone(), owner);
                let body = T::json_schema(self);
                self.entries.insert(name.clone(), body);
            }
        }

        Schema::reference(name)
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.entries.get(name)
    }

    /// Follows references until a concrete node, bounded to avoid alias loops.
    pub fn resolve<'a>(&'a self, schema: &'a Schema) -> Option<&'a Schema> {
        let mut current = schema;
        for _ in 0..=self.entries.len() {
            match &current.kind {
                SchemaKind::Ref(name) => current = self.entries.get(name)?,
                _ => return Some(current),
            }
        }
        None
    }

    /// Iterates definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Schema)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains name conflicts recorded since the last call.
    pub fn take_conflicts(&mut self) -> Vec<SchemaError> {
        std::mem::take(&mut self.conflicts)
    }

    /// Folds another table into this one.
    ///
    /// Entries owned by the same Rust type are deduplicated; a name owned by
    /// two different types is a conflict.
    pub fn merge(&mut self, other: &Definitions) -> Result<(), SchemaError> {
        for (name, schema) in &other.entries {
            let Some(other_owner) = other.owners.get(name) else {
                continue;
            };
            match self.owners.get(name) {
                Some(owner) if owner.type_id != other_owner.type_id => {
                    return Err(SchemaError::ConflictingName {
                        name: name.clone(),
                        first: owner.type_name,
                        second: other_owner.type_name,
                    });
                }
                Some(_) => {}
                None => {
                    self.owners.insert(name.clone(), *other_owner);
                    self.entries.insert(name.clone(), schema.clone());
                }
            }
        }
        Ok(())
    }
}

/// Types that can describe their JSON shape.
pub trait MessageSchema {
    /// Name under which the type is hoisted into [`Definitions`].
    ///
    /// `None` (the default) inlines the schema at every use site.
    fn schema_name() -> Option<Cow<'static, str>> {
        None
    }

    /// Builds the schema body. Nested named types should be obtained through
    /// [`Definitions::subschema`].
    fn json_schema(defs: &mut Definitions) -> Schema;
}

macro_rules! primitive_schema {
    ($ctor:ident => $($ty:ty),+) => {
        $(
            impl MessageSchema for $ty {
                fn json_schema(_defs: &mut Definitions) -> Schema {
                    Schema::$ctor()
                }
            }
        )+
    };
}

primitive_schema!(string => String, str, GroupName, ConnectionId);
primitive_schema!(boolean => bool);
primitive_schema!(integer => i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
primitive_schema!(number => f32, f64);
primitive_schema!(any => Value);
primitive_schema!(null => ());

impl MessageSchema for Timestamp {
    fn json_schema(_defs: &mut Definitions) -> Schema {
        Schema::string().describe("RFC 3339 timestamp")
    }
}

impl<T: MessageSchema + 'static> MessageSchema for Option<T> {
    fn json_schema(defs: &mut Definitions) -> Schema {
        Schema::nullable(defs.subschema::<T>())
    }
}

impl<T: MessageSchema + 'static> MessageSchema for Vec<T> {
    fn json_schema(defs: &mut Definitions) -> Schema {
        Schema::array(defs.subschema::<T>())
    }
}

impl<T: MessageSchema + ?Sized + 'static> MessageSchema for Box<T> {
    fn json_schema(defs: &mut Definitions) -> Schema {
        defs.subschema::<T>()
    }
}

impl<T: MessageSchema + 'static> MessageSchema for BTreeMap<String, T> {
    fn json_schema(defs: &mut Definitions) -> Schema {
        Schema::map(defs.subschema::<T>())
    }
}

impl<T: MessageSchema + 'static> MessageSchema for HashMap<String, T> {
    fn json_schema(defs: &mut Definitions) -> Schema {
        Schema::map(defs.subschema::<T>())
    }
}
