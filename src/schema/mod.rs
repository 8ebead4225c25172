//! Schema gateway.
//!
//! Every coercion and assertion the orchestrator performs goes through
//! [`SchemaGateway`], which owns the registry of declared schemas and the
//! strictness policy. The rule engine behind each schema is a
//! [`ShapeRules`] trait object so it can be swapped per schema.

mod rules;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::cache::lock::{rw_read, rw_write};

pub use rules::{FieldKind, FieldRule, FieldRules, ShapeRules};

const SOURCE: &str = "schema";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{schema}: missing required field `{field}`")]
    MissingField { schema: String, field: String },
    #[error("{schema}: field `{field}` must be {expected}")]
    TypeMismatch {
        schema: String,
        field: String,
        expected: FieldKind,
    },
    #[error("{schema}: unknown field `{field}`")]
    UnknownField { schema: String, field: String },
    #[error("{schema}: expected an object")]
    NotAnObject { schema: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Struct,
    Enum,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaOpts {
    /// State key used when the schema seeds state directly.
    pub state_name: Option<String>,
    /// Invalidation group purged whenever a response of this schema arrives.
    pub cache: Option<String>,
    pub enums: Option<Value>,
    /// Default state handed to `create`.
    pub state: Map<String, Value>,
}

#[derive(Debug)]
pub struct Schema {
    name: String,
    schema_type: SchemaType,
    opts: SchemaOpts,
    rules: Arc<dyn ShapeRules>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        schema_type: SchemaType,
        opts: SchemaOpts,
        rules: Arc<dyn ShapeRules>,
    ) -> Self {
        Self {
            name: name.into(),
            schema_type,
            opts,
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_type(&self) -> SchemaType {
        self.schema_type
    }

    pub fn opts(&self) -> &SchemaOpts {
        &self.opts
    }
}

/// Declarative form of a schema as it appears in a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDeclaration {
    pub name: String,
    #[serde(default, rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub cache: Option<String>,
    #[serde(default)]
    pub enums: Option<Value>,
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl From<SchemaDeclaration> for Schema {
    fn from(decl: SchemaDeclaration) -> Self {
        let opts = SchemaOpts {
            state_name: decl.state_name,
            cache: decl.cache,
            enums: decl.enums,
            state: decl.state,
        };
        Schema::new(
            decl.name,
            decl.schema_type,
            opts,
            Arc::new(FieldRules::new(decl.fields)),
        )
    }
}

/// Registry of declared schemas plus the validation policy applied to them.
pub struct SchemaGateway {
    strict: bool,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaGateway {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Register a schema, replacing any earlier one with the same name.
    pub fn register(&self, schema: Schema) {
        debug!(schema = schema.name(), kind = ?schema.schema_type(), "Declared schema");
        rw_write(&self.schemas, SOURCE, "register")
            .insert(schema.name.clone(), Arc::new(schema));
    }

    pub fn declare(&self, declarations: impl IntoIterator<Item = SchemaDeclaration>) {
        for decl in declarations {
            self.register(decl.into());
        }
    }

    pub fn get_schema(&self, name: &str) -> Option<Arc<Schema>> {
        rw_read(&self.schemas, SOURCE, "get_schema").get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = rw_read(&self.schemas, SOURCE, "names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Coerce and accept `input` against `schema`.
    pub fn extract(
        &self,
        schema: &Schema,
        input: Map<String, Value>,
    ) -> Result<Map<String, Value>, SchemaError> {
        schema.rules.extract(&schema.name, input, self.strict)
    }

    /// Assert that `output` conforms to `schema`.
    pub fn check(&self, schema: &Schema, output: &Value) -> Result<(), SchemaError> {
        schema.rules.check(&schema.name, output, self.strict)
    }

    /// Build default state for `schema`, overlaying `defaults`.
    pub fn create(&self, schema: &Schema, defaults: Map<String, Value>) -> Map<String, Value> {
        schema.rules.create(defaults)
    }

    /// Snapshot of the state a schema seeds when no route exists for its name.
    ///
    /// Enum schemas yield a deep copy of their enum table; struct schemas yield
    /// `create` over their declared default state.
    pub fn seed_state(&self, schema: &Schema) -> Value {
        match schema.schema_type {
            SchemaType::Enum => schema.opts.enums.clone().unwrap_or(Value::Null),
            SchemaType::Struct => Value::Object(self.create(schema, schema.opts.state.clone())),
        }
    }
}
