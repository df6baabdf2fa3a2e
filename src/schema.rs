//! Schema model: relation and column metadata.
//!
//! Supplied by whatever introspects the database. Loads from JSON (the
//! introspection format, camelCase aliases accepted) or from a compact
//! text format.
//!
//! # Example
//! ```
//! use qspec::schema::Schema;
//!
//! let json = r#"{
//!     "relations": [{
//!         "schemaName": "public",
//!         "tableName": "users",
//!         "columns": [
//!             { "name": "id", "type": "int4", "isPrimaryKey": true },
//!             { "name": "email", "type": "varchar" }
//!         ]
//!     }]
//! }"#;
//!
//! let schema = Schema::from_json(json).unwrap();
//! assert_eq!(schema.relations[0].columns.len(), 2);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ast::{DEFAULT_SCHEMA, RelationId};
use crate::error::{QspecError, QspecResult};
use crate::parser;

/// Database schema: relations in introspection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(alias = "tables")]
    pub relations: Vec<Relation>,
}

/// A table-like entity with an ordered column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default = "default_schema", alias = "schemaName")]
    pub schema: String,
    #[serde(alias = "tableName", alias = "name")]
    pub table: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

/// Column metadata. A column is a foreign key exactly when it carries a
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", alias = "typ", default)]
    pub typ: String,
    #[serde(default, alias = "isPrimaryKey")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnRef>,
}

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// Whether this reference points into the given relation.
    pub fn targets(&self, relation: &RelationId) -> bool {
        self.schema == relation.schema && self.table == relation.table
    }
}

impl Column {
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            typ: typ.into(),
            primary_key: false,
            references: None,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}

impl Relation {
    /// Create an empty relation definition.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn id(&self) -> RelationId {
        RelationId::new(self.schema.clone(), self.table.clone())
    }

    pub fn is(&self, id: &RelationId) -> bool {
        self.schema == id.schema && self.table == id.table
    }

    /// Builder: add a plain column.
    pub fn column(mut self, name: &str, typ: &str) -> Self {
        self.columns.push(Column::new(name, typ));
        self
    }

    /// Builder: add a primary key column.
    pub fn pk(mut self, name: &str, typ: &str) -> Self {
        let mut col = Column::new(name, typ);
        col.primary_key = true;
        self.columns.push(col);
        self
    }

    /// Builder: add a foreign key column referencing `schema.table.column`.
    pub fn fk(mut self, name: &str, typ: &str, references: ColumnRef) -> Self {
        let mut col = Column::new(name, typ);
        col.references = Some(references);
        self.columns.push(col);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column most likely to be the row identity.
    ///
    /// Priority: a column literally named `grid`, then any primary key,
    /// then a column literally named `id`.
    pub fn pk_like(&self) -> Option<&Column> {
        self.find_column("grid")
            .or_else(|| self.columns.iter().find(|c| c.primary_key))
            .or_else(|| self.find_column("id"))
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    /// Builder: add a relation.
    pub fn with(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn relation(&self, id: &RelationId) -> Option<&Relation> {
        self.relations.iter().find(|r| r.is(id))
    }

    /// Load schema from a JSON string.
    pub fn from_json(json: &str) -> QspecResult<Self> {
        serde_json::from_str(json).map_err(|e| QspecError::schema(e.to_string()))
    }

    /// Load schema from the text format:
    ///
    /// ```text
    /// table public.orders (
    ///     id int pk,
    ///     customer_id int -> public.customers.id,
    ///     total numeric
    /// )
    /// ```
    pub fn from_text(input: &str) -> QspecResult<Self> {
        parser::parse_schema(input)
    }

    /// Load schema from a file path (`.json` → JSON, else text format).
    pub fn from_file(path: &Path) -> QspecResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QspecError::schema(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let schema = if path.extension().map(|e| e == "json").unwrap_or(false) {
            Self::from_json(&content)?
        } else {
            Self::from_text(&content)?
        };
        tracing::info!(
            "Loaded {} relations from {}",
            schema.relations.len(),
            path.display()
        );
        Ok(schema)
    }
}
