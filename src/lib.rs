//! # qspec
//!
//! A declarative query specification compiled two ways: into SQL for a
//! live database, or interpreted directly over in-memory relation
//! snapshots. Both backends share one join resolver, so multi-relation
//! queries are wired identically no matter where they run.
//!
//! ## Quick Example
//!
//! ```
//! use qspec::prelude::*;
//!
//! let schema = Schema::new()
//!     .with(Relation::new("public", "customers").pk("id", "int").column("name", "text"))
//!     .with(
//!         Relation::new("public", "orders")
//!             .pk("id", "int")
//!             .fk("customer_id", "int", ColumnRef::new("public", "customers", "id"))
//!             .column("total", "numeric"),
//!     );
//!
//! let spec = QuerySpec::new()
//!     .relation("public.customers")
//!     .relation("public.orders")
//!     .select("customers.name")
//!     .select("orders.total")
//!     .aggregate("orders.total", AggregateFunc::Sum)
//!     .group_by("customers.name")
//!     .limit(10);
//!
//! let sql = qspec::compile(&schema, &spec).unwrap();
//! assert!(sql.contains("LEFT JOIN public.orders ON customers.id = orders.customer_id"));
//! ```
//!
//! ## Join resolution
//!
//! | Priority | Strategy             | Kind  |
//! |----------|----------------------|-------|
//! | 1        | Explicit join        | as declared |
//! | 2        | Foreign key forward  | LEFT  |
//! | 3        | Foreign key backward | LEFT  |
//! | 4        | Name forward         | LEFT  |
//! | 5        | Name backward        | LEFT  |
//! | 6        | Cartesian fallback   | INNER |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod transpiler;
pub mod validator;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::{OutputFormat, QspecConfig};
    pub use crate::engine::{Backend, Dialect, QspecDb};
    pub use crate::error::*;
    pub use crate::interpreter::{ResultRow, Row, Snapshots};
    pub use crate::resolver::{JoinOrigin, ResolvedJoin, resolve};
    pub use crate::schema::{Column, ColumnRef, Relation, Schema};
    pub use crate::transpiler::ToSql;
    pub use crate::validator::{Issue, Severity};
}

use ast::QuerySpec;
use error::{QspecError, QspecResult};
use interpreter::{ResultRow, Snapshots};
use schema::Schema;

/// Resolve joins for `spec` and compile it to SQL.
pub fn compile(schema: &Schema, spec: &QuerySpec) -> QspecResult<String> {
    if spec.relations.is_empty() {
        return Err(QspecError::EmptyQuerySpec);
    }
    let joins = resolver::resolve(schema, &spec.relations, &spec.joins);
    transpiler::compile(spec, &joins)
}

/// Resolve joins for `spec` and evaluate it over `snapshots`.
pub fn run(schema: &Schema, snapshots: &Snapshots, spec: &QuerySpec) -> QspecResult<Vec<ResultRow>> {
    if spec.relations.is_empty() {
        return Err(QspecError::EmptyQuerySpec);
    }
    let joins = resolver::resolve(schema, &spec.relations, &spec.joins);
    interpreter::run(schema, snapshots, spec, &joins)
}
