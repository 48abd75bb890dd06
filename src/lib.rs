//! Micro data-access engine for SQL Server.
//!
//! Records are plain structs deriving [`Entity`]. Predicates written with [`expr!`] compile
//! to parameterized T-SQL, statements are composed with [`Sql`], and a [`Database`] runs
//! them over any [`Driver`], materializing rows back into records.
//!
//! ```rust
//! use sluice::{Entity, Sql, expr};
//!
//! #[derive(Entity, Default)]
//! #[sluice(table = "FD_Customer", rename_all = "PascalCase")]
//! struct Customer {
//!     id: i32,
//!     name: String,
//!     active: bool,
//! }
//!
//! let prefix = "Ro";
//! let sql = Sql::new()
//!     .where_expr::<Customer>(expr!(|c| c.name.starts_with(prefix) && c.active))
//!     .order_by::<Customer>(&["name"]);
//! assert_eq!(
//!     sql.sql().unwrap(),
//!     "WHERE (t.[Name] LIKE @0 AND t.[Active] = 1)\nORDER BY t.[Name]"
//! );
//! ```
//!
//! Inside [`expr!`] the closure parameter always names the record, a captured variable with
//! the same name is shadowed and the record itself cannot be used as a value:
//!
//! ```compile_fail
//! use sluice::{Entity, expr};
//!
//! #[derive(Entity, Default)]
//! #[sluice(table = "FD_Customer")]
//! struct Customer {
//!     id: i32,
//! }
//!
//! let c = 5;
//! let predicate = expr!(|c| c.id == c);
//! ```
pub use sluice_core::*;
pub use sluice_macros::*;
