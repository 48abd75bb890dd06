mod as_value;
mod bulk;
mod cache;
mod catalog;
mod config;
mod database;
mod driver;
mod entity;
mod error;
mod expression;
mod materializer;
mod paging;
mod query;
mod statement;
#[cfg(test)]
mod testing;
mod transaction;
mod util;
mod value;
pub mod writer;

pub use ::anyhow::Context;
pub use as_value::*;
pub use cache::*;
pub use catalog::*;
pub use config::*;
pub use database::*;
pub use driver::*;
pub use entity::*;
pub use error::*;
pub use expression::*;
pub use materializer::*;
pub use paging::*;
pub use query::*;
pub use statement::*;
pub use transaction::*;
pub use util::*;
pub use value::*;
pub use writer::{SqlArg, SqlWriter, TSqlWriter, MIN_DATETIME};

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
