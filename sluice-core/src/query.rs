use crate::{Value, truncate_long};
use indexmap::IndexMap;
use std::{
    fmt::{self, Display},
    sync::Arc,
    time::Duration,
};

/// Result of a non-query command.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Identity generated by the last insert, when the driver reports it.
    pub last_affected_id: Option<i64>,
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice, aligned by index with the cursor columns.
pub type Row = Box<[Value]>;

/// Name-keyed record built from whatever columns a query returns.
pub type DynamicRow = IndexMap<String, Value>;

/// Parameterized command handed to the driver.
///
/// Placeholders are `@0`, `@1`, ... numbered densely and matching `args` by position.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Command {
    pub sql: String,
    pub args: Vec<Value>,
    pub timeout: Option<Duration>,
    /// The command runs inside the open transaction of the shared connection.
    pub in_transaction: bool,
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))?;
        for (i, arg) in self.args.iter().enumerate() {
            write!(f, "\n\t -> @{i} [{arg:?}]")?;
        }
        Ok(())
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(current_page: u64, items_per_page: u64, total_items: u64, items: Vec<T>) -> Self {
        Self {
            current_page,
            total_pages: total_pages(total_items, items_per_page),
            total_items,
            items_per_page,
            items,
        }
    }
}

pub fn total_pages(total_items: u64, items_per_page: u64) -> u64 {
    if items_per_page == 0 {
        return 0;
    }
    total_items.div_ceil(items_per_page)
}
