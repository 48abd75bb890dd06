use crate::{Command, Result, Row, RowNames, RowsAffected, Value};

/// Database backend.
///
/// A driver opens connections from a connection url. Everything else happens on the
/// [`Connection`].
pub trait Driver: Send + Sync {
    type Connection: Connection;

    const NAME: &'static str;

    fn connect(&self, url: &str) -> Result<Self::Connection>;
}

/// An open physical connection.
pub trait Connection: Send {
    fn execute(&mut self, command: &Command) -> Result<RowsAffected>;
    /// First column of the first row, NULL when there are no rows.
    fn scalar(&mut self, command: &Command) -> Result<Value>;
    /// Forward-only cursor over the rows produced by the command.
    fn query(&mut self, command: &Command) -> Result<Box<dyn Cursor>>;
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    /// Server-side bulk copy of the buffer into the named table.
    fn bulk_copy(&mut self, table: &str, buffer: RowBuffer) -> Result<RowsAffected>;
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Column as reported by a cursor: its label and a typed NULL describing its type.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorColumn {
    pub name: String,
    pub value: Value,
}

impl CursorColumn {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub trait Cursor: Iterator<Item = Result<Row>> + Send {
    fn columns(&self) -> &[CursorColumn];
}

/// Tabular buffer for bulk copy.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    pub columns: RowNames,
    pub rows: Vec<Row>,
}
