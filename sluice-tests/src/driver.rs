use parking_lot::Mutex;
use sluice::{
    Command, Connection, Cursor, CursorColumn, Driver, Result, Row, RowBuffer, RowsAffected,
    SluiceError, Value,
};
use std::{mem, sync::Arc, vec};

/// What the scripted server saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Close,
    Begin,
    Commit,
    Rollback,
    Execute(String),
    Scalar(String),
    Query(String),
    BulkCopy { table: String, rows: usize },
}

/// Scripted answer to a command.
#[derive(Debug, Clone)]
pub enum Response {
    Scalar(Value),
    Rows {
        columns: Vec<CursorColumn>,
        rows: Vec<Row>,
    },
    Affected(u64),
    /// Server error, surfaced as `SluiceError::Execution`.
    Fail {
        message: String,
        severity: u8,
        state: u8,
    },
}

impl Response {
    pub fn rows(columns: &[(&str, Value)], rows: Vec<Vec<Value>>) -> Self {
        Response::Rows {
            columns: columns
                .iter()
                .map(|(name, value)| CursorColumn::new(*name, value.clone()))
                .collect(),
            rows: rows.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Response::Fail {
            message: message.into(),
            severity: 16,
            state: 1,
        }
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    /// Matching commands to let through before answering.
    skip: usize,
    response: Response,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    commands: Vec<Command>,
    rules: Vec<Rule>,
    pending_rows: u64,
    committed_rows: u64,
}

impl State {
    fn respond(&mut self, command: &Command) -> Option<Response> {
        for rule in &mut self.rules {
            if !command.sql.contains(&rule.pattern) {
                continue;
            }
            if rule.skip > 0 {
                rule.skip -= 1;
                continue;
            }
            return Some(rule.response.clone());
        }
        None
    }
}

fn fail(message: String, severity: u8, state: u8) -> sluice::Error {
    SluiceError::Execution {
        message,
        severity: Some(severity),
        state: Some(state),
    }
    .into()
}

/// In memory driver answering commands from a script and recording everything it receives.
///
/// Clones share the same script and record.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<Mutex<State>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Answers every command containing `pattern` with `response`.
    pub fn on(&self, pattern: &str, response: Response) -> &Self {
        self.on_nth(pattern, 1, response)
    }

    /// Answers the `occurrence`-th (starting at 1) and later commands containing `pattern`.
    pub fn on_nth(&self, pattern: &str, occurrence: usize, response: Response) -> &Self {
        self.state.lock().rules.push(Rule {
            pattern: pattern.into(),
            skip: occurrence.saturating_sub(1),
            response,
        });
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.state.lock().commands.last().cloned()
    }

    /// Text of the non-query commands.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.state.lock().events.iter().filter(|e| *e == event).count()
    }

    /// Rows written outside of a transaction or by committed transactions.
    pub fn committed_rows(&self) -> u64 {
        self.state.lock().committed_rows
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.events.clear();
        state.commands.clear();
    }
}

impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    const NAME: &'static str = "scripted";

    fn connect(&self, _url: &str) -> Result<Self::Connection> {
        self.state.lock().events.push(Event::Connect);
        Ok(ScriptedConnection {
            state: self.state.clone(),
            in_transaction: false,
        })
    }
}

pub struct ScriptedConnection {
    state: Arc<Mutex<State>>,
    in_transaction: bool,
}

impl ScriptedConnection {
    fn record(&self, event: Event, command: &Command) -> Option<Response> {
        let mut state = self.state.lock();
        state.events.push(event);
        state.commands.push(command.clone());
        state.respond(command)
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, command: &Command) -> Result<RowsAffected> {
        let affected = match self.record(Event::Execute(command.sql.clone()), command) {
            Some(Response::Fail {
                message,
                severity,
                state,
            }) => return Err(fail(message, severity, state)),
            Some(Response::Affected(rows)) => rows,
            _ => (command.sql.matches("INSERT INTO").count()
                + command.sql.matches("UPDATE [").count()) as u64,
        };
        let mut state = self.state.lock();
        if self.in_transaction {
            state.pending_rows += affected;
        } else {
            state.committed_rows += affected;
        }
        Ok(RowsAffected {
            rows_affected: affected,
            last_affected_id: None,
        })
    }

    fn scalar(&mut self, command: &Command) -> Result<Value> {
        match self.record(Event::Scalar(command.sql.clone()), command) {
            Some(Response::Fail {
                message,
                severity,
                state,
            }) => Err(fail(message, severity, state)),
            Some(Response::Scalar(value)) => Ok(value),
            Some(Response::Rows { rows, .. }) => Ok(rows
                .into_iter()
                .next()
                .and_then(|row| row.into_vec().into_iter().next())
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    fn query(&mut self, command: &Command) -> Result<Box<dyn Cursor>> {
        let (columns, rows) = match self.record(Event::Query(command.sql.clone()), command) {
            Some(Response::Fail {
                message,
                severity,
                state,
            }) => return Err(fail(message, severity, state)),
            Some(Response::Rows { columns, rows }) => (columns, rows),
            Some(Response::Scalar(value)) => (
                vec![CursorColumn::new("", value.as_null())],
                vec![Row::from([value])],
            ),
            _ => (Vec::new(), Vec::new()),
        };
        Ok(Box::new(ScriptedCursor {
            columns,
            rows: rows.into_iter(),
        }))
    }

    fn begin(&mut self) -> Result<()> {
        self.state.lock().events.push(Event::Begin);
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(Event::Commit);
        let pending = mem::take(&mut state.pending_rows);
        state.committed_rows += pending;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(Event::Rollback);
        state.pending_rows = 0;
        self.in_transaction = false;
        Ok(())
    }

    fn bulk_copy(&mut self, table: &str, buffer: RowBuffer) -> Result<RowsAffected> {
        let mut state = self.state.lock();
        let rows = buffer.rows.len();
        state.events.push(Event::BulkCopy {
            table: table.into(),
            rows,
        });
        if self.in_transaction {
            state.pending_rows += rows as u64;
        } else {
            state.committed_rows += rows as u64;
        }
        Ok(RowsAffected {
            rows_affected: rows as u64,
            last_affected_id: None,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().events.push(Event::Close);
        Ok(())
    }
}

pub struct ScriptedCursor {
    columns: Vec<CursorColumn>,
    rows: vec::IntoIter<Row>,
}

impl Iterator for ScriptedCursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(Ok)
    }
}

impl Cursor for ScriptedCursor {
    fn columns(&self) -> &[CursorColumn] {
        &self.columns
    }
}
