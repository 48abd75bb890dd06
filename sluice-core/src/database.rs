use crate::{
    AsValue, Catalog, Command, CompilationError, Connection, Context as _, Cursor, DatabaseConfig,
    Driver, DynamicRow, Entity, Error, Expr, Materializer, MaterializerCache, MaterializerKey,
    Page, Result, RowShape, SluiceError, Sql, SqlArg, SqlWriter, TSqlWriter, Value,
    paged_statements, process_params, starts_with_keyword, truncate_long,
    writer::{Context, Fragment},
};
use std::{sync::Arc, time::Duration};

/// Observer of everything a [`Database`] does, every method defaults to doing nothing.
pub trait Hooks: Send + Sync {
    fn on_connection_opened(&self, _url: &str) {}
    fn on_connection_closing(&self, _url: &str) {}
    fn on_executing_command(&self, _command: &Command) {}
    fn on_executed_command(&self, _command: &Command) {}
    fn on_begin_transaction(&self) {}
    /// The outermost transaction ended, `committed` is false after a rollback.
    fn on_end_transaction(&self, _committed: bool) {}
    /// A command failed, called before the error reaches the caller.
    fn on_exception(&self, command: &Command, error: &Error) {
        log::error!("{error:#}\n{command}");
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

/// Statement prefixes that are sent as they are by the typed fetches.
const COMPLETE_STATEMENTS: [&str; 4] = ["SELECT", "EXECUTE", "EXEC", "CALL"];

/// Data access entry point over a single connection.
///
/// The connection is reference counted: it opens on the first request and closes when the
/// last one is released, unless `keep_connection_alive` is configured. Transactions nest the
/// same way, only the outermost scope talks to the server. An instance is meant to be used
/// by one caller at a time.
pub struct Database<D: Driver> {
    driver: D,
    url: String,
    config: DatabaseConfig,
    pub(crate) connection: Option<D::Connection>,
    shared_depth: usize,
    transaction_depth: usize,
    cancelled: bool,
    one_time_timeout: Option<Duration>,
    last_command: Option<Command>,
    catalog: Arc<Catalog>,
    materializers: Arc<MaterializerCache>,
    pub(crate) hooks: Box<dyn Hooks>,
    pub(crate) writer: TSqlWriter,
}

impl<D: Driver> Database<D> {
    /// Database over `url`, engine settings are read from its query string.
    pub fn new(driver: D, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let config = DatabaseConfig::from_url(&url)?;
        Ok(Self {
            driver,
            url,
            config,
            connection: None,
            shared_depth: 0,
            transaction_depth: 0,
            cancelled: false,
            one_time_timeout: None,
            last_command: None,
            catalog: Catalog::global(),
            materializers: MaterializerCache::global(),
            hooks: Box::new(DefaultHooks),
            writer: TSqlWriter::new(),
        })
    }

    pub fn with_config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_materializers(mut self, materializers: Arc<MaterializerCache>) -> Self {
        self.materializers = materializers;
        self
    }

    pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn materializers(&self) -> &Arc<MaterializerCache> {
        &self.materializers
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Timeout of the next command only, it falls back to the configured one afterwards.
    pub fn one_time_command_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.one_time_timeout = Some(timeout);
        self
    }

    pub fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    pub fn last_sql(&self) -> Option<&str> {
        self.last_command.as_ref().map(|c| c.sql.as_str())
    }

    pub fn last_args(&self) -> &[Value] {
        self.last_command
            .as_ref()
            .map(|c| c.args.as_slice())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of open requests on the shared connection.
    pub fn connection_depth(&self) -> usize {
        self.shared_depth
    }

    pub fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    fn connection_identity(&self) -> String {
        format!("{}:{}", D::NAME, self.url)
    }

    pub(crate) fn new_sql(&self) -> Sql {
        Sql::new()
            .with_catalog(self.catalog.clone())
            .with_hint(self.config.table_hint.clone())
    }

    /// Acquires the shared connection, connecting on the first request.
    pub fn open_shared_connection(&mut self) -> Result<()> {
        if self.shared_depth == 0 {
            if self.connection.is_none() {
                let connection = self
                    .driver
                    .connect(&self.url)
                    .with_context(|| format!("While connecting to `{}`", D::NAME))?;
                self.connection = Some(connection);
                self.hooks.on_connection_opened(&self.url);
                log::debug!("Connected through `{}`", D::NAME);
            }
            if self.config.keep_connection_alive {
                self.shared_depth += 1;
            }
        }
        self.shared_depth += 1;
        Ok(())
    }

    /// Releases one request on the shared connection, the last one closes it.
    pub fn close_shared_connection(&mut self) -> Result<()> {
        match self.shared_depth {
            0 => Ok(()),
            1 => {
                self.shared_depth = 0;
                self.disconnect()
            }
            _ => {
                self.shared_depth -= 1;
                Ok(())
            }
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        self.hooks.on_connection_closing(&self.url);
        log::debug!("Closing the `{}` connection", D::NAME);
        connection.close()
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut D::Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| Error::msg("The connection is not open"))
    }

    /// Enters a transaction scope, only the outermost one begins a server transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction_depth == 0 {
            self.open_shared_connection()?;
            if let Err(error) = self.connection_mut().and_then(|c| c.begin()) {
                let _ = self.close_shared_connection();
                return Err(error.context("While beginning a transaction"));
            }
            self.cancelled = false;
            self.hooks.on_begin_transaction();
        }
        self.transaction_depth += 1;
        Ok(())
    }

    /// Leaves a transaction scope successfully.
    pub fn complete_transaction(&mut self) -> Result<()> {
        self.end_transaction()
    }

    /// Leaves a transaction scope marking the whole transaction for rollback, a later
    /// complete of an outer scope cannot undo it.
    pub fn abort_transaction(&mut self) -> Result<()> {
        self.cancelled = true;
        self.end_transaction()
    }

    fn end_transaction(&mut self) -> Result<()> {
        match self.transaction_depth {
            0 => return Err(Error::msg("There is no transaction to end")),
            1 => self.transaction_depth = 0,
            _ => {
                self.transaction_depth -= 1;
                return Ok(());
            }
        }
        let commit = !self.cancelled;
        self.cancelled = false;
        let result = self.connection_mut().and_then(|connection| {
            if commit {
                connection.commit()
            } else {
                connection.rollback()
            }
        });
        self.hooks.on_end_transaction(commit && result.is_ok());
        let closed = self.close_shared_connection();
        result.with_context(|| {
            if commit {
                "While committing the transaction"
            } else {
                "While rolling back the transaction"
            }
        })?;
        closed
    }

    /// Runs `f` inside a transaction scope, completed when `f` succeeds and aborted otherwise.
    pub fn with_transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.complete_transaction()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(abort) = self.abort_transaction() {
                    log::error!("{abort:#}");
                }
                Err(error)
            }
        }
    }

    /// Prepares the command of `sql`: placeholders renumbered, `@@` unescaped, timeout
    /// resolved. The command is recorded as the last one.
    pub fn create_command(&mut self, sql: &Sql) -> Result<Command> {
        let text = sql.sql()?;
        let args = sql.arguments()?;
        let mut dest = Vec::with_capacity(args.len());
        let processed = process_params(text, args, &mut dest)?;
        let command = Command {
            sql: processed.replace("@@", "@"),
            args: dest,
            timeout: self.one_time_timeout.take().or(self.config.command_timeout),
            in_transaction: self.transaction_depth > 0,
        };
        log::debug!("{command}");
        self.last_command = Some(command.clone());
        Ok(command)
    }

    /// Sends `command` through `op` on the shared connection, calling the hooks.
    pub(crate) fn run<T>(
        &mut self,
        command: &Command,
        op: impl FnOnce(&mut D::Connection, &Command) -> Result<T>,
    ) -> Result<T> {
        self.open_shared_connection()?;
        self.hooks.on_executing_command(command);
        let result = self.connection_mut().and_then(|c| op(c, command));
        match &result {
            Ok(..) => self.hooks.on_executed_command(command),
            Err(error) => self.hooks.on_exception(command, error),
        }
        let closed = self.close_shared_connection();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Executes a statement that returns no rows.
    pub fn execute(&mut self, sql: impl Into<Sql>) -> Result<u64> {
        let command = self.create_command(&sql.into())?;
        self.run(&command, |c, command| c.execute(command))
            .with_context(|| format!("While executing `{}`", truncate_long!(command.sql)))
            .map(|affected| affected.rows_affected)
    }

    /// First column of the first row, NULL when there are no rows.
    pub fn execute_scalar_value(&mut self, sql: impl Into<Sql>) -> Result<Value> {
        let command = self.create_command(&sql.into())?;
        self.run(&command, |c, command| c.scalar(command))
            .with_context(|| format!("While executing `{}`", truncate_long!(command.sql)))
    }

    /// First column of the first row, converted into `T`.
    pub fn execute_scalar<T: AsValue>(&mut self, sql: impl Into<Sql>) -> Result<T> {
        T::try_from_value(self.execute_scalar_value(sql)?)
    }

    /// Opens a cursor for `command` and caches the materializer built by `build`.
    fn open_rows<T: 'static>(
        &mut self,
        command: Command,
        shape: RowShape,
        build: impl FnOnce(&dyn Cursor, bool) -> Result<Materializer<T>>,
    ) -> Result<Rows<'_, D, T>> {
        self.open_shared_connection()?;
        self.hooks.on_executing_command(&command);
        let cursor = match self.connection_mut().and_then(|c| c.query(&command)) {
            Ok(cursor) => cursor,
            Err(error) => {
                self.hooks.on_exception(&command, &error);
                let _ = self.close_shared_connection();
                return Err(error
                    .context(format!("While querying `{}`", truncate_long!(command.sql))));
            }
        };
        let force_utc = self.config.force_date_times_to_utc;
        let key = MaterializerKey {
            sql: command.sql.clone(),
            connection: self.connection_identity(),
            force_utc,
            first_column: 0,
            column_count: cursor.columns().len(),
            shape,
        };
        let materializer = match self
            .materializers
            .get_or_build(key, || build(&*cursor, force_utc))
        {
            Ok(materializer) => materializer,
            Err(error) => {
                self.hooks.on_exception(&command, &error);
                let _ = self.close_shared_connection();
                return Err(error);
            }
        };
        self.hooks.on_executed_command(&command);
        Ok(Rows {
            database: self,
            cursor,
            materializer,
            command,
        })
    }

    /// Completes a statement that is not a full query with `SELECT <columns> FROM <table>`.
    pub fn auto_select<E: Entity>(&self, sql: Sql) -> Result<Sql> {
        let text = sql.sql()?;
        if COMPLETE_STATEMENTS
            .iter()
            .any(|k| starts_with_keyword(text, k))
        {
            return Ok(sql);
        }
        let base = self.new_sql().select::<E>(&[]);
        let base = if starts_with_keyword(text, "FROM") {
            base
        } else {
            base.from::<E>()
        };
        Ok(base.append(sql))
    }

    /// Lazy forward-only iterator of the records returned by `sql`.
    ///
    /// A statement that is only a filter (`WHERE ..`, `ORDER BY ..`, empty) selects the
    /// mapped columns of `E` from its table.
    pub fn query<E: Entity>(&mut self, sql: impl Into<Sql>) -> Result<Rows<'_, D, E>> {
        let sql = self.auto_select::<E>(sql.into())?;
        let table = self.catalog.describe::<E>()?;
        let command = self.create_command(&sql)?;
        self.open_rows(command, RowShape::Entity(E::entity_type()), |cursor, force_utc| {
            let columns = cursor.columns();
            Ok(Materializer::entity(
                &table,
                columns,
                0,
                columns.len(),
                force_utc,
            ))
        })
    }

    pub fn fetch<E: Entity>(&mut self, sql: impl Into<Sql>) -> Result<Vec<E>> {
        self.query::<E>(sql)?.collect()
    }

    /// Rows of `sql` as name keyed maps, the statement is sent as it is.
    pub fn query_dynamic(&mut self, sql: impl Into<Sql>) -> Result<Rows<'_, D, DynamicRow>> {
        let command = self.create_command(&sql.into())?;
        self.open_rows(command, RowShape::Dynamic, |cursor, _| {
            let columns = cursor.columns();
            Ok(Materializer::dynamic(columns, 0, columns.len()))
        })
    }

    pub fn fetch_dynamic(&mut self, sql: impl Into<Sql>) -> Result<Vec<DynamicRow>> {
        self.query_dynamic(sql)?.collect()
    }

    /// Records of `E` matching `predicate`.
    pub fn fetch_where<E: Entity>(&mut self, predicate: impl Into<Expr>) -> Result<Vec<E>> {
        let sql = self.new_sql().where_expr::<E>(predicate);
        self.fetch::<E>(sql)
    }

    /// First record returned by `sql`.
    pub fn first<E: Entity>(&mut self, sql: impl Into<Sql>) -> Result<Option<E>> {
        self.query::<E>(sql)?.next().transpose()
    }

    /// First record of `E` matching `predicate`.
    pub fn first_where<E: Entity>(&mut self, predicate: impl Into<Expr>) -> Result<Option<E>> {
        let sql = self.new_sql().where_expr::<E>(predicate);
        self.first::<E>(sql)
    }

    /// Page `page` (starting at 1) of `per_page` records, with the total count of `sql`.
    pub fn page<E: Entity>(
        &mut self,
        page: u64,
        per_page: u64,
        sql: impl Into<Sql>,
    ) -> Result<Page<E>> {
        let page = page.max(1);
        let skip = (page - 1).checked_mul(per_page).ok_or_else(|| {
            Error::msg(format!(
                "Page {page} of {per_page} items starts beyond the addressable rows"
            ))
        })?;
        let sql = self.auto_select::<E>(sql.into())?;
        let (count, _) = self.paged_sql(&sql, None)?;
        let total = self.execute_scalar::<u64>(count)?;
        let (_, window) = self.paged_sql(&sql, Some((skip, per_page)))?;
        let items = self.fetch::<E>(window)?;
        Ok(Page::new(page, per_page, total, items))
    }

    /// Records `skip + 1 ..= skip + take` of `sql`.
    pub fn skip_take<E: Entity>(
        &mut self,
        skip: u64,
        take: u64,
        sql: impl Into<Sql>,
    ) -> Result<Vec<E>> {
        let sql = self.auto_select::<E>(sql.into())?;
        let (_, page) = self.paged_sql(&sql, Some((skip, take)))?;
        self.fetch::<E>(page)
    }

    /// Count and page statements of `sql`, the page one bound to `window` (skip, take).
    fn paged_sql(&self, sql: &Sql, window: Option<(u64, u64)>) -> Result<(Sql, Sql)> {
        let args = sql.arguments()?.to_vec();
        let paged = paged_statements(&self.writer, sql.sql()?, args.len())?;
        let mut page_args = args.clone();
        if let Some((skip, take)) = window {
            let bound = |n: u64| Value::Int64(Some(i64::try_from(n).unwrap_or(i64::MAX)));
            page_args.push(bound(skip));
            page_args.push(bound(skip.saturating_add(take)));
        }
        Ok((
            Sql::new().raw(paged.count, args),
            Sql::new().raw(paged.page, page_args),
        ))
    }

    /// Inserts `item` with bound parameters. A server generated key is read back into the
    /// record.
    pub fn insert<E: Entity>(&mut self, item: &mut E) -> Result<u64> {
        let table = self.catalog.describe::<E>()?;
        let columns = table.insert_columns().collect::<Vec<_>>();
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        let key = table.primary_key_column().filter(|c| c.auto_increment);
        let mut sql = String::with_capacity(128);
        self.writer.write_insert(
            &mut Context::new(Fragment::SqlInsertInto),
            &mut sql,
            &table.name,
            &names,
            key.map(|c| c.name.as_str()),
            &[(0..columns.len()).map(SqlArg::Parameter).collect()],
        )?;
        let args = columns.iter().map(|c| item.value(c.index)).collect();
        let sql = Sql::new().raw(sql, args);
        match key {
            Some(key) => {
                let id = self.execute_scalar_value(sql)?;
                let id = id.coerce_to(&key.prototype).map_err(|e| SluiceError::Conversion {
                    column: key.name.clone(),
                    message: format!("{e:#}"),
                })?;
                item.set_value(key.index, id)?;
                Ok(1)
            }
            None => self.execute(sql),
        }
    }

    /// Updates the given fields of `item` by primary key, every writable column when `fields`
    /// is empty.
    pub fn update<E: Entity>(&mut self, item: &E, fields: &[&str]) -> Result<u64> {
        let table = self.catalog.describe::<E>()?;
        let Some(key) = table.primary_key_column() else {
            return Err(SluiceError::from(CompilationError::InvalidMapping {
                entity: table.name.clone(),
                message: format!("primary key `{}` is not mapped", table.primary_key),
            })
            .into());
        };
        let columns = if fields.is_empty() {
            table
                .select_columns()
                .filter(|c| c.index != key.index && !c.auto_increment)
                .collect::<Vec<_>>()
        } else {
            fields
                .iter()
                .map(|f| table.resolve(f))
                .collect::<Result<Vec<_>>>()?
        };
        let set = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), SqlArg::Parameter(i)))
            .collect::<Vec<_>>();
        let mut sql = String::with_capacity(128);
        self.writer.write_update(
            &mut Context::new(Fragment::SqlUpdate),
            &mut sql,
            &table.name,
            &set,
            &[(key.name.as_str(), SqlArg::Parameter(columns.len()))],
        )?;
        let mut args = columns
            .iter()
            .map(|c| item.value(c.index))
            .collect::<Vec<_>>();
        args.push(item.value(key.index));
        self.execute(Sql::new().raw(sql, args))
    }
}

impl<D: Driver> Drop for Database<D> {
    fn drop(&mut self) {
        if self.transaction_depth > 0 {
            log::warn!(
                "Dropping a database with {} open transaction scopes, rolling back",
                self.transaction_depth
            );
            if let Some(connection) = self.connection.as_mut() {
                if let Err(error) = connection.rollback() {
                    log::error!("{error:#}");
                }
            }
            self.transaction_depth = 0;
        }
        self.shared_depth = 0;
        if let Err(error) = self.disconnect() {
            log::error!("{error:#}");
        }
    }
}

/// Lazy cursor over the materialized rows of a query, it holds the shared connection until
/// dropped.
pub struct Rows<'a, D: Driver, T> {
    database: &'a mut Database<D>,
    cursor: Box<dyn Cursor>,
    materializer: Arc<Materializer<T>>,
    command: Command,
}

impl<D: Driver, T> Rows<'_, D, T> {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

impl<D: Driver, T> Iterator for Rows<'_, D, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.cursor.next()? {
            Ok(row) => self.materializer.materialize(row),
            Err(error) => Err(error),
        };
        if let Err(error) = &result {
            self.database.hooks.on_exception(&self.command, error);
        }
        Some(result)
    }
}

impl<D: Driver, T> Drop for Rows<'_, D, T> {
    fn drop(&mut self) {
        if let Err(error) = self.database.close_shared_connection() {
            log::error!("{error:#}");
        }
    }
}
