use crate::{
    Catalog, ColumnDescriptor, CompilationError, Connection, Database, Driver, Entity, Result,
    RowBuffer, RowNames, SluiceError, Sql, SqlArg, SqlWriter, TableDescriptor, Value,
    starts_with_keyword,
    writer::{Context, Fragment},
};
use std::sync::Arc;

/// Batch variable holding the identity generated by the last parent insert.
const PARENT_ID: &str = "ParentId";
/// Most rows a single `VALUES` list accepts.
const MAX_VALUES_ROWS: usize = 1000;

fn batch_context() -> Context {
    Context::new(Fragment::SqlBulkBatch)
}

fn invalid_mapping(table: &TableDescriptor, message: impl Into<String>) -> crate::Error {
    SluiceError::from(CompilationError::InvalidMapping {
        entity: table.name.clone(),
        message: message.into(),
    })
    .into()
}

fn key_columns<'t>(table: &'t TableDescriptor, keys: &[&str]) -> Result<Vec<&'t ColumnDescriptor>> {
    if keys.is_empty() {
        return table
            .primary_key_column()
            .map(|c| vec![c])
            .ok_or_else(|| {
                invalid_mapping(
                    table,
                    format!("primary key `{}` is not mapped", table.primary_key),
                )
            });
    }
    keys.iter().map(|k| table.resolve(k)).collect()
}

/// Child rows of one parent, inserted after it with the foreign key bound to `parent`.
fn write_children(
    writer: &dyn SqlWriter,
    context: &mut Context,
    out: &mut String,
    table: &TableDescriptor,
    foreign_key: &str,
    rows: &[crate::Row],
    parent: SqlArg,
) -> Result<()> {
    let columns = table
        .insert_columns()
        .filter(|c| !c.name.eq_ignore_ascii_case(foreign_key))
        .collect::<Vec<_>>();
    let mut names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    names.push(foreign_key);
    for group in rows.chunks(MAX_VALUES_ROWS) {
        let values = group
            .iter()
            .map(|row| {
                let mut args = columns
                    .iter()
                    .map(|c| SqlArg::Literal(row.get(c.index).unwrap_or(&Value::Null)))
                    .collect::<Vec<_>>();
                args.push(parent);
                args
            })
            .collect::<Vec<_>>();
        writer.write_insert(context, out, &table.name, &names, None, &values)?;
        out.push_str(";\n");
    }
    Ok(())
}

/// One all-or-nothing batch inserting `items` and their child collections as literals.
fn insert_batch<E: Entity>(
    writer: &dyn SqlWriter,
    catalog: &Catalog,
    table: &TableDescriptor,
    items: &[E],
    rewrite: &mut impl FnMut(&E, String) -> String,
) -> Result<String> {
    let mut context = batch_context();
    let children = table.child_columns().collect::<Vec<_>>();
    let identity = (table.auto_increment && !children.is_empty()).then_some(PARENT_ID);
    let columns = table.insert_columns().collect::<Vec<_>>();
    let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    let key = table.primary_key_column();
    let mut out = String::with_capacity(items.len() * 128);
    writer.write_batch_begin(&mut context, &mut out, identity);
    for item in items {
        let values = columns
            .iter()
            .map(|c| item.value(c.index))
            .collect::<Vec<_>>();
        let mut statement = String::with_capacity(128);
        writer.write_insert(
            &mut context,
            &mut statement,
            &table.name,
            &names,
            None,
            &[values.iter().map(SqlArg::Literal).collect()],
        )?;
        statement.push(';');
        out.push_str(&rewrite(item, statement));
        out.push('\n');
        let rows = children
            .iter()
            .filter_map(|c| Some((c, item.children(c.index).filter(|r| !r.is_empty())?)))
            .collect::<Vec<_>>();
        if rows.is_empty() {
            continue;
        }
        let parent_key;
        let parent = match identity {
            Some(identity) => {
                writer.write_capture_identity(&mut context, &mut out, identity);
                SqlArg::Variable(identity)
            }
            None => {
                let key = key.ok_or_else(|| {
                    invalid_mapping(table, "child collections need a mapped primary key")
                })?;
                parent_key = item.value(key.index);
                SqlArg::Literal(&parent_key)
            }
        };
        for (column, child_rows) in rows {
            let child_table = catalog.describe_type(child_rows.entity)?;
            let foreign_key = column
                .foreign_key
                .as_deref()
                .unwrap_or(table.primary_key.as_str());
            write_children(
                writer,
                &mut context,
                &mut out,
                &child_table,
                foreign_key,
                &child_rows.rows,
                parent,
            )?;
        }
    }
    writer.write_batch_end(&mut context, &mut out);
    Ok(out)
}

/// One all-or-nothing batch updating `items` by `keys`.
fn update_batch<E: Entity>(
    writer: &dyn SqlWriter,
    table: &TableDescriptor,
    items: &[E],
    keys: &[&ColumnDescriptor],
    values: &[&ColumnDescriptor],
    rewrite: &mut impl FnMut(&E, String) -> String,
) -> Result<String> {
    let mut context = batch_context();
    let mut out = String::with_capacity(items.len() * 128);
    writer.write_batch_begin(&mut context, &mut out, None);
    for item in items {
        let set_values = values
            .iter()
            .map(|c| item.value(c.index))
            .collect::<Vec<_>>();
        let key_values = keys.iter().map(|c| item.value(c.index)).collect::<Vec<_>>();
        let set = values
            .iter()
            .zip(&set_values)
            .map(|(c, v)| (c.name.as_str(), SqlArg::Literal(v)))
            .collect::<Vec<_>>();
        let filter = keys
            .iter()
            .zip(&key_values)
            .map(|(c, v)| (c.name.as_str(), SqlArg::Literal(v)))
            .collect::<Vec<_>>();
        let mut statement = String::with_capacity(128);
        writer.write_update(&mut context, &mut statement, &table.name, &set, &filter)?;
        statement.push(';');
        out.push_str(&rewrite(item, statement));
        out.push('\n');
    }
    writer.write_batch_end(&mut context, &mut out);
    Ok(out)
}

impl<D: Driver> Database<D> {
    /// Sends a literal batch, server errors reach the caller unwrapped.
    fn execute_batch(&mut self, batch: String) -> Result<u64> {
        let command = self.create_command(&Sql::new().raw(batch, Vec::new()))?;
        self.run(&command, |c, command| c.execute(command))
            .map(|affected| affected.rows_affected)
    }

    fn describe_bulk<E: Entity>(&self) -> Result<(Arc<TableDescriptor>, usize)> {
        Ok((
            self.catalog().describe::<E>()?,
            self.config().bulk_chunk_size.max(1),
        ))
    }

    /// Inserts `items` with their child collections, in chunks sharing one transaction.
    pub fn bulk_insert<E: Entity>(&mut self, items: &[E]) -> Result<u64> {
        self.bulk_insert_with(items, |_, statement| statement)
    }

    /// Like [`Database::bulk_insert`], `rewrite` receives each generated row statement and
    /// returns the text to send in its place.
    pub fn bulk_insert_with<E: Entity>(
        &mut self,
        items: &[E],
        mut rewrite: impl FnMut(&E, String) -> String,
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let (table, chunk_size) = self.describe_bulk::<E>()?;
        let catalog = self.catalog().clone();
        log::debug!(
            "Bulk inserting {} rows into `{}` in chunks of {chunk_size}",
            items.len(),
            table.name
        );
        self.with_transaction(|db| {
            let mut affected = 0;
            for chunk in items.chunks(chunk_size) {
                let batch = insert_batch(&db.writer, &catalog, &table, chunk, &mut rewrite)?;
                affected += db.execute_batch(batch)?;
            }
            Ok(affected)
        })
    }

    /// Stages `items` into a temporary table, then copies the staged rows matching `filter`
    /// into the table with a single `INSERT .. SELECT`. The filter sees the staged rows
    /// through the alias `s`.
    pub fn bulk_insert_filtered<E: Entity>(
        &mut self,
        items: &[E],
        filter: impl Into<Sql>,
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let filter = filter.into();
        let (table, chunk_size) = self.describe_bulk::<E>()?;
        let staging = format!("#{}_Staging", table.name);
        let columns = table.insert_columns().collect::<Vec<_>>();
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        let (filter_sql, filter_args) = filter.into_parts()?;
        let filter_sql = filter_sql.trim();
        let filter_sql = if starts_with_keyword(filter_sql, "WHERE") {
            filter_sql["WHERE".len()..].trim_start()
        } else {
            filter_sql
        };
        self.with_transaction(|db| {
            let mut context = batch_context();
            let mut create = String::with_capacity(128);
            db.writer
                .write_create_staging(&mut context, &mut create, &staging, &table.name, &names);
            db.execute_batch(create)?;
            for chunk in items.chunks(chunk_size) {
                let mut batch = String::with_capacity(chunk.len() * 128);
                db.writer.write_batch_begin(&mut context, &mut batch, None);
                for group in chunk.chunks(MAX_VALUES_ROWS) {
                    let values = group
                        .iter()
                        .map(|item| columns.iter().map(|c| item.value(c.index)).collect::<Vec<_>>())
                        .collect::<Vec<_>>();
                    let rows = values
                        .iter()
                        .map(|row| row.iter().map(SqlArg::Literal).collect())
                        .collect::<Vec<_>>();
                    db.writer
                        .write_insert(&mut context, &mut batch, &staging, &names, None, &rows)?;
                    batch.push_str(";\n");
                }
                db.writer.write_batch_end(&mut context, &mut batch);
                db.execute_batch(batch)?;
            }
            let mut context = Context::new(Fragment::SqlInsertInto);
            let mut copy = String::with_capacity(256);
            db.writer.write_insert_select(
                &mut context,
                &mut copy,
                &table.name,
                &names,
                &staging,
                filter_sql,
            );
            copy.push('\n');
            db.writer.write_drop_table(&mut context, &mut copy, &staging);
            let command = db.create_command(&Sql::new().raw(copy, filter_args))?;
            db.run(&command, |c, command| c.execute(command))
                .map(|affected| affected.rows_affected)
        })
    }

    /// Updates `items` by primary key, every writable column but the key.
    pub fn bulk_update<E: Entity>(&mut self, items: &[E]) -> Result<u64> {
        self.bulk_update_with(items, &[], &[], |_, statement| statement)
    }

    /// Updates the `values` columns of `items`, matching rows by the `keys` columns.
    ///
    /// Empty `keys` means the primary key, empty `values` every writable column that is
    /// neither a key nor server generated.
    pub fn bulk_update_with<E: Entity>(
        &mut self,
        items: &[E],
        keys: &[&str],
        values: &[&str],
        mut rewrite: impl FnMut(&E, String) -> String,
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let (table, chunk_size) = self.describe_bulk::<E>()?;
        let keys = key_columns(&table, keys)?;
        let values = if values.is_empty() {
            table
                .select_columns()
                .filter(|c| !c.auto_increment && !keys.iter().any(|k| k.index == c.index))
                .collect::<Vec<_>>()
        } else {
            values
                .iter()
                .map(|v| table.resolve(v))
                .collect::<Result<Vec<_>>>()?
        };
        if values.is_empty() {
            return Err(invalid_mapping(&table, "there are no columns to update"));
        }
        self.with_transaction(|db| {
            let mut affected = 0;
            for chunk in items.chunks(chunk_size) {
                let batch = update_batch(&db.writer, &table, chunk, &keys, &values, &mut rewrite)?;
                affected += db.execute_batch(batch)?;
            }
            Ok(affected)
        })
    }

    /// Streams the insert columns of `items` into the table with the driver bulk copy.
    pub fn bulk_copy<E: Entity>(&mut self, items: &[E]) -> Result<u64> {
        let table = self.catalog().describe::<E>()?;
        let columns = table.insert_columns().collect::<Vec<_>>();
        let names: RowNames = columns.iter().map(|c| c.name.clone()).collect();
        let mut sql = String::from("INSERT BULK ");
        let mut context = Context::new(Fragment::SqlInsertInto);
        self.writer
            .write_identifier_quoted(&mut context, &mut sql, &table.name);
        let buffer = RowBuffer {
            columns: names,
            rows: items
                .iter()
                .map(|item| columns.iter().map(|c| item.value(c.index)).collect())
                .collect(),
        };
        let command = crate::Command {
            sql,
            ..Default::default()
        };
        self.run(&command, |c, _| c.bulk_copy(&table.name, buffer))
            .map(|affected| affected.rows_affected)
    }
}
