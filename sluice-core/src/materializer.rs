use crate::{
    Converter, CursorColumn, DynamicRow, Entity, EntityType, Error, Result, Row, RowNames,
    SluiceError, TableDescriptor, Value,
};
use parking_lot::RwLock;
use std::{
    any::Any,
    collections::HashMap,
    mem,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};
use time::{PrimitiveDateTime, UtcOffset};

/// Target of a materializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowShape {
    Entity(EntityType),
    Dynamic,
}

/// Identity of a cached materializer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterializerKey {
    pub sql: String,
    /// Identity of the connection the statement ran on.
    pub connection: String,
    pub force_utc: bool,
    pub first_column: usize,
    pub column_count: usize,
    pub shape: RowShape,
}

#[derive(Debug, Clone, Copy)]
enum Conversion {
    /// Declared converter, it sees every value including NULL.
    Custom(Converter),
    /// Date and time value normalized to UTC.
    Utc,
    /// Cursor type already matches the field.
    Direct,
    Coerce,
}

#[derive(Debug)]
struct Binding {
    cursor_index: usize,
    field_index: usize,
    column: String,
    prototype: Value,
    conversion: Conversion,
}

fn to_utc(value: Value, prototype: &Value) -> Result<Value> {
    Ok(match (value, prototype) {
        (Value::Timestamp(Some(v)), Value::TimestampWithTimezone(..)) => {
            Value::TimestampWithTimezone(Some(v.assume_utc()))
        }
        (Value::TimestampWithTimezone(Some(v)), Value::TimestampWithTimezone(..)) => {
            Value::TimestampWithTimezone(Some(v.to_offset(UtcOffset::UTC)))
        }
        (Value::TimestampWithTimezone(Some(v)), Value::Timestamp(..)) => {
            let v = v.to_offset(UtcOffset::UTC);
            Value::Timestamp(Some(PrimitiveDateTime::new(v.date(), v.time())))
        }
        (value, prototype) => coerce(value, prototype)?,
    })
}

fn coerce(value: Value, prototype: &Value) -> Result<Value> {
    if let (Value::Timestamp(Some(..)), Value::TimestampWithTimezone(..)) = (&value, prototype) {
        return Err(Error::msg(
            "A timestamp without offset needs UTC forcing to be read into an offset timestamp",
        ));
    }
    value.coerce_to(prototype)
}

impl Binding {
    fn convert(&self, value: Value) -> Result<Value> {
        match self.conversion {
            Conversion::Custom(converter) => converter(value),
            Conversion::Utc => to_utc(value, &self.prototype),
            Conversion::Direct => Ok(value),
            Conversion::Coerce => coerce(value, &self.prototype),
        }
    }
}

/// Conversion routine from one cursor row into a `T`.
pub struct Materializer<T> {
    convert: Box<dyn Fn(Row) -> Result<T> + Send + Sync>,
}

impl<T> Materializer<T> {
    pub fn new(convert: impl Fn(Row) -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            convert: Box::new(convert),
        }
    }

    pub fn materialize(&self, row: Row) -> Result<T> {
        (self.convert)(row)
    }
}

impl<E: Entity> Materializer<E> {
    /// Binds the cursor columns `first_column..first_column + column_count` to the columns of
    /// `table`, by case insensitive name. Cursor columns without a match are ignored.
    pub fn entity(
        table: &TableDescriptor,
        columns: &[CursorColumn],
        first_column: usize,
        column_count: usize,
        force_utc: bool,
    ) -> Self {
        let end = (first_column + column_count).min(columns.len());
        let bindings = columns
            .get(first_column..end)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter_map(|(i, cursor)| {
                let column = table
                    .column_by_name(&cursor.name)
                    .filter(|c| !c.is_child())?;
                let conversion = match column.converter {
                    Some(converter) => Conversion::Custom(converter),
                    None if force_utc
                        && matches!(
                            column.prototype,
                            Value::Timestamp(..) | Value::TimestampWithTimezone(..)
                        ) =>
                    {
                        Conversion::Utc
                    }
                    None if cursor.value.same_type(&column.prototype) => Conversion::Direct,
                    None => Conversion::Coerce,
                };
                Some(Binding {
                    cursor_index: first_column + i,
                    field_index: column.index,
                    column: column.name.clone(),
                    prototype: column.prototype.clone(),
                    conversion,
                })
            })
            .collect::<Vec<_>>();
        log::trace!(
            "Bound {} of {} cursor columns to `{}`",
            bindings.len(),
            end.saturating_sub(first_column),
            table.name
        );
        Materializer::new(move |row: Row| {
            let mut row = row.into_vec();
            let mut entity = E::default();
            for binding in &bindings {
                let value = row
                    .get_mut(binding.cursor_index)
                    .map(|v| mem::replace(v, Value::Null))
                    .unwrap_or(Value::Null);
                let value = binding.convert(value).map_err(|e| SluiceError::Conversion {
                    column: binding.column.clone(),
                    message: format!("{e:#}"),
                })?;
                if value.is_null() {
                    continue;
                }
                entity
                    .set_value(binding.field_index, value)
                    .map_err(|e| SluiceError::Conversion {
                        column: binding.column.clone(),
                        message: format!("{e:#}"),
                    })?;
            }
            Ok(entity)
        })
    }
}

impl Materializer<DynamicRow> {
    /// Every cursor column becomes a key of the row, in cursor order.
    pub fn dynamic(columns: &[CursorColumn], first_column: usize, column_count: usize) -> Self {
        let end = (first_column + column_count).min(columns.len());
        let labels: RowNames = columns
            .get(first_column..end)
            .unwrap_or_default()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        Materializer::new(move |row: Row| {
            let mut row = row.into_vec();
            Ok(labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let value = row
                        .get_mut(first_column + i)
                        .map(|v| mem::replace(v, Value::Null))
                        .unwrap_or(Value::Null);
                    (label.clone(), value)
                })
                .collect())
        })
    }
}

static GLOBAL: LazyLock<Arc<MaterializerCache>> = LazyLock::new(Default::default);

/// Process lifetime store of materializers, one per statement shape and target.
#[derive(Default)]
pub struct MaterializerCache {
    entries: RwLock<HashMap<MaterializerKey, Arc<dyn Any + Send + Sync>>>,
    built: AtomicUsize,
}

impl MaterializerCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn global() -> Arc<MaterializerCache> {
        GLOBAL.clone()
    }

    /// Cached materializer of `key`, `build` runs only when the key is new.
    pub fn get_or_build<T: 'static>(
        &self,
        key: MaterializerKey,
        build: impl FnOnce() -> Result<Materializer<T>>,
    ) -> Result<Arc<Materializer<T>>> {
        if let Some(entry) = self.entries.read().get(&key) {
            if let Ok(materializer) = entry.clone().downcast::<Materializer<T>>() {
                return Ok(materializer);
            }
        }
        let materializer = Arc::new(build()?);
        let mut entries = self.entries.write();
        let entry = entries.entry(key).or_insert_with_key(|key| {
            self.built.fetch_add(1, Ordering::Relaxed);
            log::trace!("Built the materializer of {:?} for `{}`", key.shape, key.sql);
            materializer.clone()
        });
        Ok(entry
            .clone()
            .downcast::<Materializer<T>>()
            .unwrap_or(materializer))
    }

    /// Number of materializers built so far.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Catalog, CompilationError, testing::Region};
    use time::macros::datetime;

    fn key(sql: &str) -> MaterializerKey {
        MaterializerKey {
            sql: sql.into(),
            connection: "mssql://localhost/test".into(),
            force_utc: true,
            first_column: 0,
            column_count: 3,
            shape: RowShape::Entity(Region::entity_type()),
        }
    }

    fn columns() -> Vec<CursorColumn> {
        vec![
            CursorColumn::new("id", Value::Int64(None)),
            CursorColumn::new("REGIONNAME", Value::Varchar(None)),
            CursorColumn::new("Unmapped", Value::Int32(None)),
        ]
    }

    #[test]
    fn binds_by_name_and_coerces() {
        let table = Catalog::new().describe::<Region>().unwrap();
        let materializer = Materializer::<Region>::entity(&table, &columns(), 0, 3, false);
        let region = materializer
            .materialize(
                [
                    Value::Int64(Some(7)),
                    Value::Varchar(Some("North".into())),
                    Value::Int32(Some(1)),
                ]
                .into(),
            )
            .unwrap();
        assert_eq!(
            region,
            Region {
                id: 7,
                name: "North".into(),
                ..Default::default()
            }
        );
        let region = materializer
            .materialize([Value::Int64(None), Value::Varchar(None), Value::Null].into())
            .unwrap();
        assert_eq!(region, Region::default());
        let error = materializer
            .materialize([Value::Int64(Some(i64::MAX)), Value::Null, Value::Null].into())
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Conversion { column, .. }) if column == "ID"
        ));
    }

    #[test]
    fn utc_forcing() {
        let prototype = Value::TimestampWithTimezone(None);
        let naive = Value::Timestamp(Some(datetime!(2024-03-01 10:00)));
        assert_eq!(
            to_utc(naive.clone(), &prototype).unwrap(),
            Value::TimestampWithTimezone(Some(datetime!(2024-03-01 10:00 UTC)))
        );
        assert!(coerce(naive, &prototype).is_err());
        assert_eq!(
            to_utc(
                Value::TimestampWithTimezone(Some(datetime!(2024-03-01 12:00 +2))),
                &Value::Timestamp(None)
            )
            .unwrap(),
            Value::Timestamp(Some(datetime!(2024-03-01 10:00)))
        );
    }

    #[test]
    fn cached_once() {
        let cache = MaterializerCache::new();
        let table = Catalog::new().describe::<Region>().unwrap();
        let mut inspections = 0;
        for _ in 0..3 {
            cache
                .get_or_build(key("SELECT * FROM [FD_Region]"), || {
                    inspections += 1;
                    Ok(Materializer::<Region>::entity(&table, &columns(), 0, 3, true))
                })
                .unwrap();
        }
        assert_eq!(inspections, 1);
        assert_eq!(cache.built(), 1);
        let dynamic = cache
            .get_or_build(
                MaterializerKey {
                    shape: RowShape::Dynamic,
                    ..key("SELECT * FROM [FD_Region]")
                },
                || Ok(Materializer::dynamic(&columns(), 0, 3)),
            )
            .unwrap();
        assert_eq!(cache.built(), 2);
        let row = dynamic
            .materialize([Value::Int64(Some(1)), Value::Null, Value::Int32(Some(3))].into())
            .unwrap();
        assert_eq!(
            row.keys().map(String::as_str).collect::<Vec<_>>(),
            ["id", "REGIONNAME", "Unmapped"]
        );
        assert!(
            cache
                .get_or_build(key("SELECT 1"), || -> Result<Materializer<Region>> {
                    Err(SluiceError::from(CompilationError::UnparseableSelect("x".into())).into())
                })
                .is_err()
        );
        assert_eq!(cache.len(), 2);
    }
}
