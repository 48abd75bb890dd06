use crate::{
    CompilationError, Converter, Entity, EntityType, Result, SluiceError, TableMapping, Value,
};
use parking_lot::RwLock;
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Resolved table metadata for a record type.
#[derive(Debug)]
pub struct TableDescriptor {
    pub entity: EntityType,
    pub name: String,
    pub primary_key: String,
    /// The primary key value is generated by the server.
    pub auto_increment: bool,
    pub foreign_key: Option<String>,
    pub columns: Box<[ColumnDescriptor]>,
}

#[derive(Debug)]
pub struct ColumnDescriptor {
    pub name: String,
    pub field: &'static str,
    /// Field index inside the record, same as the position in `columns`.
    pub index: usize,
    pub prototype: Value,
    pub result_only: bool,
    pub auto_increment: bool,
    pub child: Option<EntityType>,
    /// For child collections: the child table column referencing this record.
    pub foreign_key: Option<String>,
    pub converter: Option<Converter>,
}

impl ColumnDescriptor {
    pub fn is_child(&self) -> bool {
        self.child.is_some()
    }
    /// Plain column that inserts and updates write.
    pub fn is_writable(&self) -> bool {
        self.child.is_none() && !self.result_only
    }
}

impl TableDescriptor {
    fn from_mapping(entity: EntityType, mapping: TableMapping) -> Result<Self> {
        let name = mapping.table.unwrap_or(mapping.type_name).to_string();
        let primary_key = mapping.primary_key.unwrap_or("ID").to_string();
        let auto_increment = mapping.auto_increment.unwrap_or(true);
        let invalid = |message: String| {
            SluiceError::from(CompilationError::InvalidMapping {
                entity: name.clone(),
                message,
            })
        };
        let mut columns = Vec::<ColumnDescriptor>::with_capacity(mapping.fields.len());
        for (index, field) in mapping.fields.into_iter().enumerate() {
            let column = field
                .column
                .unwrap_or_else(|| field.field.trim_start_matches('_'))
                .to_string();
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column)) {
                return Err(invalid(format!("column `{column}` is mapped twice")).into());
            }
            let foreign_key = match field.child {
                Some(child) => {
                    if field.converter.is_some() {
                        return Err(invalid(format!(
                            "child collection `{}` cannot have a converter",
                            field.field
                        ))
                        .into());
                    }
                    Some(
                        field
                            .foreign_key
                            .or_else(|| (child.mapping)().foreign_key)
                            .map(str::to_string)
                            .unwrap_or_else(|| primary_key.clone()),
                    )
                }
                None => None,
            };
            columns.push(ColumnDescriptor {
                auto_increment: field.auto_increment
                    || (auto_increment && column.eq_ignore_ascii_case(&primary_key)),
                name: column,
                field: field.field,
                index,
                prototype: field.prototype,
                result_only: field.result_only,
                child: field.child,
                foreign_key,
                converter: field.converter,
            });
        }
        Ok(Self {
            entity,
            name,
            primary_key,
            auto_increment,
            foreign_key: mapping.foreign_key.map(Into::into),
            columns: columns.into(),
        })
    }

    /// Finds the column of a record member, by field name first and then by column name.
    pub fn column(&self, member: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.field == member)
            .or_else(|| self.column_by_name(member))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Like [`TableDescriptor::column`] but fails with `UnknownMember`.
    pub fn resolve(&self, member: &str) -> Result<&ColumnDescriptor> {
        self.column(member).ok_or_else(|| {
            SluiceError::from(CompilationError::UnknownMember {
                member: member.to_string(),
                entity: self.name.clone(),
            })
            .into()
        })
    }

    pub fn primary_key_column(&self) -> Option<&ColumnDescriptor> {
        self.column_by_name(&self.primary_key)
    }

    /// Columns listed by default selects: everything but children and result-only columns.
    pub fn select_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_writable())
    }

    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.is_writable() && !c.auto_increment)
    }

    pub fn child_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_child())
    }
}

static GLOBAL: LazyLock<Arc<Catalog>> = LazyLock::new(Default::default);

/// Per-type metadata registry.
///
/// Descriptors are computed once per record type and shared. The process-wide instance
/// is [`Catalog::global`], tests create isolated ones with [`Catalog::new`].
#[derive(Default, Debug)]
pub struct Catalog {
    tables: RwLock<HashMap<TypeId, Arc<TableDescriptor>>>,
    built: AtomicUsize,
}

impl Catalog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn global() -> Arc<Catalog> {
        GLOBAL.clone()
    }

    pub fn describe<E: Entity>(&self) -> Result<Arc<TableDescriptor>> {
        self.describe_type(E::entity_type())
    }

    pub fn describe_type(&self, entity: EntityType) -> Result<Arc<TableDescriptor>> {
        if let Some(descriptor) = self.tables.read().get(&entity.id) {
            return Ok(descriptor.clone());
        }
        let descriptor = Arc::new(TableDescriptor::from_mapping(entity, (entity.mapping)())?);
        let mut tables = self.tables.write();
        Ok(tables
            .entry(entity.id)
            .or_insert_with(|| {
                self.built.fetch_add(1, Ordering::Relaxed);
                log::trace!("Described `{}` as table `{}`", entity.name, descriptor.name);
                descriptor
            })
            .clone())
    }

    /// Number of descriptors computed so far.
    pub fn descriptors_built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}
