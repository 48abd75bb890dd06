use crate::{Result, Row, Value};
use std::{
    any::TypeId,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
};

/// Custom per-column conversion applied while materializing, it receives the raw cursor
/// value (possibly NULL) and returns the value handed to the field.
pub type Converter = fn(Value) -> Result<Value>;

/// A record type mapped to a table.
///
/// Normally implemented with `#[derive(Entity)]`. Fields are addressed by their
/// declaration index, which is also the index of the matching [`FieldMapping`].
pub trait Entity: Default + Send + Sync + 'static {
    /// Mapping information as declared on the type, resolved into a
    /// [`crate::TableDescriptor`] by the [`crate::Catalog`].
    fn mapping() -> TableMapping;
    /// Current value of the field at `field`, child collections return `Value::Null`.
    fn value(&self, field: usize) -> Value;
    /// Assign the field at `field`, converting the value into the field's type.
    fn set_value(&mut self, field: usize, value: Value) -> Result<()>;
    /// Rows of the child collection stored at `field`, if it is one.
    fn children(&self, _field: usize) -> Option<ChildRows> {
        None
    }
    /// All field values in declaration order.
    fn row(&self) -> Row;
    fn entity_type() -> EntityType
    where
        Self: Sized,
    {
        EntityType::of::<Self>()
    }
}

/// Type-level mapping declared on a record type.
#[derive(Debug, Clone, Default)]
pub struct TableMapping {
    /// The type name, used as table name when `table` is not set.
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub primary_key: Option<&'static str>,
    pub auto_increment: Option<bool>,
    /// Column of this table that references a parent, used when this type is a child.
    pub foreign_key: Option<&'static str>,
    pub fields: Vec<FieldMapping>,
}

/// Field-level mapping declared on a record type.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    pub field: &'static str,
    pub column: Option<&'static str>,
    /// Typed NULL describing the field type.
    pub prototype: Value,
    /// Read back from queries but never written.
    pub result_only: bool,
    pub auto_increment: bool,
    /// The field holds a collection of child records.
    pub child: Option<EntityType>,
    /// Overrides the child table's foreign key column.
    pub foreign_key: Option<&'static str>,
    pub converter: Option<Converter>,
}

/// Runtime handle to a record type.
#[derive(Clone, Copy)]
pub struct EntityType {
    pub id: TypeId,
    pub name: &'static str,
    pub mapping: fn() -> TableMapping,
}

impl EntityType {
    pub fn of<E: Entity>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
            mapping: E::mapping,
        }
    }
}

impl Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityType").field(&self.name).finish()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Field values of the items of a child collection.
#[derive(Debug, Clone)]
pub struct ChildRows {
    pub entity: EntityType,
    pub rows: Vec<Row>,
}

impl ChildRows {
    pub fn of<C: Entity>(items: &[C]) -> Self {
        Self {
            entity: C::entity_type(),
            rows: items.iter().map(Entity::row).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
