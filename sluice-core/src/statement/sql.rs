use crate::{
    Catalog, Entity, EntityType, Error, Expr, JoinType, PredicateCompiler, PredicateScope, Result,
    SqlWriter, TSqlWriter, TableDescriptor, TableHint, Value, process_params, starts_with_keyword,
    writer::{Context, Fragment},
};
use std::{borrow::Cow, fmt, sync::Arc, sync::OnceLock};

#[derive(Debug, Clone)]
enum Part {
    Raw {
        sql: String,
        args: Vec<Value>,
    },
    Nested(Box<Sql>),
    Invalid(String),
    Select {
        entity: EntityType,
        fields: Vec<Cow<'static, str>>,
    },
    From {
        entity: EntityType,
    },
    Where {
        entity: EntityType,
        expr: Expr,
    },
    OrderBy {
        entity: EntityType,
        fields: Vec<Cow<'static, str>>,
        descending: bool,
    },
    GroupBy {
        entity: EntityType,
        fields: Vec<Cow<'static, str>>,
    },
    Join {
        join_type: JoinType,
        left: EntityType,
        right: EntityType,
        on: Expr,
    },
}

#[derive(Debug, Clone)]
struct Built {
    sql: String,
    args: Vec<Value>,
}

/// Fluent statement builder.
///
/// A statement is an ordered chain of parts, typed ones (resolved through the
/// [`Catalog`] and the predicate compiler) and raw SQL text carrying its own `@n`
/// arguments. Parts are rendered and merged on first access of [`Sql::sql`] or
/// [`Sql::arguments`] and the result is memoized: the same statement always renders the
/// same text. Consecutive `WHERE` parts are merged with `AND`, consecutive `ORDER BY`
/// parts with a comma.
///
/// ```rust
/// # use sluice_core::*;
/// # #[derive(Default)] struct Region { id: i32 }
/// # impl Entity for Region {
/// #     fn mapping() -> TableMapping { TableMapping { type_name: "Region", fields: vec![FieldMapping { field: "id", prototype: Value::Int32(None), ..Default::default() }], ..Default::default() } }
/// #     fn value(&self, _: usize) -> Value { self.id.as_value() }
/// #     fn set_value(&mut self, _: usize, v: Value) -> Result<()> { self.id = AsValue::try_from_value(v)?; Ok(()) }
/// #     fn row(&self) -> Row { [self.value(0)].into() }
/// # }
/// let sql = Sql::new()
///     .select::<Region>(&[])
///     .from::<Region>()
///     .where_expr::<Region>(Expr::column("id").greater(Expr::value(5)))
///     .where_raw("t.[id] < @0", vec![10.into()]);
/// assert_eq!(
///     sql.sql().unwrap(),
///     "SELECT t.[id]\nFROM [Region] t WITH (NOLOCK)\nWHERE t.[id] > @0\nAND t.[id] < @1"
/// );
/// ```
#[derive(Clone)]
pub struct Sql {
    parts: Vec<Part>,
    aliases: Vec<(EntityType, String)>,
    primary: Option<EntityType>,
    catalog: Arc<Catalog>,
    hint: TableHint,
    built: OnceLock<Built>,
}

impl Default for Sql {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            aliases: Vec::new(),
            primary: None,
            catalog: Catalog::global(),
            hint: TableHint::default(),
            built: OnceLock::new(),
        }
    }
}

impl fmt::Debug for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sql")
            .field("parts", &self.parts)
            .field("aliases", &self.aliases)
            .field("hint", &self.hint)
            .finish()
    }
}

impl Sql {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolve typed parts through `catalog` instead of the global one.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self.built = OnceLock::new();
        self
    }

    /// Table hint of the `FROM` and `JOIN` parts, `WITH (NOLOCK)` by default.
    pub fn with_hint(mut self, hint: TableHint) -> Self {
        self.hint = hint;
        self.built = OnceLock::new();
        self
    }

    fn push(mut self, part: Part) -> Self {
        self.parts.push(part);
        self.built = OnceLock::new();
        self
    }

    fn register(&mut self, entity: EntityType, alias: Option<&str>) {
        if self.primary.is_none() {
            self.primary = Some(entity);
        }
        if let Some((_, current)) = self.aliases.iter_mut().find(|(e, _)| *e == entity) {
            if let Some(alias) = alias {
                *current = alias.to_string();
            }
            return;
        }
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None if self.aliases.is_empty() => "t".to_string(),
            None => format!("t{}", self.aliases.len()),
        };
        self.aliases.push((entity, alias));
    }

    fn alias_of(&self, entity: EntityType) -> &str {
        self.aliases
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, alias)| alias.as_str())
            .unwrap_or("t")
    }

    /// Alias assigned to `E` in this statement.
    pub fn alias<E: Entity>(&self) -> &str {
        self.alias_of(E::entity_type())
    }

    /// Record type of the first typed part.
    pub fn primary_entity(&self) -> Option<EntityType> {
        self.primary
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Raw SQL with its own `@n` arguments.
    pub fn raw(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.push(Part::Raw {
            sql: sql.into(),
            args,
        })
    }

    /// Append another statement, rendered with its own catalog and aliases.
    pub fn append(self, other: impl Into<Sql>) -> Self {
        let other = other.into();
        if other.is_empty() {
            return self;
        }
        self.push(Part::Nested(Box::new(other)))
    }

    /// `SELECT` of the given fields of `E`, every selectable column when `fields` is empty.
    pub fn select<E: Entity>(self, fields: &[&'static str]) -> Self {
        self.select_with_alias::<E>(None, fields)
    }

    pub fn select_as<E: Entity>(self, alias: &str, fields: &[&'static str]) -> Self {
        self.select_with_alias::<E>(Some(alias), fields)
    }

    fn select_with_alias<E: Entity>(
        mut self,
        alias: Option<&str>,
        fields: &[&'static str],
    ) -> Self {
        let entity = E::entity_type();
        self.register(entity, alias);
        self.push(Part::Select {
            entity,
            fields: fields.iter().map(|f| Cow::Borrowed(*f)).collect(),
        })
    }

    pub fn select_raw(self, columns: impl AsRef<str>) -> Self {
        self.raw(format!("SELECT {}", columns.as_ref()), Vec::new())
    }

    /// `FROM [table] alias` followed by the table hint.
    pub fn from<E: Entity>(self) -> Self {
        self.from_with_alias::<E>(None)
    }

    pub fn from_as<E: Entity>(self, alias: &str) -> Self {
        self.from_with_alias::<E>(Some(alias))
    }

    fn from_with_alias<E: Entity>(mut self, alias: Option<&str>) -> Self {
        let entity = E::entity_type();
        self.register(entity, alias);
        self.push(Part::From { entity })
    }

    pub fn from_raw(self, source: impl AsRef<str>) -> Self {
        self.raw(format!("FROM {}", source.as_ref()), Vec::new())
    }

    /// `WHERE` condition compiled from a predicate over `E`.
    pub fn where_expr<E: Entity>(mut self, expr: impl Into<Expr>) -> Self {
        let entity = E::entity_type();
        self.register(entity, None);
        self.push(Part::Where {
            entity,
            expr: expr.into(),
        })
    }

    pub fn where_raw(self, condition: impl AsRef<str>, args: Vec<Value>) -> Self {
        self.raw(format!("WHERE {}", condition.as_ref()), args)
    }

    pub fn order_by<E: Entity>(self, fields: &[&'static str]) -> Self {
        self.order_by_direction::<E>(fields, false)
    }

    pub fn order_by_descending<E: Entity>(self, fields: &[&'static str]) -> Self {
        self.order_by_direction::<E>(fields, true)
    }

    fn order_by_direction<E: Entity>(mut self, fields: &[&'static str], descending: bool) -> Self {
        let entity = E::entity_type();
        self.register(entity, None);
        self.push(Part::OrderBy {
            entity,
            fields: fields.iter().map(|f| Cow::Borrowed(*f)).collect(),
            descending,
        })
    }

    pub fn order_by_raw(self, keys: impl AsRef<str>) -> Self {
        self.raw(format!("ORDER BY {}", keys.as_ref()), Vec::new())
    }

    pub fn group_by<E: Entity>(mut self, fields: &[&'static str]) -> Self {
        let entity = E::entity_type();
        self.register(entity, None);
        self.push(Part::GroupBy {
            entity,
            fields: fields.iter().map(|f| Cow::Borrowed(*f)).collect(),
        })
    }

    pub fn group_by_raw(self, keys: impl AsRef<str>) -> Self {
        self.raw(format!("GROUP BY {}", keys.as_ref()), Vec::new())
    }

    pub(crate) fn join_entity<R: Entity>(
        mut self,
        join_type: JoinType,
        left: EntityType,
        alias: Option<&str>,
        on: Expr,
    ) -> Self {
        let right = R::entity_type();
        self.register(left, None);
        self.register(right, alias);
        self.push(Part::Join {
            join_type,
            left,
            right,
            on,
        })
    }

    /// Part that fails the build with `message`.
    pub(crate) fn raw_error(self, message: &str) -> Self {
        self.push(Part::Invalid(message.to_string()))
    }

    pub fn join_raw(self, join: impl Into<String>, args: Vec<Value>) -> Self {
        self.raw(join, args)
    }

    fn describe(&self, entity: EntityType) -> Result<Arc<TableDescriptor>> {
        self.catalog.describe_type(entity)
    }

    fn render_part(
        &self,
        writer: &dyn SqlWriter,
        part: &Part,
        out: &mut String,
    ) -> Result<Vec<Value>> {
        let mut context = Context::new(Fragment::None);
        let mut args = Vec::new();
        match part {
            Part::Raw { sql, args: raw } => {
                out.push_str(sql);
                args.extend(raw.iter().cloned());
            }
            Part::Nested(sql) => {
                out.push_str(sql.sql()?);
                args.extend(sql.arguments()?.iter().cloned());
            }
            Part::Invalid(message) => return Err(Error::msg(message.clone())),
            Part::Select { entity, fields } => {
                let table = self.describe(*entity)?;
                out.push_str("SELECT ");
                writer.write_select_columns(
                    &mut context,
                    out,
                    &table,
                    self.alias_of(*entity),
                    fields,
                )?;
            }
            Part::From { entity } => {
                let table = self.describe(*entity)?;
                let mut context = context.switch_fragment(Fragment::SqlSelectFrom);
                out.push_str("FROM ");
                writer.write_table_ref(&mut context, out, &table.name, self.alias_of(*entity));
                writer.write_table_hint(&mut context, out, &self.hint);
            }
            Part::Where { entity, expr } => {
                let table = self.describe(*entity)?;
                let compiled = PredicateCompiler::new(
                    writer,
                    PredicateScope::new(&table, self.alias_of(*entity)),
                )
                .compile(expr)?;
                out.push_str("WHERE ");
                out.push_str(&compiled.sql);
                args = compiled.args;
            }
            Part::OrderBy {
                entity,
                fields,
                descending,
            } => {
                let table = self.describe(*entity)?;
                let alias = self.alias_of(*entity);
                out.push_str("ORDER BY ");
                let fields = if fields.is_empty() {
                    vec![Cow::Owned(table.primary_key.clone())]
                } else {
                    fields.clone()
                };
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let column = table.resolve(field)?;
                    writer.write_column_ref(&mut context, out, alias, &column.name);
                    if *descending {
                        out.push_str(" DESC");
                    }
                }
            }
            Part::GroupBy { entity, fields } => {
                let table = self.describe(*entity)?;
                out.push_str("GROUP BY ");
                writer.write_select_columns(
                    &mut context,
                    out,
                    &table,
                    self.alias_of(*entity),
                    fields,
                )?;
            }
            Part::Join {
                join_type,
                left,
                right,
                on,
            } => {
                let left_table = self.describe(*left)?;
                let right_table = self.describe(*right)?;
                let right_alias = self.alias_of(*right);
                let mut context = context.switch_fragment(Fragment::SqlSelectFrom);
                writer.write_join_type(&mut context, out, *join_type);
                writer.write_table_ref(&mut context, out, &right_table.name, right_alias);
                writer.write_table_hint(&mut context, out, &self.hint);
                let compiled = PredicateCompiler::join(
                    writer,
                    PredicateScope::new(&left_table, self.alias_of(*left)),
                    PredicateScope::new(&right_table, right_alias),
                )
                .compile(on)?;
                out.push_str(" ON ");
                out.push_str(&compiled.sql);
                args = compiled.args;
            }
        }
        Ok(args)
    }

    fn build(&self) -> Result<&Built> {
        if let Some(built) = self.built.get() {
            return Ok(built);
        }
        let writer = TSqlWriter::new();
        let mut sql = String::new();
        let mut args = Vec::new();
        let mut previous = "";
        let mut rendered = String::new();
        for part in &self.parts {
            rendered.clear();
            let part_args = self.render_part(writer.as_dyn(), part, &mut rendered)?;
            let text = process_params(&rendered, &part_args, &mut args)?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if !sql.is_empty() {
                sql.push('\n');
            }
            let kind = ["WHERE", "ORDER BY"]
                .into_iter()
                .find(|k| starts_with_keyword(text, k));
            match kind {
                Some("WHERE") if previous == "WHERE" => {
                    sql.push_str("AND ");
                    sql.push_str(text["WHERE".len()..].trim_start());
                }
                Some("ORDER BY") if previous == "ORDER BY" => {
                    sql.push_str(", ");
                    sql.push_str(text["ORDER BY".len()..].trim_start());
                }
                _ => sql.push_str(text),
            }
            previous = kind.unwrap_or("");
        }
        Ok(self.built.get_or_init(|| Built { sql, args }))
    }

    /// Rendered SQL text.
    pub fn sql(&self) -> Result<&str> {
        Ok(&self.build()?.sql)
    }

    /// Arguments of the rendered SQL, in placeholder order.
    pub fn arguments(&self) -> Result<&[Value]> {
        Ok(&self.build()?.args)
    }

    /// Rendered text and arguments, consuming the statement.
    pub fn into_parts(self) -> Result<(String, Vec<Value>)> {
        self.build()?;
        let built = self.built.into_inner().unwrap_or_else(|| Built {
            sql: String::new(),
            args: Vec::new(),
        });
        Ok((built.sql, built.args))
    }
}

impl From<&str> for Sql {
    fn from(value: &str) -> Self {
        Sql::new().raw(value, Vec::new())
    }
}

impl From<String> for Sql {
    fn from(value: String) -> Self {
        Sql::new().raw(value, Vec::new())
    }
}

impl From<&Sql> for Sql {
    fn from(value: &Sql) -> Self {
        value.clone()
    }
}
