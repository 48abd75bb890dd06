use crate::{
    BinaryOpType, Error, JoinType, Result, SelectParts, TableDescriptor, TableHint, UnaryOpType,
    Value, separated_by, try_separated_by,
    writer::{Context, Fragment},
};
use std::{borrow::Cow, fmt::Write};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, macros::date};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Earliest date a `datetime` column stores, older literals are clamped to it.
pub const MIN_DATETIME: Date = date!(1753 - 01 - 01);

/// Value slot of an insert or update statement.
#[derive(Debug, Clone, Copy)]
pub enum SqlArg<'a> {
    /// Positional placeholder `@n`.
    Parameter(usize),
    /// Value rendered inline as a literal.
    Literal(&'a Value),
    /// Batch variable, `@name`.
    Variable(&'a str),
}

/// Dialect printer turning statement parts into T-SQL text.
///
/// Every method has a default implementation producing SQL Server syntax, implementors
/// override single methods to tweak the output.
pub trait SqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter;

    /// Escape occurrences of `search` char with `replace` while copying into buffer.
    fn write_escaped(
        &self,
        _context: &mut Context,
        out: &mut String,
        value: &str,
        search: char,
        replace: &str,
    ) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    /// Quote identifiers in bracket form, doubling inner closing brackets.
    fn write_identifier_quoted(&self, context: &mut Context, out: &mut String, value: &str) {
        out.push('[');
        self.write_escaped(context, out, value, ']', "]]");
        out.push(']');
    }

    /// Table name followed by the alias, if any.
    fn write_table_ref(&self, context: &mut Context, out: &mut String, table: &str, alias: &str) {
        self.write_identifier_quoted(context, out, table);
        if !alias.is_empty() {
            out.push(' ');
            out.push_str(alias);
        }
    }

    /// Hint of a table read, nothing is written for write targets.
    fn write_table_hint(&self, context: &mut Context, out: &mut String, hint: &TableHint) {
        if !context.reads_table() {
            return;
        }
        match hint {
            TableHint::None => {}
            TableHint::NoLock => out.push_str(" WITH (NOLOCK)"),
            TableHint::Custom(hint) => {
                let _ = write!(out, " WITH ({hint})");
            }
        }
    }

    fn write_column_ref(&self, context: &mut Context, out: &mut String, alias: &str, column: &str) {
        if context.qualifies_columns() && !alias.is_empty() {
            out.push_str(alias);
            out.push('.');
        }
        self.write_identifier_quoted(context, out, column);
    }

    fn write_parameter(&self, _context: &mut Context, out: &mut String, index: usize) {
        out.push('@');
        write_integer!(out, index);
    }

    /// Parenthesized list of `count` placeholders starting at `first`, `( NULL )` when empty.
    fn write_parameter_list(
        &self,
        context: &mut Context,
        out: &mut String,
        first: usize,
        count: usize,
    ) {
        out.push_str("( ");
        if count == 0 {
            out.push_str("NULL");
        }
        separated_by(
            out,
            first..first + count,
            |out, i| self.write_parameter(context, out, i),
            ",",
        );
        out.push_str(" )");
    }

    fn write_variable(&self, context: &mut Context, out: &mut String, name: &str) {
        out.push_str(if context.escapes_parameters() { "@@" } else { "@" });
        out.push_str(name);
    }

    fn write_binary_op(&self, _context: &mut Context, out: &mut String, op: BinaryOpType) {
        out.push_str(match op {
            BinaryOpType::Multiplication => " * ",
            BinaryOpType::Division => " / ",
            BinaryOpType::Remainder => " % ",
            BinaryOpType::Addition => " + ",
            BinaryOpType::Subtraction => " - ",
            BinaryOpType::BitwiseAnd => " & ",
            BinaryOpType::BitwiseOr => " | ",
            BinaryOpType::Equal => " = ",
            BinaryOpType::NotEqual => " <> ",
            BinaryOpType::Less => " < ",
            BinaryOpType::Greater => " > ",
            BinaryOpType::LessEqual => " <= ",
            BinaryOpType::GreaterEqual => " >= ",
            BinaryOpType::And => " AND ",
            BinaryOpType::Or => " OR ",
        });
    }

    fn write_unary_op(&self, _context: &mut Context, out: &mut String, op: UnaryOpType) {
        out.push_str(match op {
            UnaryOpType::Negative => "-",
            UnaryOpType::Not => "NOT ",
        });
    }

    fn write_like(&self, _context: &mut Context, out: &mut String) {
        out.push_str(" LIKE ");
    }

    fn write_in(&self, _context: &mut Context, out: &mut String) {
        out.push_str(" IN ");
    }

    fn write_is_null(&self, _context: &mut Context, out: &mut String, negated: bool) {
        out.push_str(if negated { " IS NOT NULL" } else { " IS NULL" });
    }

    /// Bit column or constant used where a condition is expected.
    fn write_truth_test(&self, _context: &mut Context, out: &mut String, expected: bool) {
        out.push_str(if expected { " = 1" } else { " = 0" });
    }

    /// Render a value as an inline literal.
    fn write_value(&self, context: &mut Context, out: &mut String, value: &Value) -> Result<()> {
        match value {
            v if v.is_null() => self.write_value_none(context, out),
            Value::Boolean(Some(v)) => self.write_value_bool(context, out, *v),
            Value::Int8(Some(v)) => write_integer!(out, *v),
            Value::Int16(Some(v)) => write_integer!(out, *v),
            Value::Int32(Some(v)) => write_integer!(out, *v),
            Value::Int64(Some(v)) => write_integer!(out, *v),
            Value::UInt8(Some(v)) => write_integer!(out, *v),
            Value::UInt16(Some(v)) => write_integer!(out, *v),
            Value::UInt32(Some(v)) => write_integer!(out, *v),
            Value::UInt64(Some(v)) => write_integer!(out, *v),
            Value::Float32(Some(v)) => self.write_value_float(context, out, *v as f64)?,
            Value::Float64(Some(v)) => self.write_value_float(context, out, *v)?,
            Value::Decimal(Some(v)) => {
                let _ = write!(out, "{v}");
            }
            Value::Varchar(Some(v)) => self.write_value_string(context, out, v),
            Value::Blob(Some(v)) => self.write_value_blob(context, out, v),
            Value::Date(Some(v)) => self.write_value_date(context, out, v),
            Value::Time(Some(v)) => self.write_value_time(context, out, v),
            Value::Timestamp(Some(v)) => self.write_value_timestamp(context, out, v),
            Value::TimestampWithTimezone(Some(v)) => self.write_value_timestamptz(context, out, v),
            Value::Uuid(Some(v)) => self.write_value_string(context, out, &v.to_string()),
            _ => {
                return Err(Error::msg(format!(
                    "Cannot render {value:?} as a literal"
                )));
            }
        };
        Ok(())
    }

    fn write_value_none(&self, _context: &mut Context, out: &mut String) {
        out.push_str("NULL");
    }

    fn write_value_bool(&self, _context: &mut Context, out: &mut String, value: bool) {
        out.push(if value { '1' } else { '0' });
    }

    fn write_value_float(
        &self,
        _context: &mut Context,
        out: &mut String,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::msg(format!(
                "Cannot render the non finite float {value} as a literal"
            )));
        }
        let mut buffer = ryu::Buffer::new();
        out.push_str(buffer.format(value));
        Ok(())
    }

    /// National character literal, quotes doubled.
    fn write_value_string(&self, context: &mut Context, out: &mut String, value: &str) {
        out.push_str("N'");
        let mut position = 0;
        for (i, c) in value.char_indices() {
            let replace = match c {
                '\'' => "''",
                '@' if context.escapes_parameters() => "@@",
                _ => continue,
            };
            out.push_str(&value[position..i]);
            out.push_str(replace);
            position = i + 1;
        }
        out.push_str(&value[position..]);
        out.push('\'');
    }

    fn write_value_blob(&self, _context: &mut Context, out: &mut String, value: &[u8]) {
        out.push_str("0x");
        out.push_str(&hex::encode_upper(value));
    }

    fn write_value_date(&self, _context: &mut Context, out: &mut String, value: &Date) {
        let value = if *value < MIN_DATETIME { MIN_DATETIME } else { *value };
        let _ = write!(
            out,
            "'{:04}-{:02}-{:02}'",
            value.year(),
            value.month() as u8,
            value.day()
        );
    }

    fn write_value_time(&self, _context: &mut Context, out: &mut String, value: &Time) {
        let _ = write!(
            out,
            "'{:02}:{:02}:{:02}.{:03}'",
            value.hour(),
            value.minute(),
            value.second(),
            value.millisecond()
        );
    }

    /// Fixed `'yyyy-MM-dd HH:mm:ss.fff'` literal, dates before 1753 are clamped.
    fn write_value_timestamp(
        &self,
        _context: &mut Context,
        out: &mut String,
        value: &PrimitiveDateTime,
    ) {
        let value = if value.date() < MIN_DATETIME {
            MIN_DATETIME.midnight()
        } else {
            *value
        };
        let _ = write!(
            out,
            "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}'",
            value.year(),
            value.month() as u8,
            value.day(),
            value.hour(),
            value.minute(),
            value.second(),
            value.millisecond()
        );
    }

    fn write_value_timestamptz(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &OffsetDateTime,
    ) {
        let local = PrimitiveDateTime::new(value.date(), value.time());
        self.write_value_timestamp(context, out, &local);
        out.pop();
        let offset = value.offset();
        let _ = write!(
            out,
            " {}{:02}:{:02}'",
            if offset.is_negative() { '-' } else { '+' },
            offset.whole_hours().unsigned_abs(),
            offset.minutes_past_hour().unsigned_abs()
        );
    }

    fn write_arg(&self, context: &mut Context, out: &mut String, arg: &SqlArg) -> Result<()> {
        match arg {
            SqlArg::Parameter(index) => self.write_parameter(context, out, *index),
            SqlArg::Literal(value) => self.write_value(context, out, value)?,
            SqlArg::Variable(name) => self.write_variable(context, out, name),
        }
        Ok(())
    }

    /// Comma separated select list, alias-qualified. An empty `fields` lists the default
    /// select columns of the table.
    fn write_select_columns(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &TableDescriptor,
        alias: &str,
        fields: &[Cow<'static, str>],
    ) -> Result<()> {
        if fields.is_empty() {
            separated_by(
                out,
                table.select_columns(),
                |out, column| self.write_column_ref(context, out, alias, &column.name),
                ", ",
            );
            return Ok(());
        }
        try_separated_by(
            out,
            fields,
            |out, field| {
                let column = table.resolve(field)?;
                self.write_column_ref(context, out, alias, &column.name);
                Ok::<_, Error>(())
            },
            ", ",
        )
    }

    fn write_join_type(&self, _context: &mut Context, out: &mut String, join_type: JoinType) {
        out.push_str(match join_type {
            JoinType::Inner => "INNER JOIN ",
            JoinType::Left => "LEFT OUTER JOIN ",
        });
    }

    /// `INSERT INTO [T] ([a], [b]) [OUTPUT INSERTED.[k]] VALUES (..), (..)`
    fn write_insert(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &str,
        columns: &[&str],
        output: Option<&str>,
        rows: &[Vec<SqlArg>],
    ) -> Result<()> {
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(context, out, table);
        out.push_str(" (");
        separated_by(
            out,
            columns,
            |out, column| self.write_identifier_quoted(context, out, column),
            ", ",
        );
        out.push(')');
        if let Some(output) = output {
            out.push_str(" OUTPUT INSERTED.");
            self.write_identifier_quoted(context, out, output);
        }
        out.push_str(" VALUES ");
        try_separated_by(
            out,
            rows,
            |out, row| {
                out.push('(');
                try_separated_by(out, row, |out, arg| self.write_arg(context, out, arg), ", ")?;
                out.push(')');
                Ok::<_, Error>(())
            },
            ", ",
        )
    }

    /// `UPDATE [T] SET [a] = .. WHERE [k] = ..`, NULL literal keys compare with `IS NULL`.
    fn write_update(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &str,
        set: &[(&str, SqlArg)],
        keys: &[(&str, SqlArg)],
    ) -> Result<()> {
        out.push_str("UPDATE ");
        self.write_identifier_quoted(context, out, table);
        out.push_str(" SET ");
        try_separated_by(
            out,
            set,
            |out, (column, arg)| {
                self.write_identifier_quoted(context, out, column);
                out.push_str(" = ");
                self.write_arg(context, out, arg)
            },
            ", ",
        )?;
        out.push_str(" WHERE ");
        try_separated_by(
            out,
            keys,
            |out, (column, arg)| {
                self.write_identifier_quoted(context, out, column);
                match arg {
                    SqlArg::Literal(value) if value.is_null() => {
                        self.write_is_null(context, out, false);
                        Ok(())
                    }
                    _ => {
                        out.push_str(" = ");
                        self.write_arg(context, out, arg)
                    }
                }
            },
            " AND ",
        )
    }

    /// Opening of an all-or-nothing batch.
    fn write_batch_begin(&self, context: &mut Context, out: &mut String, identity: Option<&str>) {
        if let Some(identity) = identity {
            out.push_str("DECLARE ");
            self.write_variable(context, out, identity);
            out.push_str(" BIGINT;\n");
        }
        out.push_str("BEGIN TRY\n");
    }

    fn write_capture_identity(&self, context: &mut Context, out: &mut String, identity: &str) {
        out.push_str("SET ");
        self.write_variable(context, out, identity);
        out.push_str(" = SCOPE_IDENTITY();\n");
    }

    /// Closing of the batch, re-raises the original error message, severity and state.
    fn write_batch_end(&self, context: &mut Context, out: &mut String) {
        out.push_str("END TRY\nBEGIN CATCH\nDECLARE ");
        self.write_variable(context, out, "ErrorMessage");
        out.push_str(" NVARCHAR(4000) = ERROR_MESSAGE(), ");
        self.write_variable(context, out, "ErrorSeverity");
        out.push_str(" INT = ERROR_SEVERITY(), ");
        self.write_variable(context, out, "ErrorState");
        out.push_str(" INT = ERROR_STATE();\nRAISERROR(");
        self.write_variable(context, out, "ErrorMessage");
        out.push_str(", ");
        self.write_variable(context, out, "ErrorSeverity");
        out.push_str(", ");
        self.write_variable(context, out, "ErrorState");
        out.push_str(");\nEND CATCH");
    }

    /// Count statement of a paged query. A distinct select counts its single column with
    /// `COUNT(DISTINCT ..)`, wider distinct selects are counted as a derived table.
    fn write_count(&self, _context: &mut Context, out: &mut String, parts: &SelectParts) {
        if !parts.distinct {
            let _ = write!(out, "SELECT COUNT(*) {}", parts.from);
        } else if parts.single_column() {
            let _ = write!(out, "SELECT COUNT(DISTINCT {}) {}", parts.columns, parts.from);
        } else {
            let _ = write!(
                out,
                "SELECT COUNT(*) FROM (SELECT {}) distinct_rows",
                parts.select_removed()
            );
        }
    }

    /// Windowed page statement numbering rows with `ROW_NUMBER()`, bounds are the
    /// parameters `first_parameter` (rows to skip) and `first_parameter + 1` (last row).
    fn write_page(
        &self,
        context: &mut Context,
        out: &mut String,
        order_by: &str,
        parts: &SelectParts,
        first_parameter: usize,
    ) {
        out.push_str("SELECT * FROM (SELECT ROW_NUMBER() OVER (");
        out.push_str(order_by);
        out.push_str(") AS rn, ");
        if parts.distinct {
            let _ = write!(
                out,
                "inner_page.* FROM (SELECT {}) inner_page",
                parts.select_removed()
            );
        } else {
            out.push_str(&parts.select_removed());
        }
        out.push_str(") page WHERE rn > ");
        self.write_parameter(context, out, first_parameter);
        out.push_str(" AND rn <= ");
        self.write_parameter(context, out, first_parameter + 1);
    }

    /// Empty copy of the table columns, used to stage rows.
    fn write_create_staging(
        &self,
        context: &mut Context,
        out: &mut String,
        staging: &str,
        table: &str,
        columns: &[&str],
    ) {
        out.push_str("SELECT TOP 0 ");
        separated_by(
            out,
            columns,
            |out, column| self.write_identifier_quoted(context, out, column),
            ", ",
        );
        out.push_str(" INTO ");
        self.write_identifier_quoted(context, out, staging);
        out.push_str(" FROM ");
        self.write_identifier_quoted(context, out, table);
        out.push(';');
    }

    /// `INSERT INTO [T] (..) SELECT s.[..] FROM [staging] s [WHERE filter]`
    fn write_insert_select(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &str,
        columns: &[&str],
        staging: &str,
        filter: &str,
    ) {
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(context, out, table);
        out.push_str(" (");
        separated_by(
            out,
            columns,
            |out, column| self.write_identifier_quoted(context, out, column),
            ", ",
        );
        out.push_str(") SELECT ");
        let mut select = context.switch_fragment(Fragment::None);
        separated_by(
            out,
            columns,
            |out, column| self.write_column_ref(&mut select, out, "s", column),
            ", ",
        );
        out.push_str(" FROM ");
        self.write_table_ref(context, out, staging, "s");
        if !filter.trim().is_empty() {
            out.push_str(" WHERE ");
            out.push_str(filter.trim());
        }
        out.push(';');
    }

    fn write_drop_table(&self, context: &mut Context, out: &mut String, table: &str) {
        out.push_str("DROP TABLE ");
        self.write_identifier_quoted(context, out, table);
        out.push(';');
    }
}

/// SQL Server writer.
#[derive(Default, Debug, Clone, Copy)]
pub struct TSqlWriter {}

impl TSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for TSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
