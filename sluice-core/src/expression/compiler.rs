use crate::{
    BinaryOpType, CompilationError, Expr, Result, Side, SluiceError, SqlWriter, TableDescriptor,
    UnaryOpType, Value,
    writer::Context,
};

/// Table a member access resolves against.
#[derive(Debug, Clone, Copy)]
pub struct PredicateScope<'a> {
    pub table: &'a TableDescriptor,
    /// Qualifier of the column references, empty for none.
    pub alias: &'a str,
}

impl<'a> PredicateScope<'a> {
    pub fn new(table: &'a TableDescriptor, alias: &'a str) -> Self {
        Self { table, alias }
    }
}

/// Boolean SQL fragment with its own placeholders, numbered from `@0`.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Walks a predicate tree and emits the equivalent condition.
///
/// Member accesses become alias qualified columns, captured values become positional
/// parameters and collections expand into parameter lists. Any node the dialect cannot
/// express fails the compilation.
pub struct PredicateCompiler<'a> {
    writer: &'a dyn SqlWriter,
    left: PredicateScope<'a>,
    right: PredicateScope<'a>,
    context: Context,
    out: String,
    args: Vec<Value>,
}

enum Pattern {
    Prefix,
    Suffix,
    Infix,
}

fn unsupported(kind: impl Into<String>) -> crate::Error {
    SluiceError::from(CompilationError::UnsupportedExpressionKind(kind.into())).into()
}

fn normalize(method: &str) -> String {
    method
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Escapes the `LIKE` wildcards of a literal by bracketing them.
fn escape_like(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '%' | '_' | '[' => {
                result.push('[');
                result.push(c);
                result.push(']');
            }
            _ => result.push(c),
        }
    }
    result
}

impl<'a> PredicateCompiler<'a> {
    /// Compiler for the `WHERE` condition of a single table.
    pub fn new(writer: &'a dyn SqlWriter, scope: PredicateScope<'a>) -> Self {
        Self::with_scopes(writer, scope, scope)
    }

    /// Compiler for the `ON` condition of a join, left and right members resolve against
    /// different tables.
    pub fn join(
        writer: &'a dyn SqlWriter,
        left: PredicateScope<'a>,
        right: PredicateScope<'a>,
    ) -> Self {
        Self::with_scopes(writer, left, right)
    }

    fn with_scopes(
        writer: &'a dyn SqlWriter,
        left: PredicateScope<'a>,
        right: PredicateScope<'a>,
    ) -> Self {
        Self {
            writer,
            left,
            right,
            context: Context::default(),
            out: String::with_capacity(64),
            args: Vec::new(),
        }
    }

    pub fn compile(mut self, expr: &Expr) -> Result<CompiledPredicate> {
        self.visit_predicate(expr)?;
        Ok(CompiledPredicate {
            sql: self.out,
            args: self.args,
        })
    }

    fn visit_predicate(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Binary { op, lhs, rhs } if op.is_connective() => {
                self.out.push('(');
                self.visit_predicate(lhs)?;
                self.writer.write_binary_op(&mut self.context, &mut self.out, *op);
                self.visit_predicate(rhs)?;
                self.out.push(')');
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.visit_comparison(*op, lhs, rhs)
            }
            Expr::Binary { op, .. } => Err(unsupported(op.to_string())),
            Expr::Unary {
                op: UnaryOpType::Not,
                arg,
            } => match arg.as_ref() {
                Expr::Column { .. } => self.visit_truth_test(arg, false),
                Expr::Value(Value::Boolean(Some(v))) => self.visit_constant(!v),
                _ => {
                    self.writer
                        .write_unary_op(&mut self.context, &mut self.out, UnaryOpType::Not);
                    self.visit_predicate(arg)
                }
            },
            Expr::Column { .. } => self.visit_truth_test(expr, true),
            Expr::Value(Value::Boolean(Some(v))) => self.visit_constant(*v),
            Expr::Call {
                method,
                target,
                args,
            } => self.visit_call(method, target, args),
            _ => Err(unsupported(expr.kind())),
        }
    }

    fn visit_comparison(&mut self, op: BinaryOpType, lhs: &Expr, rhs: &Expr) -> Result<()> {
        if matches!(op, BinaryOpType::Equal | BinaryOpType::NotEqual) {
            let negated = op == BinaryOpType::NotEqual;
            if rhs.is_null_value() {
                self.visit_operand(lhs, Side::Left)?;
                self.writer
                    .write_is_null(&mut self.context, &mut self.out, negated);
                return Ok(());
            }
            if lhs.is_null_value() {
                self.visit_operand(rhs, Side::Right)?;
                self.writer
                    .write_is_null(&mut self.context, &mut self.out, negated);
                return Ok(());
            }
        }
        self.visit_operand(lhs, Side::Left)?;
        self.writer.write_binary_op(&mut self.context, &mut self.out, op);
        self.visit_operand(rhs, Side::Right)
    }

    /// Boolean column standing alone as a condition.
    fn visit_truth_test(&mut self, column: &Expr, expected: bool) -> Result<()> {
        let Expr::Column { member, side } = column else {
            return Err(unsupported(column.kind()));
        };
        let scope = self.scope(side.unwrap_or(Side::Left));
        let descriptor = scope.table.resolve(member)?;
        if !matches!(descriptor.prototype, Value::Boolean(..)) {
            return Err(unsupported(format!(
                "Column `{member}` used as a condition"
            )));
        }
        self.visit_operand(column, Side::Left)?;
        self.writer
            .write_truth_test(&mut self.context, &mut self.out, expected);
        Ok(())
    }

    fn visit_constant(&mut self, value: bool) -> Result<()> {
        self.out.push('1');
        self.writer
            .write_truth_test(&mut self.context, &mut self.out, value);
        Ok(())
    }

    fn scope(&self, side: Side) -> PredicateScope<'a> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn visit_operand(&mut self, expr: &Expr, role: Side) -> Result<()> {
        match expr {
            Expr::Column { member, side } => {
                let scope = self.scope(side.unwrap_or(role));
                let column = scope.table.resolve(member)?;
                if column.is_child() {
                    return Err(unsupported(format!("Child collection `{member}`")));
                }
                self.writer
                    .write_column_ref(&mut self.context, &mut self.out, scope.alias, &column.name);
                Ok(())
            }
            Expr::Value(value) => {
                self.push_value(value.clone());
                Ok(())
            }
            _ => Err(unsupported(expr.kind())),
        }
    }

    /// Binds a value, collections become a parenthesized placeholder list.
    fn push_value(&mut self, value: Value) {
        match value {
            Value::List(items, ..) => {
                let items = items.unwrap_or_default();
                let first = self.args.len();
                self.writer.write_parameter_list(
                    &mut self.context,
                    &mut self.out,
                    first,
                    items.len(),
                );
                self.args.extend(items);
            }
            value => {
                self.writer
                    .write_parameter(&mut self.context, &mut self.out, self.args.len());
                self.args.push(value);
            }
        }
    }

    fn visit_call(&mut self, method: &str, target: &Expr, args: &[Expr]) -> Result<()> {
        let normalized = normalize(method);
        let argument = match args {
            [argument] => argument,
            _ => {
                return Err(unsupported(format!(
                    "Call({method}) with {} arguments",
                    args.len()
                )));
            }
        };
        match normalized.as_str() {
            "contains" if matches!(target, Expr::Value(v) if v.is_collection()) => {
                self.visit_membership(argument, target)
            }
            "startswith" => self.visit_like(target, argument, Pattern::Prefix),
            "endswith" => self.visit_like(target, argument, Pattern::Suffix),
            "contains" => self.visit_like(target, argument, Pattern::Infix),
            "equals" => self.visit_comparison(BinaryOpType::Equal, target, argument),
            "isin" | "in" => self.visit_membership(target, argument),
            _ => Err(unsupported(format!("Call({method})"))),
        }
    }

    fn visit_like(&mut self, target: &Expr, pattern: &Expr, kind: Pattern) -> Result<()> {
        let Expr::Value(value) = pattern else {
            return Err(unsupported(format!(
                "{} pattern in a LIKE comparison",
                pattern.kind()
            )));
        };
        let pattern = match value {
            Value::Varchar(Some(text)) => {
                let text = escape_like(text);
                Value::Varchar(Some(match kind {
                    Pattern::Prefix => format!("{text}%"),
                    Pattern::Suffix => format!("%{text}"),
                    Pattern::Infix => format!("%{text}%"),
                }))
            }
            v if v.is_null() => Value::Varchar(None),
            v => return Err(unsupported(format!("LIKE pattern {v:?}"))),
        };
        self.visit_operand(target, Side::Left)?;
        self.writer.write_like(&mut self.context, &mut self.out);
        self.push_value(pattern);
        Ok(())
    }

    /// `IN` test, only list values are collections. Anything else (a captured `String`
    /// searched for a substring, a scalar) has no membership translation.
    fn visit_membership(&mut self, item: &Expr, collection: &Expr) -> Result<()> {
        let values = match collection {
            Expr::Value(values @ Value::List(..)) => values.clone(),
            Expr::Value(value) => {
                return Err(unsupported(format!("Membership in {value:?}")));
            }
            _ => return Err(unsupported(format!("Membership in {}", collection.kind()))),
        };
        self.visit_operand(item, Side::Left)?;
        self.writer.write_in(&mut self.context, &mut self.out);
        self.push_value(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Catalog, TSqlWriter,
        testing::{Country, Region},
    };

    fn compile(expr: Expr) -> Result<CompiledPredicate> {
        let catalog = Catalog::new();
        let table = catalog.describe::<Region>()?;
        PredicateCompiler::new(&TSqlWriter::new(), PredicateScope::new(&table, "t")).compile(&expr)
    }

    #[test]
    fn comparisons_and_connectives() {
        let compiled = compile(
            Expr::column("id")
                .greater(Expr::value(10))
                .and(Expr::column("name").not_equal(Expr::value("North")))
                .or(Expr::column("code").equal(Expr::null())),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "((t.[ID] > @0 AND t.[RegionName] <> @1) OR t.[RegionCode] IS NULL)"
        );
        assert_eq!(
            compiled.args,
            [Value::Int32(Some(10)), Value::Varchar(Some("North".into()))]
        );
    }

    #[test]
    fn like_patterns() {
        let compiled = compile(Expr::column("name").starts_with(Expr::value("ab"))).unwrap();
        assert_eq!(compiled.sql, "t.[RegionName] LIKE @0");
        assert_eq!(compiled.args, [Value::Varchar(Some("ab%".into()))]);
        let compiled = compile(Expr::column("name").contains(Expr::value("x"))).unwrap();
        assert_eq!(compiled.args, [Value::Varchar(Some("%x%".into()))]);
        let compiled = compile(Expr::column("code").ends_with(Expr::value("5%_"))).unwrap();
        assert_eq!(compiled.args, [Value::Varchar(Some("%5[%][_]".into()))]);
    }

    #[test]
    fn in_lists() {
        let compiled = compile(Expr::column("id").is_in(Expr::value(vec![1, 2, 3]))).unwrap();
        assert_eq!(compiled.sql, "t.[ID] IN ( @0,@1,@2 )");
        assert_eq!(
            compiled.args,
            [Value::Int32(Some(1)), Value::Int32(Some(2)), Value::Int32(Some(3))]
        );
        let compiled = compile(
            Expr::value(vec![String::from("a"), String::from("b")])
                .contains(Expr::column("code"))
                .and(Expr::column("id").equal(Expr::value(7))),
        )
        .unwrap();
        assert_eq!(compiled.sql, "(t.[RegionCode] IN ( @0,@1 ) AND t.[ID] = @2)");
        let compiled = compile(Expr::column("id").is_in(Expr::value(Vec::<i32>::new()))).unwrap();
        assert_eq!(compiled.sql, "t.[ID] IN ( NULL )");
        assert!(compiled.args.is_empty());
    }

    #[test]
    fn membership_needs_a_list() {
        for collection in [Expr::value("ABCDEF"), Expr::value(5), Expr::column("name")] {
            let error = compile(Expr::column("code").is_in(collection)).unwrap_err();
            assert!(matches!(
                error.downcast_ref::<SluiceError>(),
                Some(SluiceError::Compilation(
                    CompilationError::UnsupportedExpressionKind(kind)
                )) if kind.starts_with("Membership in")
            ));
        }
    }

    #[test]
    fn boolean_members() {
        let compiled = compile(!Expr::column("active").and(Expr::column("active"))).unwrap();
        assert_eq!(compiled.sql, "NOT (t.[Active] = 1 AND t.[Active] = 1)");
        let compiled = compile((!Expr::column("active")).or(Expr::value(true))).unwrap();
        assert_eq!(compiled.sql, "(t.[Active] = 0 OR 1 = 1)");
    }

    #[test]
    fn unsupported_nodes() {
        let kind = |expr| match compile(expr).unwrap_err().downcast::<SluiceError>() {
            Ok(SluiceError::Compilation(CompilationError::UnsupportedExpressionKind(kind))) => kind,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            kind(Expr::column("id").binary(BinaryOpType::Addition, Expr::value(1))),
            "Addition"
        );
        assert_eq!(
            kind(Expr::column("name").call("to_upper", vec![Expr::value("X")])),
            "Call(to_upper)"
        );
        assert_eq!(kind(Expr::column("id")), "Column `id` used as a condition");
        let error = compile(Expr::column("population").equal(Expr::value(1))).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Compilation(CompilationError::UnknownMember { .. }))
        ));
    }

    #[test]
    fn join_predicates() {
        let catalog = Catalog::new();
        let region = catalog.describe::<Region>().unwrap();
        let country = catalog.describe::<Country>().unwrap();
        let compiled = PredicateCompiler::join(
            &TSqlWriter::new(),
            PredicateScope::new(&region, "t"),
            PredicateScope::new(&country, "t1"),
        )
        .compile(
            &Expr::left("id")
                .equal(Expr::right("region_id"))
                .and(Expr::right("name").not_equal(Expr::value(""))),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "(t.[ID] = t1.[RegionID] AND t1.[name] <> @0)"
        );
    }
}
