use crate::{Entity, Expr, Sql};
use std::marker::PhantomData;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

/// Join waiting for its `ON` condition.
#[derive(Debug)]
pub struct JoinClause<R: Entity> {
    sql: Sql,
    join_type: JoinType,
    alias: Option<String>,
    _right: PhantomData<R>,
}

impl<R: Entity> JoinClause<R> {
    /// Condition between the primary record type of the statement (left) and `R` (right).
    ///
    /// Fails at build time when the statement has no typed part yet.
    pub fn on(self, on: impl Into<Expr>) -> Sql {
        match self.sql.primary_entity() {
            Some(left) => {
                let on = on.into();
                self.sql
                    .join_entity::<R>(self.join_type, left, self.alias.as_deref(), on)
            }
            None => self.sql.raw_error("A join needs a preceding typed SELECT or FROM"),
        }
    }

    /// Condition between `L` (left) and `R` (right).
    pub fn on_with<L: Entity>(self, on: impl Into<Expr>) -> Sql {
        self.sql.join_entity::<R>(
            self.join_type,
            L::entity_type(),
            self.alias.as_deref(),
            on.into(),
        )
    }
}

impl Sql {
    pub fn inner_join<R: Entity>(self) -> JoinClause<R> {
        self.join_clause(JoinType::Inner, None)
    }

    pub fn inner_join_as<R: Entity>(self, alias: &str) -> JoinClause<R> {
        self.join_clause(JoinType::Inner, Some(alias))
    }

    pub fn left_join<R: Entity>(self) -> JoinClause<R> {
        self.join_clause(JoinType::Left, None)
    }

    pub fn left_join_as<R: Entity>(self, alias: &str) -> JoinClause<R> {
        self.join_clause(JoinType::Left, Some(alias))
    }

    fn join_clause<R: Entity>(self, join_type: JoinType, alias: Option<&str>) -> JoinClause<R> {
        JoinClause {
            sql: self,
            join_type,
            alias: alias.map(str::to_string),
            _right: PhantomData,
        }
    }
}
