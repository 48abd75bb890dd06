/// Position of the text being written inside the statement.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// Select lists, conditions, ordering and grouping.
    #[default]
    None,
    /// Table read by a `FROM` or `JOIN`, the only place table hints apply.
    SqlSelectFrom,
    SqlInsertInto,
    SqlUpdate,
    /// Literal batch text, `@` is doubled so that it survives parameter processing.
    SqlBulkBatch,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub fragment: Fragment,
}

impl Context {
    pub fn new(fragment: Fragment) -> Self {
        Self { fragment }
    }

    pub fn escapes_parameters(&self) -> bool {
        self.fragment == Fragment::SqlBulkBatch
    }

    /// Column references carry the table alias, write targets name bare columns.
    pub fn qualifies_columns(&self) -> bool {
        !matches!(
            self.fragment,
            Fragment::SqlInsertInto | Fragment::SqlUpdate | Fragment::SqlBulkBatch
        )
    }

    pub fn reads_table(&self) -> bool {
        self.fragment == Fragment::SqlSelectFrom
    }

    pub fn switch_fragment(&self, fragment: Fragment) -> Context {
        Context { fragment }
    }
}
