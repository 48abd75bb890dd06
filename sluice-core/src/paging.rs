use crate::{CompilationError, Result, SluiceError, SqlWriter, truncate_long, writer::Context};

/// Top level clauses of a `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectParts<'a> {
    /// Column list, without `SELECT` and `DISTINCT`.
    pub columns: &'a str,
    pub distinct: bool,
    /// From `FROM` up to the trailing `ORDER BY` or the end of the statement.
    pub from: &'a str,
    /// Trailing `ORDER BY` clause, keyword included.
    pub order_by: Option<&'a str>,
}

impl SelectParts<'_> {
    /// The column list has a single top level entry.
    pub fn single_column(&self) -> bool {
        let bytes = self.columns.as_bytes();
        let (mut depth, mut i) = (0usize, 0);
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'[' | b'\'' | b'"' => {
                    let close = if bytes[i] == b'[' { b']' } else { bytes[i] };
                    i += 1;
                    while i < bytes.len() && bytes[i] != close {
                        i += 1;
                    }
                }
                b',' if depth == 0 => return false,
                _ => {}
            }
            i += 1;
        }
        true
    }

    /// Statement without its `SELECT` keyword and trailing `ORDER BY`.
    pub fn select_removed(&self) -> String {
        format!(
            "{}{} {}",
            if self.distinct { "DISTINCT " } else { "" },
            self.columns,
            self.from
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Word<'a> {
    text: &'a str,
    start: usize,
    depth: usize,
}

/// Yields the words of a statement with their nesting depth, skipping literals, bracketed
/// identifiers and comments.
struct Scanner<'a> {
    sql: &'a str,
    position: usize,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            position: 0,
            depth: 0,
        }
    }

    fn skip_delimited(&mut self, close: u8) {
        let bytes = self.sql.as_bytes();
        self.position += 1;
        while self.position < bytes.len() {
            if bytes[self.position] == close {
                if bytes.get(self.position + 1) == Some(&close) {
                    self.position += 2;
                    continue;
                }
                break;
            }
            self.position += 1;
        }
        self.position += 1;
    }

    fn skip_until(&mut self, end: &str) {
        self.position = match self.sql[self.position..].find(end) {
            Some(i) => self.position + i + end.len(),
            None => self.sql.len(),
        };
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'#' | b'$') || b >= 0x80
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Word<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.sql.as_bytes();
        while self.position < bytes.len() {
            match bytes[self.position] {
                b'\'' => self.skip_delimited(b'\''),
                b'"' => self.skip_delimited(b'"'),
                b'[' => self.skip_delimited(b']'),
                b'-' if bytes.get(self.position + 1) == Some(&b'-') => self.skip_until("\n"),
                b'/' if bytes.get(self.position + 1) == Some(&b'*') => self.skip_until("*/"),
                b'(' => {
                    self.depth += 1;
                    self.position += 1;
                }
                b')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.position += 1;
                }
                b if is_word_byte(b) => {
                    let start = self.position;
                    while self.position < bytes.len() && is_word_byte(bytes[self.position]) {
                        self.position += 1;
                    }
                    return Some(Word {
                        text: &self.sql[start..self.position],
                        start,
                        depth: self.depth,
                    });
                }
                _ => self.position += 1,
            }
        }
        None
    }
}

fn unparseable(sql: &str) -> crate::Error {
    SluiceError::from(CompilationError::UnparseableSelect(
        truncate_long!(sql).to_string(),
    ))
    .into()
}

/// Splits a `SELECT` statement into its column list, its source clauses and its trailing
/// `ORDER BY`.
///
/// Only top level keywords count: a `FROM` or `ORDER BY` inside parentheses (sub-queries,
/// window functions, `OVER` clauses) is part of the enclosing clause.
pub fn split_select(sql: &str) -> Result<SelectParts<'_>> {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    let mut words = Scanner::new(sql).peekable();
    let Some(select) = words.next() else {
        return Err(unparseable(sql));
    };
    if select.depth != 0 || !select.text.eq_ignore_ascii_case("SELECT") {
        return Err(unparseable(sql));
    }
    let mut columns_start = select.start + select.text.len();
    let distinct = words
        .peek()
        .is_some_and(|w| w.depth == 0 && w.text.eq_ignore_ascii_case("DISTINCT"));
    if distinct {
        if let Some(word) = words.next() {
            columns_start = word.start + word.text.len();
        }
    }
    let Some(from) = words
        .by_ref()
        .find(|w| w.depth == 0 && w.text.eq_ignore_ascii_case("FROM"))
    else {
        return Err(unparseable(sql));
    };
    let columns = sql[columns_start..from.start].trim();
    if columns.is_empty() {
        return Err(unparseable(sql));
    }
    let mut order_by = None;
    let mut previous: Option<Word> = None;
    for word in words {
        if word.depth == 0 && word.text.eq_ignore_ascii_case("BY") {
            if let Some(order) = previous.filter(|p| p.text.eq_ignore_ascii_case("ORDER")) {
                order_by = Some(order.start);
            }
        }
        previous = (word.depth == 0).then_some(word);
    }
    let from_end = order_by.unwrap_or(sql.len());
    Ok(SelectParts {
        columns,
        distinct,
        from: sql[from.start..from_end].trim(),
        order_by: order_by.map(|i| sql[i..].trim()),
    })
}

/// Removes the alias qualifiers of the top level keys of an `ORDER BY` clause,
/// `t.[a] DESC` becomes `[a] DESC`.
fn unqualify_order_by(order_by: &str) -> String {
    let bytes = order_by.as_bytes();
    let mut result = String::with_capacity(order_by.len());
    let (mut position, mut depth, mut i) = (0, 0usize, 0);
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'[' | b'\'' => {
                let close = if bytes[i] == b'[' { b']' } else { b'\'' };
                i += 1;
                while i < bytes.len() && bytes[i] != close {
                    i += 1;
                }
            }
            b if is_word_byte(b) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                if depth == 0 && bytes.get(i) == Some(&b'.') {
                    result.push_str(&order_by[position..start]);
                    position = i + 1;
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    result.push_str(&order_by[position..]);
    result
}

/// Count and page statements derived from a `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedStatements {
    /// Counts every row of the original statement.
    pub count: String,
    /// Selects a window of rows, bounded by the two placeholders that follow the original
    /// arguments: rows to skip and index of the last row.
    pub page: String,
}

/// Derives the count and windowed page statements of `sql`, which has `arg_count`
/// arguments.
pub fn paged_statements(
    writer: &dyn SqlWriter,
    sql: &str,
    arg_count: usize,
) -> Result<PagedStatements> {
    let parts = split_select(sql)?;
    let mut context = Context::default();
    let mut count = String::with_capacity(sql.len());
    writer.write_count(&mut context, &mut count, &parts);
    let order_by = match parts.order_by {
        Some(order_by) if parts.distinct => unqualify_order_by(order_by),
        Some(order_by) => order_by.to_string(),
        None => "ORDER BY (SELECT NULL)".to_string(),
    };
    let mut page = String::with_capacity(sql.len() + 96);
    writer.write_page(
        &mut context,
        &mut page,
        &order_by,
        &parts,
        arg_count,
    );
    Ok(PagedStatements { count, page })
}
