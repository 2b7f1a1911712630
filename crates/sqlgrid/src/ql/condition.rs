//! Clause accumulator shared by the statement builders.
//!
//! Fragments are written with canonical `?` markers. A [`Value::List`]
//! argument expands its marker to one `?` per element, so
//! `and_where("id IN (?)", args![vec![1, 2, 3]])` renders
//! `WHERE id IN (?, ?, ?)` with three arguments.
//!
//! Invalid input does not panic or return early: the first error is kept
//! and reported when the condition is rendered.

use crate::error::{Error, ErrorKind, Result};
use crate::ql::ident::quote_identifier;
use crate::ql::placeholder::count_markers;
use crate::value::Value;

/// Clause kinds a [`Condition`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    On,
    Where,
    Group,
    Having,
    Order,
    Limit,
    Offset,
}

impl Clause {
    pub const ALL: [Clause; 7] = [
        Clause::On,
        Clause::Where,
        Clause::Group,
        Clause::Having,
        Clause::Order,
        Clause::Limit,
        Clause::Offset,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderBy {
    column: String,
    desc: bool,
}

impl OrderBy {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        if entry.starts_with('!') {
            return Some(Self {
                column: entry.to_owned(),
                desc: false,
            });
        }
        if let Some(column) = entry.strip_prefix('-') {
            return Some(Self {
                column: column.trim().to_owned(),
                desc: true,
            });
        }
        match entry.rsplit_once(char::is_whitespace) {
            Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => Some(Self {
                column: column.trim().to_owned(),
                desc: true,
            }),
            Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => Some(Self {
                column: column.trim().to_owned(),
                desc: false,
            }),
            _ => Some(Self {
                column: entry.to_owned(),
                desc: false,
            }),
        }
    }

    fn render(&self, quote: char) -> String {
        if self.column.starts_with('!') {
            return quote_identifier(&self.column, quote);
        }
        let dir = if self.desc { "DESC" } else { "ASC" };
        format!("{} {dir}", quote_identifier(&self.column, quote))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Deferred {
    clause: Clause,
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    on: Vec<String>,
    on_args: Vec<Value>,
    wheres: Vec<String>,
    where_args: Vec<Value>,
    group: Vec<String>,
    having: Vec<String>,
    having_args: Vec<Value>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    error: Option<Deferred>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `WHERE` fragment; successive calls are joined with `AND`.
    pub fn and_where(&mut self, fragment: &str, args: Vec<Value>) -> &mut Self {
        if let Some((frag, args)) = self.expand(Clause::Where, fragment, args) {
            self.wheres.push(frag);
            self.where_args.extend(args);
        }
        self
    }

    /// Add a `HAVING` fragment; successive calls are joined with `AND`.
    pub fn having(&mut self, fragment: &str, args: Vec<Value>) -> &mut Self {
        if let Some((frag, args)) = self.expand(Clause::Having, fragment, args) {
            self.having.push(frag);
            self.having_args.extend(args);
        }
        self
    }

    /// Add a join `ON` fragment; successive calls are joined with `AND`.
    pub fn on(&mut self, fragment: &str, args: Vec<Value>) -> &mut Self {
        if let Some((frag, args)) = self.expand(Clause::On, fragment, args) {
            self.on.push(frag);
            self.on_args.extend(args);
        }
        self
    }

    /// Append sort entries: `col`, `col asc`, `col desc` or `-col`.
    pub fn order<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.order
            .extend(columns.into_iter().filter_map(|c| OrderBy::parse(c.as_ref())));
        self
    }

    pub fn group<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group.extend(
            columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_owned())
                .filter(|c| !c.is_empty()),
        );
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Clear the given clauses (all of them when `kinds` is empty).
    pub fn reset(&mut self, kinds: &[Clause]) -> &mut Self {
        let kinds: &[Clause] = if kinds.is_empty() { &Clause::ALL } else { kinds };
        for kind in kinds {
            match kind {
                Clause::On => {
                    self.on.clear();
                    self.on_args.clear();
                }
                Clause::Where => {
                    self.wheres.clear();
                    self.where_args.clear();
                }
                Clause::Group => self.group.clear(),
                Clause::Having => {
                    self.having.clear();
                    self.having_args.clear();
                }
                Clause::Order => self.order.clear(),
                Clause::Limit => self.limit = None,
                Clause::Offset => self.offset = None,
            }
            if self.error.as_ref().is_some_and(|e| e.clause == *kind) {
                self.error = None;
            }
        }
        self
    }

    pub fn has(&self, kind: Clause) -> bool {
        match kind {
            Clause::On => !self.on.is_empty(),
            Clause::Where => !self.wheres.is_empty(),
            Clause::Group => !self.group.is_empty(),
            Clause::Having => !self.having.is_empty(),
            Clause::Order => !self.order.is_empty(),
            Clause::Limit => self.limit.is_some(),
            Clause::Offset => self.offset.is_some(),
        }
    }

    /// Arguments collected for a clause, after container expansion.
    pub fn args(&self, kind: Clause) -> &[Value] {
        match kind {
            Clause::On => &self.on_args,
            Clause::Where => &self.where_args,
            Clause::Having => &self.having_args,
            _ => &[],
        }
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    /// The deferred error, if any fragment was rejected.
    pub fn error(&self) -> Option<Error> {
        self.error
            .as_ref()
            .map(|e| Error::new(e.kind, e.message.clone()))
    }

    /// Merge another condition's `WHERE` fragments and arguments into this one.
    pub fn merge_where(&mut self, other: &Condition) -> &mut Self {
        if self.error.is_none() {
            self.error = other.error.clone();
        }
        self.wheres.extend(other.wheres.iter().cloned());
        self.where_args.extend(other.where_args.iter().cloned());
        self
    }

    /// Render the joined `ON` fragments (without the keyword) and their arguments.
    pub fn render_on(&self) -> Result<(String, Vec<Value>)> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        Ok((self.on.join(" AND "), self.on_args.clone()))
    }

    /// Render the statement suffix
    /// `WHERE .. GROUP BY .. HAVING .. ORDER BY .. LIMIT .. OFFSET ..`
    /// with canonical `?` markers and the `WHERE` then `HAVING` arguments.
    pub fn render(&self, quote: char) -> Result<(String, Vec<Value>)> {
        if let Some(err) = self.error() {
            return Err(err);
        }

        let mut sql = String::new();
        let mut args = Vec::with_capacity(self.where_args.len() + self.having_args.len());

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
            args.extend(self.where_args.iter().cloned());
        }
        if !self.group.is_empty() {
            let cols: Vec<String> = self.group.iter().map(|c| quote_identifier(c, quote)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" AND "));
            args.extend(self.having_args.iter().cloned());
        }
        if !self.order.is_empty() {
            let cols: Vec<String> = self.order.iter().map(|o| o.render(quote)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&cols.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok((sql, args))
    }

    fn fail(&mut self, clause: Clause, kind: ErrorKind, message: String) {
        if self.error.is_none() {
            self.error = Some(Deferred {
                clause,
                kind,
                message,
            });
        }
    }

    fn expand(
        &mut self,
        clause: Clause,
        fragment: &str,
        args: Vec<Value>,
    ) -> Option<(String, Vec<Value>)> {
        let markers = count_markers(fragment);
        if markers != args.len() {
            self.fail(
                clause,
                ErrorKind::ArgumentMismatch,
                format!(
                    "fragment `{fragment}` has {markers} placeholder(s) but {} argument(s) were given",
                    args.len()
                ),
            );
            return None;
        }

        let mut out = String::with_capacity(fragment.len());
        let mut flat = Vec::with_capacity(args.len());
        let mut args = args.into_iter();
        for ch in fragment.chars() {
            if ch != '?' {
                out.push(ch);
                continue;
            }
            match args.next() {
                Some(Value::List(items)) => {
                    if items.is_empty() {
                        out.push_str("NULL");
                        continue;
                    }
                    for item in &items {
                        if !matches!(item, Value::Int(_) | Value::Text(_)) {
                            self.fail(
                                clause,
                                ErrorKind::UnsupportedArgumentKind,
                                format!("{} element in a list argument", item.kind_name()),
                            );
                            return None;
                        }
                    }
                    out.push_str(&vec!["?"; items.len()].join(", "));
                    flat.extend(items);
                }
                Some(value) => {
                    out.push('?');
                    flat.push(value);
                }
                None => out.push('?'),
            }
        }
        Some((out, flat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use pretty_assertions::assert_eq;

    #[test]
    fn where_expands_lists_and_joins_with_and() {
        let mut c = Condition::new();
        c.and_where("id IN (?)", args![vec![1, 2, 3]])
            .and_where("name = ?", args!["Wall-E"]);

        let (sql, args) = c.render('"').unwrap();
        assert_eq!(sql, " WHERE id IN (?, ?, ?) AND name = ?");
        assert_eq!(args, args![1, 2, 3, "Wall-E"]);
    }

    #[test]
    fn clause_order_is_fixed() {
        let mut c = Condition::new();
        c.offset(10)
            .limit(5)
            .order(["-created", "name"])
            .having("COUNT(*) > ?", args![1])
            .group(["owner_id"])
            .and_where("active = ?", args![true]);

        let (sql, args) = c.render('"').unwrap();
        assert_eq!(
            sql,
            r#" WHERE active = ? GROUP BY "owner_id" HAVING COUNT(*) > ? ORDER BY "created" DESC, "name" ASC LIMIT 5 OFFSET 10"#
        );
        assert_eq!(args, args![true, 1]);
    }

    #[test]
    fn order_parses_directions() {
        let mut c = Condition::new();
        c.order(["a desc", "b ASC", "-c", "d", "!FIELD(id, 3, 1)"]);
        let (sql, _) = c.render('`').unwrap();
        assert_eq!(
            sql,
            " ORDER BY `a` DESC, `b` ASC, `c` DESC, `d` ASC, FIELD(id, 3, 1)"
        );
    }

    #[test]
    fn mismatch_is_deferred_to_render() {
        let mut c = Condition::new();
        c.and_where("a = ? AND b = ?", args![1]);
        assert!(!c.has(Clause::Where));
        let err = c.render('"').unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentMismatch);
    }

    #[test]
    fn float_list_elements_are_rejected() {
        let mut c = Condition::new();
        c.and_where("x IN (?)", args![vec![1.5, 2.5]]);
        assert_eq!(c.render('"').unwrap_err().kind(), ErrorKind::UnsupportedArgumentKind);
    }

    #[test]
    fn empty_list_renders_null() {
        let mut c = Condition::new();
        c.and_where("id IN (?)", vec![Value::List(vec![])]);
        let (sql, args) = c.render('"').unwrap();
        assert_eq!(sql, " WHERE id IN (NULL)");
        assert!(args.is_empty());
    }

    #[test]
    fn reset_then_where_equals_fresh() {
        let mut reused = Condition::new();
        reused.and_where("a = ?", args![1]).and_where("b = ? AND c = ?", args![1]);
        reused.reset(&[Clause::Where]).and_where("name = ?", args!["x"]);

        let mut fresh = Condition::new();
        fresh.and_where("name = ?", args!["x"]);

        assert_eq!(reused, fresh);
    }

    #[test]
    fn on_fragments_render_separately() {
        let mut c = Condition::new();
        c.on("robots.owner_id = owners.id AND owners.active = ?", args![true]);
        let (on, args) = c.render_on().unwrap();
        assert_eq!(on, "robots.owner_id = owners.id AND owners.active = ?");
        assert_eq!(args, args![true]);
        assert_eq!(c.render('"').unwrap().0, "");
    }

    #[test]
    fn render_is_deterministic() {
        let mut c = Condition::new();
        c.and_where("id IN (?)", args![vec![4, 5]]).order(["id"]);
        assert_eq!(c.render('"').unwrap(), c.render('"').unwrap());
    }
}
