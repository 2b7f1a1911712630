//! Identifier quoting.
//!
//! - `!expr` is a raw fragment: the `!` is stripped and nothing is quoted
//! - `a.b` quotes every part: `"a"."b"`
//! - a trailing alias is quoted too: `a.b x` and `a.b AS x` give `"a"."b" "x"`
//! - `*` is never quoted: `a.*` gives `"a".*`

/// Quote an identifier path with `quote`, dropping any quote characters in the input.
pub fn quote_identifier(input: &str, quote: char) -> String {
    let trimmed = input.trim();
    if let Some(raw) = trimmed.strip_prefix('!') {
        return raw.to_owned();
    }

    let cleaned: String = trimmed.chars().filter(|c| *c != quote).collect();
    let mut tokens = cleaned.split_whitespace();
    let Some(path) = tokens.next() else {
        return String::new();
    };
    let rest: Vec<&str> = tokens.filter(|t| !t.eq_ignore_ascii_case("as")).collect();

    let mut out = quote_path(path, quote);
    if let Some(alias) = rest.last() {
        out.push(' ');
        out.push_str(&quote_part(alias, quote));
    }
    out
}

fn quote_path(path: &str, quote: char) -> String {
    path.split('.')
        .map(|part| quote_part(part, quote))
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_part(part: &str, quote: char) -> String {
    if part == "*" {
        return part.to_owned();
    }
    format!("{quote}{part}{quote}")
}

/// Split `database.table` into its parts; a bare name has no database.
pub fn split_table(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((db, table)) if !db.is_empty() => (Some(db), table),
        Some((_, table)) => (None, table),
        None => (None, name),
    }
}
