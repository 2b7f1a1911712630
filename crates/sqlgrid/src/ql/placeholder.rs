//! Rewrites canonical `?` markers into a dialect's placeholder syntax.

/// Placeholder style of a dialect: `?, ?, ?` (positional) or `$1, $2, $3` (numeric).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub char: char,
    pub numeric: bool,
}

impl Placeholder {
    pub const QUESTION: Placeholder = Placeholder {
        char: '?',
        numeric: false,
    };

    pub const DOLLAR: Placeholder = Placeholder {
        char: '$',
        numeric: true,
    };

    /// Replace every `?` in `stmt`; numbering starts at 1 for each call.
    pub fn render(&self, stmt: &str) -> String {
        if *self == Self::QUESTION {
            return stmt.to_owned();
        }

        let mut out = String::with_capacity(stmt.len() + 8);
        let mut counter = 0usize;
        for ch in stmt.chars() {
            if ch == '?' {
                counter += 1;
                out.push(self.char);
                if self.numeric {
                    out.push_str(&counter.to_string());
                }
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// Number of placeholders this dialect would see in a rendered statement.
    pub fn count(&self, rendered: &str) -> usize {
        if self.numeric {
            let bytes = rendered.as_bytes();
            let marker = self.char as u32;
            bytes
                .iter()
                .enumerate()
                .filter(|(i, b)| {
                    u32::from(**b) == marker
                        && bytes.get(i + 1).is_some_and(|next| next.is_ascii_digit())
                })
                .count()
        } else {
            rendered.chars().filter(|c| *c == self.char).count()
        }
    }
}

/// Count canonical `?` markers.
pub fn count_markers(fragment: &str) -> usize {
    fragment.chars().filter(|c| *c == '?').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_is_identity() {
        let sql = "SELECT * FROM t WHERE a = ? AND b IN (?, ?)";
        assert_eq!(Placeholder::QUESTION.render(sql), sql);
        assert_eq!(Placeholder::QUESTION.count(sql), 3);
    }

    #[test]
    fn numeric_counts_per_render() {
        let sql = "UPDATE t SET a = ?, b = ? WHERE id = ?";
        let first = Placeholder::DOLLAR.render(sql);
        assert_eq!(first, "UPDATE t SET a = $1, b = $2 WHERE id = $3");
        assert_eq!(Placeholder::DOLLAR.render(sql), first);
        assert_eq!(Placeholder::DOLLAR.count(&first), 3);
    }

    #[test]
    fn custom_marker() {
        let colon = Placeholder {
            char: ':',
            numeric: true,
        };
        assert_eq!(colon.render("a = ? OR b = ?"), "a = :1 OR b = :2");
    }
}
