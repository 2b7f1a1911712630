//! Introspected schema records.

use serde::Serialize;

/// Backend-independent classification of a column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum AbstractType {
    Integer { min: i64, max: u64 },
    Float,
    Text { size: Option<i64> },
    TextArea { size: Option<i64> },
    Time,
    Date,
    DateTime,
    Select { items: Vec<String> },
    MultiSelect { items: Vec<String> },
}

impl AbstractType {
    pub fn name(&self) -> &'static str {
        match self {
            AbstractType::Integer { .. } => "Integer",
            AbstractType::Float => "Float",
            AbstractType::Text { .. } => "Text",
            AbstractType::TextArea { .. } => "TextArea",
            AbstractType::Time => "Time",
            AbstractType::Date => "Date",
            AbstractType::DateTime => "DateTime",
            AbstractType::Select { .. } => "Select",
            AbstractType::MultiSelect { .. } => "MultiSelect",
        }
    }

    /// Integer bounds for a signed or unsigned column `bits` wide.
    pub fn integer(bits: u32, unsigned: bool) -> Self {
        if unsigned {
            let max = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            AbstractType::Integer { min: 0, max }
        } else {
            let half = 1i128 << (bits.min(64) - 1);
            AbstractType::Integer {
                min: (-half) as i64,
                max: (half - 1) as u64,
            }
        }
    }
}

/// A physical column as reported by the information schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Column {
    pub table: String,
    pub name: String,
    pub position: i64,
    pub nullable: bool,
    pub primary: bool,
    #[serde(rename = "type")]
    pub ty: Option<AbstractType>,
    /// Source-specific type spelling, e.g. `int(10) unsigned`.
    pub raw: String,
    pub default_value: Option<String>,
    pub length: Option<i64>,
    pub autoincrement: bool,
}

impl Column {
    pub fn named(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub primary: TableColumn,
    pub secondary: TableColumn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bounds_follow_width_and_sign() {
        assert_eq!(AbstractType::integer(8, false), AbstractType::Integer { min: -128, max: 127 });
        assert_eq!(AbstractType::integer(8, true), AbstractType::Integer { min: 0, max: 255 });
        assert_eq!(
            AbstractType::integer(64, false),
            AbstractType::Integer { min: i64::MIN, max: i64::MAX as u64 }
        );
        assert_eq!(AbstractType::integer(64, true), AbstractType::Integer { min: 0, max: u64::MAX });
    }
}
