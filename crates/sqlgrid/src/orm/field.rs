//! Resolved ORM fields.

use crate::ql::column::Column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
}

impl Permission {
    pub const ALL: Permission = Permission {
        read: true,
        write: true,
    };

    pub const NONE: Permission = Permission {
        read: false,
        write: false,
    };

    pub const READ: Permission = Permission {
        read: true,
        write: false,
    };

    pub const WRITE: Permission = Permission {
        read: false,
        write: true,
    };
}

impl Default for Permission {
    fn default() -> Self {
        Self::ALL
    }
}

/// A struct field bound to its physical column.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Rust field name; also the key used in records and grid requests.
    pub name: String,
    pub column: Column,
    /// Lives only in the object graph; never selected or written.
    pub custom: bool,
    pub permission: Permission,
    /// Declared permission, restored by permission lists.
    pub declared: Permission,
    /// Projection rendered as `(expr) AS "column"` instead of the column.
    pub sql_select: Option<String>,
    pub validator: Option<String>,
}

impl Field {
    pub fn column_name(&self) -> &str {
        &self.column.name
    }

    pub fn is_primary(&self) -> bool {
        self.column.primary
    }

    pub fn readable(&self) -> bool {
        !self.custom && self.permission.read
    }

    /// Computed fields are read-only.
    pub fn writable(&self) -> bool {
        !self.custom && self.sql_select.is_none() && self.permission.write
    }
}
