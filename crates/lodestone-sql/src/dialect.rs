//! SQL dialect configuration.

/// Dialect-specific rendering rules consumed by the compiler.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Returns the literal token for a boolean value.
    ///
    /// Defaults to the `'t'`/`'f'` convention rather than bare keywords.
    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "'t'"
        } else {
            "'f'"
        }
    }

    /// Escapes the body of a string literal.
    ///
    /// The default doubles embedded quotes and backslashes.
    fn escape_text(&self, s: &str) -> String {
        s.replace('\\', "\\\\").replace('\'', "''")
    }

    /// Whether OFFSET is only valid after a LIMIT clause.
    fn requires_limit_for_offset(&self) -> bool {
        false
    }
}

/// A generic dialect using ANSI SQL conventions.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    /// Creates a new generic dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}

/// The SQLite dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    /// SQLite has no backslash escapes; only quotes are doubled.
    fn escape_text(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn requires_limit_for_offset(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_dialect() {
        let dialect = GenericDialect::new();
        assert_eq!(dialect.name(), "generic");
        assert_eq!(dialect.identifier_quote(), '"');
        assert_eq!(dialect.boolean_literal(true), "'t'");
        assert_eq!(dialect.boolean_literal(false), "'f'");
        assert_eq!(dialect.escape_text("a\\b'c"), "a\\\\b''c");
        assert!(!dialect.requires_limit_for_offset());
    }

    #[test]
    fn test_sqlite_dialect() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(dialect.escape_text("a\\b'c"), "a\\b''c");
        assert!(dialect.requires_limit_for_offset());
    }
}
