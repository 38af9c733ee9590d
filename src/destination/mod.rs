//! Destination-side admin, write path and secondary sink.

use std::fmt;

pub mod emitter;
pub mod schema;
pub mod writer;

/// A destination database and table pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetTable {
    pub database: String,
    pub table: String,
}

impl TargetTable {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Backtick-quoted `db`.`table` form for SQL statements.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", backtick(&self.database), backtick(&self.table))
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub(crate) fn backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_is_backticked() {
        let target = TargetTable::new("cdc", "public__orders");
        assert_eq!(target.qualified_name(), "`cdc`.`public__orders`");
    }

    #[test]
    fn backtick_doubles_embedded_quotes() {
        assert_eq!(backtick("we`ird"), "`we``ird`");
    }
}
