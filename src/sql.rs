//! SQL text shared by the backends.
//!
//! Everything here is a pure function of the table name and query; the
//! backends differ only in how parameters are spelled, which is passed in as
//! a [`Placeholder`] style.

use crate::record::LogQuery;

/// Insert column list, in bind order.
pub const INSERT_COLUMNS: &str = "timestamp, level, logger, module, function, line, message, \
     thread_name, process_id, exception, extra_data";

/// Number of binds per inserted row.
pub const BINDS_PER_ROW: usize = 11;

/// Longest table name accepted (PostgreSQL identifier limit).
pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Largest retention either backend can subtract from the current time.
///
/// About 5475 years: PostgreSQL timestamps end at 4713 BC, and SQLite
/// date functions yield NULL before year 0, which deletes nothing.
pub const MAX_RETENTION_DAYS: u32 = 2_000_000;

/// Clamp a retention period to [`MAX_RETENTION_DAYS`].
///
/// Any longer retention already reaches past the oldest representable
/// timestamp, so the effect of cleanup is unchanged.
pub fn capped_retention_days(retention_days: u32) -> u32 {
    retention_days.min(MAX_RETENTION_DAYS)
}

/// How a backend spells bind parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (SQLite).
    Positional,
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
}

impl Placeholder {
    /// Render the placeholder for the 1-based parameter `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            Placeholder::Positional => "?".to_string(),
            Placeholder::Numbered => format!("${}", index),
        }
    }
}

/// `WHERE` clause for the optional filters of a [`LogQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    /// Either empty or ` WHERE ...` with a leading space.
    pub sql: String,
    /// Values to bind, in placeholder order.
    pub params: Vec<String>,
}

/// Build the exact-match filter on `level` and `logger`, joined with `AND`.
pub fn filter_clause(query: &LogQuery, style: Placeholder) -> FilterClause {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for (column, value) in [("level", &query.level), ("logger", &query.logger)] {
        if let Some(value) = value {
            params.push(value.clone());
            conditions.push(format!("{} = {}", column, style.render(params.len())));
        }
    }

    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    FilterClause { sql, params }
}

/// A full paginated `SELECT`.
///
/// Bind `params` first, then `LIMIT` and `OFFSET` as integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    pub sql: String,
    pub params: Vec<String>,
}

pub fn select_statement(table: &str, query: &LogQuery, style: Placeholder) -> SelectStatement {
    let filter = filter_clause(query, style);
    let next = filter.params.len() + 1;
    let sql = format!(
        "SELECT {cols} FROM {table}{filter} ORDER BY timestamp DESC, id DESC LIMIT {limit} OFFSET {offset}",
        cols = INSERT_COLUMNS,
        table = table,
        filter = filter.sql,
        limit = style.render(next),
        offset = style.render(next + 1),
    );

    SelectStatement {
        sql,
        params: filter.params,
    }
}

/// `INSERT INTO <table> (<columns>) ` prefix for a multi-row `VALUES` list.
pub fn insert_prefix(table: &str) -> String {
    format!("INSERT INTO {} ({}) ", table, INSERT_COLUMNS)
}

/// Index statements both backends run after creating the table.
pub fn index_statements(table: &str) -> Vec<String> {
    ["timestamp", "level", "logger"]
        .iter()
        .map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table} ({column})",
                table = table,
                column = column
            )
        })
        .collect()
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_TABLE_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filters_yields_empty_clause() {
        let clause = filter_clause(&LogQuery::default(), Placeholder::Numbered);
        assert_eq!(clause.sql, "");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn filters_are_joined_with_and_in_both_styles() {
        let query = LogQuery::default().level("ERROR").logger("billing");

        let numbered = filter_clause(&query, Placeholder::Numbered);
        assert_eq!(numbered.sql, " WHERE level = $1 AND logger = $2");
        assert_eq!(numbered.params, vec!["ERROR", "billing"]);

        let positional = filter_clause(&query, Placeholder::Positional);
        assert_eq!(positional.sql, " WHERE level = ? AND logger = ?");
        assert_eq!(positional.params, numbered.params);
    }

    #[test]
    fn logger_only_filter_takes_first_slot() {
        let query = LogQuery::default().logger("billing");
        let clause = filter_clause(&query, Placeholder::Numbered);
        assert_eq!(clause.sql, " WHERE logger = $1");
    }

    #[test]
    fn select_numbers_pagination_after_filters() {
        let query = LogQuery::default().level("INFO");
        let stmt = select_statement("application_logs", &query, Placeholder::Numbered);
        assert!(stmt.sql.starts_with("SELECT timestamp, level, logger"));
        assert!(stmt
            .sql
            .ends_with("FROM application_logs WHERE level = $1 ORDER BY timestamp DESC, id DESC LIMIT $2 OFFSET $3"));
        assert_eq!(stmt.params, vec!["INFO"]);

        let stmt = select_statement("logs", &LogQuery::default(), Placeholder::Positional);
        assert!(stmt.sql.ends_with("FROM logs ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?"));
    }

    #[test]
    fn indexes_cover_filter_and_order_columns() {
        let stmts = index_statements("app_logs");
        assert_eq!(
            stmts,
            vec![
                "CREATE INDEX IF NOT EXISTS idx_app_logs_timestamp ON app_logs (timestamp)",
                "CREATE INDEX IF NOT EXISTS idx_app_logs_level ON app_logs (level)",
                "CREATE INDEX IF NOT EXISTS idx_app_logs_logger ON app_logs (logger)",
            ]
        );
    }

    #[test]
    fn retention_is_capped_to_a_representable_interval() {
        assert_eq!(capped_retention_days(0), 0);
        assert_eq!(capped_retention_days(30), 30);
        assert_eq!(capped_retention_days(MAX_RETENTION_DAYS), MAX_RETENTION_DAYS);
        assert_eq!(capped_retention_days(u32::MAX), MAX_RETENTION_DAYS);
        assert!(i32::try_from(MAX_RETENTION_DAYS).is_ok());
    }

    #[test]
    fn table_names_must_be_plain_identifiers() {
        assert!(is_valid_table_name("application_logs"));
        assert!(is_valid_table_name("_logs2"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2logs"));
        assert!(!is_valid_table_name("logs; DROP TABLE users"));
        assert!(!is_valid_table_name("public.logs"));
        assert!(!is_valid_table_name(&"a".repeat(64)));
    }
}
