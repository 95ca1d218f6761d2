//! Result rows returned across the driver boundary.

use crate::value::SqlValue;

/// How result rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowShape {
    /// Column name → value pairs in column order.
    #[default]
    Record,
    /// Bare values in column order, names discarded.
    Array,
}

/// One result row, in the shape the statement asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Record(Vec<(String, SqlValue)>),
    Array(Vec<SqlValue>),
}

impl Row {
    /// Look up a column by name. Always `None` for array-shaped rows.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        match self {
            Self::Record(columns) => columns
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value),
            Self::Array(_) => None,
        }
    }

    pub fn column_count(&self) -> usize {
        match self {
            Self::Record(columns) => columns.len(),
            Self::Array(values) => values.len(),
        }
    }

    /// The column values in order, names dropped.
    pub fn into_values(self) -> Vec<SqlValue> {
        match self {
            Self::Record(columns) => columns.into_iter().map(|(_, value)| value).collect(),
            Self::Array(values) => values,
        }
    }
}

/// A complete query result: the driver-reported affected-row count plus the
/// materialized rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub row_count: u64,
    pub rows: Vec<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_rows_resolve_columns_by_name() {
        let row = Row::Record(vec![
            ("id".to_string(), SqlValue::Int(1)),
            ("name".to_string(), SqlValue::Text("a".to_string())),
        ]);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.column_count(), 2);
    }

    #[test]
    fn array_rows_keep_order_only() {
        let row = Row::Array(vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert_eq!(row.get("id"), None);
        assert_eq!(row.into_values(), vec![SqlValue::Int(1), SqlValue::Int(2)]);
    }
}
