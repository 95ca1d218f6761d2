//! SQL escaping primitives.
//!
//! This crate implements no escaping rules of its own; both functions
//! delegate to the driver's wire-protocol implementation in
//! `postgres-protocol`, which is authoritative for the Postgres dialect.

/// Quote a string as a SQL identifier (`abc` → `"abc"`, embedded `"` doubled).
pub fn escape_identifier(name: &str) -> String {
    postgres_protocol::escape::escape_identifier(name)
}

/// Quote a string as a SQL literal (`abc` → `'abc'`, embedded `'` doubled,
/// backslashes handled via the `E''` form).
pub fn escape_literal(text: &str) -> String {
    postgres_protocol::escape::escape_literal(text)
}
