//! Parameter-safe SQL fragments.
//!
//! A [`Fragment`] is an immutable unit of SQL text with `$1, $2, ...`
//! placeholders and the ordered values behind them. Fragments are created by
//! [`Fragment::build`] (or the [`sql`] convenience function) from a template:
//! an ordered list of literal segments interleaved with substitution values,
//! one more segment than values.
//!
//! A `$name` suffix on the segment before a value selects a named transform
//! for it; see [`crate::transform`]. Nested fragments are spliced in with
//! their parameters renumbered, so fragments compose without placeholder
//! collisions:
//!
//! ```ignore
//! use pgfrag::{sql, SqlValue};
//!
//! let user_id = sql(&["(select id from users where login = ", ")"], vec!["alice".into()])?;
//! let audit = sql(
//!     &["insert into audit (user_id, ip) values (", ", ", ")"],
//!     vec![user_id.into(), "127.0.0.1".into()],
//! )?;
//! assert_eq!(
//!     audit.text(),
//!     "insert into audit (user_id, ip) values ((select id from users where login = $1), $2)",
//! );
//! ```

use crate::error::{SqlError, SqlResult};
use crate::escape::{escape_identifier, escape_literal};
use crate::transform::{TransformRegistry, default_registry};
use crate::value::{SqlRendering, SqlValue, hex_string};
use std::fmt;
use std::sync::{LazyLock, OnceLock};

static NULL_FRAGMENT: LazyLock<Fragment> = LazyLock::new(|| Fragment::raw("NULL"));
static DEFAULT_FRAGMENT: LazyLock<Fragment> = LazyLock::new(|| Fragment::raw("DEFAULT"));

/// An immutable, flattened unit of parameter-safe SQL text plus its ordered
/// parameter values.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Literal segments; always one more than `values`.
    parts: Vec<String>,
    values: Vec<SqlValue>,
    text: String,
    rendered: OnceLock<String>,
}

impl Fragment {
    /// Create a fragment from one opaque piece of SQL text, no parameters.
    pub fn raw(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            parts: vec![text.clone()],
            values: Vec::new(),
            text,
            rendered: OnceLock::new(),
        }
    }

    /// The shared `NULL` fragment.
    pub fn null() -> Self {
        NULL_FRAGMENT.clone()
    }

    /// The shared `DEFAULT` fragment.
    pub fn default_keyword() -> Self {
        DEFAULT_FRAGMENT.clone()
    }

    pub(crate) fn from_parts(parts: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(parts.len(), values.len() + 1);
        use std::fmt::Write;
        let mut text = String::new();
        for (i, part) in parts.iter().enumerate() {
            text.push_str(part);
            if i < values.len() {
                let _ = write!(text, "${}", i + 1);
            }
        }
        Self {
            parts,
            values,
            text,
            rendered: OnceLock::new(),
        }
    }

    /// Build a fragment from a template using the given transform registry.
    ///
    /// `parts` must hold exactly one more literal segment than `values`.
    /// Transform tokens in a segment (`... $name`) are applied to the paired
    /// value right-to-left; fragment values (and transform results, which are
    /// always fragments) are spliced in with their parameters renumbered.
    ///
    /// All failures happen here, before any SQL can reach a connection.
    pub fn build(
        registry: &TransformRegistry,
        parts: &[&str],
        values: Vec<SqlValue>,
    ) -> SqlResult<Self> {
        if parts.len() != values.len() + 1 {
            return Err(SqlError::invalid_argument(format!(
                "template with {} values needs {} literal segments, got {}",
                values.len(),
                values.len() + 1,
                parts.len(),
            )));
        }

        let mut writer = FragmentWriter::default();
        for (segment, value) in parts.iter().zip(values) {
            let mut tokens: Vec<&str> = segment.split('$').collect();
            let mut value = value;
            // chained transforms apply innermost (rightmost) first
            while tokens.len() > 1 {
                let name = tokens.pop().unwrap_or_default();
                value = SqlValue::Fragment(registry.apply(name, value)?);
            }
            writer.push_text(tokens[0]);

            if let SqlValue::Custom(hook) = &value {
                if let SqlRendering::Sql(frag) = hook.to_sql() {
                    value = SqlValue::Fragment(frag);
                }
            }

            match value {
                SqlValue::Fragment(frag) => writer.splice(frag),
                SqlValue::Absent => {
                    return Err(SqlError::invalid_argument(
                        "substituted value is absent; use SqlValue::Null for SQL NULL",
                    ));
                }
                value => writer.push_value(value),
            }
        }
        writer.push_text(parts[parts.len() - 1]);
        Ok(writer.finish())
    }

    /// The SQL text with `$1, $2, ...` placeholders. This is what gets
    /// executed, together with [`Fragment::values`].
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The ordered parameter values, index-aligned with the placeholders.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub(crate) fn into_text_values(self) -> (String, Vec<SqlValue>) {
        (self.text, self.values)
    }

    /// Human-readable rendering with values inlined as SQL literals.
    ///
    /// Computed once and cached. For logs and diagnostics only; executable
    /// SQL always goes out as placeholders plus out-of-band parameters.
    pub fn render(&self) -> &str {
        self.rendered.get_or_init(|| {
            let mut out = String::new();
            for (i, value) in self.values.iter().enumerate() {
                out.push_str(&self.parts[i]);
                match literal(value) {
                    Ok(frag) => out.push_str(frag.render()),
                    Err(_) => out.push_str("<absent>"),
                }
            }
            if let Some(last) = self.parts.last() {
                out.push_str(last);
            }
            out
        })
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts && self.values == other.values
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

/// Accumulates spliced text and renumbered values during a build.
#[derive(Default)]
struct FragmentWriter {
    parts: Vec<String>,
    values: Vec<SqlValue>,
    current: String,
}

impl FragmentWriter {
    fn push_text(&mut self, text: &str) {
        self.current.push_str(text);
    }

    fn push_value(&mut self, value: SqlValue) {
        self.parts.push(std::mem::take(&mut self.current));
        self.values.push(value);
    }

    fn splice(&mut self, frag: Fragment) {
        let mut parts = frag.parts.into_iter();
        for value in frag.values {
            if let Some(part) = parts.next() {
                self.push_text(&part);
            }
            self.push_value(value);
        }
        if let Some(last) = parts.next() {
            self.push_text(&last);
        }
    }

    fn finish(mut self) -> Fragment {
        self.parts.push(self.current);
        Fragment::from_parts(self.parts, self.values)
    }
}

/// Build a fragment from a template using the process-wide default registry.
pub fn sql(parts: &[&str], values: Vec<SqlValue>) -> SqlResult<Fragment> {
    Fragment::build(default_registry(), parts, values)
}

/// Treat a string as literal SQL text, verbatim.
pub fn raw_sql(text: impl Into<String>) -> Fragment {
    Fragment::raw(text)
}

/// Quote a name as a SQL identifier.
pub fn identifier(name: &str) -> SqlResult<Fragment> {
    if name.is_empty() {
        return Err(SqlError::invalid_argument(
            "expected a nonempty identifier",
        ));
    }
    Ok(Fragment::raw(escape_identifier(name)))
}

/// Render a value as a SQL literal fragment.
///
/// Fragments pass through unchanged, NULL maps to the shared `NULL`
/// fragment, custom values dispatch through their [`crate::SqlConvert`]
/// hook, and everything else is stringified and quoted by the driver's
/// literal-escaping primitive.
pub fn literal(value: &SqlValue) -> SqlResult<Fragment> {
    let text = match value {
        SqlValue::Fragment(f) => return Ok(f.clone()),
        SqlValue::Null => return Ok(Fragment::null()),
        SqlValue::Absent => {
            return Err(SqlError::invalid_argument(
                "expected a value, got an absent marker",
            ));
        }
        SqlValue::Custom(hook) => {
            return Ok(match hook.to_sql() {
                SqlRendering::Literal(s) => Fragment::raw(escape_literal(&s)),
                SqlRendering::Sql(frag) => frag,
            });
        }
        SqlValue::Bytes(b) => return Ok(Fragment::raw(format!("'{}'", hex_string(b)))),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Timestamp(t) => t.to_rfc3339(),
        SqlValue::Uuid(u) => u.to_string(),
        SqlValue::Json(v) => v.to_string(),
        SqlValue::Object(_) => value.as_json().to_string(),
    };
    Ok(Fragment::raw(escape_literal(&text)))
}

/// Expand an ordered key→value mapping into `("c1","c2") VALUES ($1,$2)`,
/// columns identifier-quoted, values parameterized in mapping order.
pub fn insert_object(pairs: &[(String, SqlValue)]) -> SqlResult<Fragment> {
    if pairs.is_empty() {
        return Err(SqlError::invalid_argument(
            "insert_object needs at least one column",
        ));
    }

    let mut head = String::from("(");
    for (i, (column, value)) in pairs.iter().enumerate() {
        if value.is_absent() {
            return Err(SqlError::invalid_argument(format!(
                "insert_object column \"{column}\" has an absent value; use SqlValue::Null",
            )));
        }
        if i > 0 {
            head.push(',');
        }
        head.push_str(&escape_identifier(column));
    }
    head.push_str(") VALUES (");

    let mut parts = Vec::with_capacity(pairs.len() + 1);
    parts.push(head);
    for _ in 1..pairs.len() {
        parts.push(",".to_string());
    }
    parts.push(")".to_string());

    let values = pairs.iter().map(|(_, v)| v.clone()).collect();
    Ok(Fragment::from_parts(parts, values))
}
