//! Named transform registry.
//!
//! A transform is a named function applied to a substitution value during a
//! fragment build, selected with a `$name` suffix on the template segment
//! before the value. Every transform returns a [`Fragment`], which the
//! builder splices in place of the value.
//!
//! Names are normalized (trimmed, lowercased), so `$ID`, `$id` and `$ Id `
//! all hit the same binding. A name can be bound once; rebinding it to a
//! different function is a conflict, rebinding the same shared function is a
//! no-op.

use crate::error::{SqlError, SqlResult};
use crate::fragment::{self, Fragment};
use crate::value::SqlValue;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

/// A shared transform function.
pub type TransformFn = Arc<dyn Fn(SqlValue) -> SqlResult<Fragment> + Send + Sync>;

static DEFAULT_REGISTRY: LazyLock<TransformRegistry> = LazyLock::new(TransformRegistry::new);

/// The process-wide registry used by [`crate::sql`].
pub fn default_registry() -> &'static TransformRegistry {
    &DEFAULT_REGISTRY
}

/// A concurrent name→transform mapping.
pub struct TransformRegistry {
    map: RwLock<HashMap<String, TransformFn>>,
}

impl TransformRegistry {
    /// A registry pre-seeded with the built-in transforms:
    ///
    /// | names | behavior |
    /// |---|---|
    /// | `id`, `ident`, `identifier`, `name` | quote a nonempty string as an identifier |
    /// | `` (empty), `literal` | render the value as a SQL literal |
    /// | `!`, `raw` | inline a string verbatim |
    /// | `insert_object`, `insert` | expand a mapping to `("c1","c2") VALUES ($1,$2)` |
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.seed_builtins();
        registry
    }

    /// A registry with no transforms at all.
    pub fn empty() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    fn seed_builtins(&self) {
        // a fresh registry has no bindings, so these cannot conflict
        let _ = self.register(&["id", "ident", "identifier", "name"], builtin_identifier);
        let _ = self.register(&["", "literal"], builtin_literal);
        let _ = self.register(&["!", "raw"], builtin_raw);
        let _ = self.register(&["insert_object", "insert"], builtin_insert_object);
    }

    /// Bind a transform function under one or more alias names.
    pub fn register<F>(&self, names: &[&str], transform: F) -> SqlResult<()>
    where
        F: Fn(SqlValue) -> SqlResult<Fragment> + Send + Sync + 'static,
    {
        self.register_shared(names, Arc::new(transform))
    }

    /// Bind an already-shared transform function under one or more names.
    ///
    /// Fails with [`SqlError::Conflict`] if any name is already bound to a
    /// different function; re-registering the same `Arc` is idempotent.
    /// Nothing is bound unless every name is accepted.
    pub fn register_shared(&self, names: &[&str], transform: TransformFn) -> SqlResult<()> {
        if names.is_empty() {
            return Err(SqlError::invalid_argument(
                "at least one transform name is required",
            ));
        }
        let keys: Vec<String> = names.iter().map(|n| normalize(n)).collect();

        let mut map = self.map.write().expect("transform registry poisoned");
        for key in &keys {
            if let Some(existing) = map.get(key) {
                if !Arc::ptr_eq(existing, &transform) {
                    return Err(SqlError::Conflict(key.clone()));
                }
            }
        }
        for key in keys {
            map.entry(key).or_insert_with(|| Arc::clone(&transform));
        }
        Ok(())
    }

    /// Apply the named transform to a value.
    pub fn apply(&self, name: &str, value: SqlValue) -> SqlResult<Fragment> {
        let key = normalize(name);
        let transform = {
            let map = self.map.read().expect("transform registry poisoned");
            map.get(&key).cloned()
        };
        match transform {
            Some(f) => f(value),
            None => Err(SqlError::UnknownTransform(key)),
        }
    }

    /// Whether a name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.map
            .read()
            .expect("transform registry poisoned")
            .contains_key(&normalize(name))
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn builtin_identifier(value: SqlValue) -> SqlResult<Fragment> {
    match value {
        SqlValue::Text(s) if !s.is_empty() => fragment::identifier(&s),
        other => Err(SqlError::invalid_argument(format!(
            "identifier transform expects a nonempty string, got {other:?}",
        ))),
    }
}

fn builtin_literal(value: SqlValue) -> SqlResult<Fragment> {
    fragment::literal(&value)
}

fn builtin_raw(value: SqlValue) -> SqlResult<Fragment> {
    match value {
        SqlValue::Text(s) => Ok(fragment::raw_sql(s)),
        other => Err(SqlError::invalid_argument(format!(
            "raw transform expects a string, got {other:?}",
        ))),
    }
}

fn builtin_insert_object(value: SqlValue) -> SqlResult<Fragment> {
    match value {
        SqlValue::Object(pairs) => fragment::insert_object(&pairs),
        other => Err(SqlError::invalid_argument(format!(
            "insert_object transform expects an ordered mapping, got {other:?}",
        ))),
    }
}
