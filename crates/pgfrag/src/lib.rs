//! Composable parameter-safe SQL fragments and a serial-access query client
//! for PostgreSQL.
//!
//! The crate has two halves:
//!
//! - **Fragments** ([`sql`], [`Fragment`]): build SQL from templates of
//!   literal segments and substitution values. Values become `$n`
//!   placeholders, nested fragments are spliced with their parameters
//!   renumbered, and `$name` tokens apply registered transforms such as
//!   identifier quoting or literal inlining. Malformed input fails at build
//!   time; nothing partial ever reaches a connection.
//! - **Clients** ([`QueryClient`], [`with_client`], [`with_transaction`]):
//!   execute fragments on a tokio-postgres connection with strictly serial
//!   access, explicit transaction bracketing, and one-row/one-value
//!   accessors. With the `pool` feature (default), [`pool`] adds deadpool
//!   acquisition and one-shot helpers.
//!
//! ```ignore
//! use pgfrag::{pool, sql};
//!
//! let db = pool::create_pool("postgres://app@localhost/app")?;
//! let login = pool::value(
//!     &db,
//!     &sql(&["select login from users where id = ", ""], vec![42.into()])?,
//! )
//! .await?;
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod escape;
pub mod fragment;
#[cfg(feature = "pool")]
pub mod pool;
pub mod row;
pub mod transform;
pub mod value;

pub use client::{QueryClient, Statement, with_client, with_transaction};
pub use connection::Connection;
pub use error::{SqlError, SqlResult};
pub use escape::{escape_identifier, escape_literal};
pub use fragment::{Fragment, identifier, insert_object, literal, raw_sql, sql};
pub use row::{ResultSet, Row, RowShape};
pub use transform::{TransformFn, TransformRegistry, default_registry};
pub use value::{SqlConvert, SqlRendering, SqlValue};

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, create_pool_with_tls};
