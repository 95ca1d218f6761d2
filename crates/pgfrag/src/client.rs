//! Serial-access query client.
//!
//! [`QueryClient`] wraps one [`Connection`] and enforces strictly serial use:
//! one statement in flight at a time, explicit transaction bracketing, and a
//! hard stop once the client is finalized. Violations come back as
//! [`SqlError::SerialAccess`] or [`SqlError::ClientReleased`] on the spot
//! instead of as silent interleaving on a shared session.

use crate::connection::Connection;
use crate::error::{SqlError, SqlResult};
use crate::fragment::Fragment;
use crate::row::{ResultSet, Row, RowShape};
use crate::value::SqlValue;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, warn};

/// One executable statement: SQL text, bound parameters, and the shape rows
/// should come back in.
#[derive(Debug, Clone)]
pub struct Statement {
    text: String,
    values: Vec<SqlValue>,
    shape: RowShape,
}

impl Statement {
    pub fn new(text: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            text: text.into(),
            values,
            shape: RowShape::default(),
        }
    }

    pub fn with_shape(mut self, shape: RowShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<Fragment> for Statement {
    fn from(frag: Fragment) -> Self {
        let (text, values) = frag.into_text_values();
        Self::new(text, values)
    }
}

impl From<&Fragment> for Statement {
    fn from(frag: &Fragment) -> Self {
        Self::new(frag.text(), frag.values().to_vec())
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text, Vec::new())
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text, Vec::new())
    }
}

impl<S: Into<String>> From<(S, Vec<SqlValue>)> for Statement {
    fn from((text, values): (S, Vec<SqlValue>)) -> Self {
        Self::new(text, values)
    }
}

const IDLE: u8 = 0;
const IN_FLIGHT: u8 = 1;
const RELEASED: u8 = 2;

/// A serial-access wrapper around one connection.
///
/// All methods take `&self`; the serial discipline is enforced at runtime so
/// that a forgotten `.await` surfaces as an explicit error rather than two
/// statements racing on one session.
pub struct QueryClient<C: Connection> {
    conn: C,
    state: AtomicU8,
    in_transaction: AtomicBool,
}

impl<C: Connection> QueryClient<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            state: AtomicU8::new(IDLE),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Give the wrapped connection back, discarding the client.
    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == RELEASED
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    fn begin_statement(&self) -> SqlResult<()> {
        match self
            .state
            .compare_exchange(IDLE, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(RELEASED) => Err(SqlError::ClientReleased),
            Err(_) => Err(SqlError::serial_access(
                "statement issued while another is in flight; missing .await?",
            )),
        }
    }

    fn end_statement(&self) {
        // only an in-flight statement transitions back; finalize cannot have
        // run concurrently because it refuses the IN_FLIGHT state
        let _ = self
            .state
            .compare_exchange(IN_FLIGHT, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Execute one statement and return the full result set.
    pub async fn execute(&self, statement: impl Into<Statement>) -> SqlResult<ResultSet> {
        let statement: Statement = statement.into();
        self.begin_statement()?;
        debug!(sql = %statement.text, params = statement.values.len(), "executing statement");
        let result = self
            .conn
            .run(&statement.text, &statement.values, statement.shape)
            .await;
        self.end_statement();
        match &result {
            Ok(set) => debug!(rows = set.row_count, "statement completed"),
            Err(err) => debug!(error = %err, sql = %statement.text, "statement failed"),
        }
        result
    }

    /// Execute and return the rows only.
    pub async fn rows(&self, statement: impl Into<Statement>) -> SqlResult<Vec<Row>> {
        Ok(self.execute(statement).await?.rows)
    }

    /// Execute and return exactly one row.
    pub async fn row(&self, statement: impl Into<Statement>) -> SqlResult<Row> {
        let set = self.execute(statement).await?;
        if set.rows.len() != 1 {
            return Err(SqlError::cardinality("row", set.rows.len()));
        }
        Ok(set.rows.into_iter().next().expect("len == 1"))
    }

    /// Execute and return the single value of a single-row, single-column
    /// result.
    pub async fn value(&self, statement: impl Into<Statement>) -> SqlResult<SqlValue> {
        let statement: Statement = statement.into();
        let row = self.row(statement.with_shape(RowShape::Array)).await?;
        let mut values = row.into_values();
        if values.len() != 1 {
            return Err(SqlError::cardinality("column", values.len()));
        }
        Ok(values.pop().expect("len == 1"))
    }

    /// Open a transaction. The open flag is only set once `BEGIN` succeeds.
    pub async fn start_transaction(&self) -> SqlResult<()> {
        if self.in_transaction() {
            return Err(SqlError::serial_access(
                "transaction already started on this client",
            ));
        }
        self.execute("BEGIN").await?;
        self.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    /// Commit the open transaction. Fails if none is open. The open flag is
    /// cleared even when `COMMIT` itself fails; the session is no longer in
    /// a usable transaction either way.
    pub async fn commit(&self) -> SqlResult<()> {
        if !self.in_transaction() {
            return Err(SqlError::serial_access("commit without a started transaction"));
        }
        let result = self.execute("COMMIT").await;
        self.in_transaction.store(false, Ordering::Release);
        result.map(|_| ())
    }

    /// Roll back. Permissive by design: this is the cleanup path, so it
    /// bypasses the in-flight guard and does not require an open transaction.
    pub async fn rollback(&self) -> SqlResult<()> {
        if self.is_released() {
            return Err(SqlError::ClientReleased);
        }
        self.in_transaction.store(false, Ordering::Release);
        debug!("rolling back");
        self.conn.run("ROLLBACK", &[], RowShape::Record).await?;
        Ok(())
    }

    /// Release the client. Every later operation fails with
    /// [`SqlError::ClientReleased`].
    ///
    /// Finalizing with a transaction still open is a caller bug: the
    /// transaction is rolled back (best effort) and
    /// [`SqlError::UnclosedTransaction`] is returned. Finalizing while a
    /// statement is in flight is a serial-access violation and does not
    /// release the client.
    pub async fn finalize(&self) -> SqlResult<()> {
        match self
            .state
            .compare_exchange(IDLE, RELEASED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                if self.in_transaction.swap(false, Ordering::AcqRel) {
                    if let Err(err) = self.conn.run("ROLLBACK", &[], RowShape::Record).await {
                        warn!(error = %err, "automatic rollback during finalize failed");
                    }
                    Err(SqlError::UnclosedTransaction)
                } else {
                    Ok(())
                }
            }
            Err(IN_FLIGHT) => Err(SqlError::serial_access(
                "finalize while a statement is in flight; missing .await?",
            )),
            Err(_) => Err(SqlError::ClientReleased),
        }
    }

    /// Run a unit of work against this client, then finalize. The unit's
    /// error wins over a finalize error.
    pub async fn scope<T, F>(&self, unit: F) -> SqlResult<T>
    where
        F: AsyncFnOnce(&Self) -> SqlResult<T>,
    {
        match unit(self).await {
            Ok(value) => self.finalize().await.map(|()| value),
            Err(err) => {
                let _ = self.finalize().await;
                Err(err)
            }
        }
    }

    /// Run a unit of work inside a transaction, then finalize.
    ///
    /// Commits on success; on failure rolls back (a rollback failure is
    /// logged, the unit's error is re-raised).
    pub async fn transaction_scope<T, F>(&self, unit: F) -> SqlResult<T>
    where
        F: AsyncFnOnce(&Self) -> SqlResult<T>,
    {
        self.scope(async |client| {
            client.start_transaction().await?;
            match unit(client).await {
                Ok(value) => {
                    client.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = client.rollback().await {
                        warn!(error = %rollback_err, "rollback after failed unit of work also failed");
                    }
                    Err(err)
                }
            }
        })
        .await
    }
}

/// Wrap a connection in a [`QueryClient`], run a unit of work, and finalize.
pub async fn with_client<C, T, F>(conn: C, unit: F) -> SqlResult<T>
where
    C: Connection,
    F: AsyncFnOnce(&QueryClient<C>) -> SqlResult<T>,
{
    let client = QueryClient::new(conn);
    client.scope(unit).await
}

/// Like [`with_client`], with the unit of work bracketed in a transaction.
pub async fn with_transaction<C, T, F>(conn: C, unit: F) -> SqlResult<T>
where
    C: Connection,
    F: AsyncFnOnce(&QueryClient<C>) -> SqlResult<T>,
{
    let client = QueryClient::new(conn);
    client.transaction_scope(unit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Scripted connection: the statement text selects the canned response.
    #[derive(Clone, Default)]
    struct MockConnection {
        log: Arc<Mutex<Vec<String>>>,
        gate: Arc<Notify>,
    }

    impl MockConnection {
        fn new() -> Self {
            Self::default()
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().expect("mock log").clone()
        }
    }

    impl Connection for MockConnection {
        async fn run(
            &self,
            sql: &str,
            _params: &[SqlValue],
            shape: RowShape,
        ) -> SqlResult<ResultSet> {
            self.log.lock().expect("mock log").push(sql.to_string());
            let shaped = |columns: Vec<(&str, SqlValue)>| match shape {
                RowShape::Array => Row::Array(columns.into_iter().map(|(_, v)| v).collect()),
                RowShape::Record => Row::Record(
                    columns
                        .into_iter()
                        .map(|(name, v)| (name.to_string(), v))
                        .collect(),
                ),
            };
            match sql {
                "ROW" => Ok(ResultSet {
                    row_count: 1,
                    rows: vec![shaped(vec![("id", 1.into()), ("val", "a".into())])],
                }),
                "ROWS" => Ok(ResultSet {
                    row_count: 2,
                    rows: vec![
                        shaped(vec![("id", 1.into())]),
                        shaped(vec![("id", 2.into())]),
                    ],
                }),
                "NONE" => Ok(ResultSet::default()),
                "VALUE" => Ok(ResultSet {
                    row_count: 1,
                    rows: vec![shaped(vec![("value", "value".into())])],
                }),
                "WAIT" => {
                    self.gate.notified().await;
                    Ok(ResultSet::default())
                }
                "INVALID" => Err(SqlError::Connection("invalid statement".to_string())),
                _ => Ok(ResultSet::default()),
            }
        }
    }

    #[tokio::test]
    async fn rows_returns_all_rows() {
        let client = QueryClient::new(MockConnection::new());
        let rows = client.rows("ROWS").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(1)));
    }

    #[tokio::test]
    async fn row_requires_exactly_one_row() {
        let client = QueryClient::new(MockConnection::new());
        let row = client.row("ROW").await.unwrap();
        assert_eq!(row.get("val"), Some(&SqlValue::Text("a".to_string())));

        assert!(client.row("ROWS").await.unwrap_err().is_cardinality());
        assert!(client.row("NONE").await.unwrap_err().is_cardinality());
    }

    #[tokio::test]
    async fn value_requires_one_row_one_column() {
        let client = QueryClient::new(MockConnection::new());
        let value = client.value("VALUE").await.unwrap();
        assert_eq!(value, SqlValue::Text("value".to_string()));

        // single row, two columns
        assert!(client.value("ROW").await.unwrap_err().is_cardinality());
    }

    #[tokio::test]
    async fn overlapping_statements_are_rejected() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());

        let first = client.execute("WAIT");
        let mut first = std::pin::pin!(first);
        assert!(futures_util::poll!(first.as_mut()).is_pending());

        let err = client.execute("ROW").await.unwrap_err();
        assert!(err.is_serial_access());

        mock.gate.notify_one();
        first.as_mut().await.unwrap();

        // sequential use is fine again
        client.execute("ROW").await.unwrap();
        assert_eq!(mock.log(), vec!["WAIT", "ROW"]);
    }

    #[tokio::test]
    async fn failed_statement_frees_the_client() {
        let client = QueryClient::new(MockConnection::new());
        assert!(client.execute("INVALID").await.is_err());
        client.execute("ROW").await.unwrap();
    }

    #[tokio::test]
    async fn finalize_makes_release_permanent() {
        let client = QueryClient::new(MockConnection::new());
        client.finalize().await.unwrap();

        assert!(client.is_released());
        assert!(client.execute("ROW").await.unwrap_err().is_client_released());
        assert!(client.finalize().await.unwrap_err().is_client_released());
    }

    #[tokio::test]
    async fn finalize_rolls_back_unclosed_transaction() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());
        client.start_transaction().await.unwrap();

        let err = client.finalize().await.unwrap_err();
        assert!(matches!(err, SqlError::UnclosedTransaction));
        assert_eq!(mock.log(), vec!["BEGIN", "ROLLBACK"]);

        // the failed finalize still released the client
        assert!(client.execute("ROW").await.unwrap_err().is_client_released());
    }

    #[tokio::test]
    async fn transaction_brackets_statements() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());
        client.start_transaction().await.unwrap();
        assert!(client.in_transaction());
        client.execute("ROW").await.unwrap();
        client.commit().await.unwrap();
        assert!(!client.in_transaction());
        client.finalize().await.unwrap();
        assert_eq!(mock.log(), vec!["BEGIN", "ROW", "COMMIT"]);
    }

    #[tokio::test]
    async fn nested_transactions_are_rejected() {
        let client = QueryClient::new(MockConnection::new());
        client.start_transaction().await.unwrap();
        assert!(client.start_transaction().await.unwrap_err().is_serial_access());
    }

    #[tokio::test]
    async fn commit_without_transaction_fails_fast() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());
        assert!(client.commit().await.unwrap_err().is_serial_access());
        assert!(mock.log().is_empty());
    }

    #[tokio::test]
    async fn rollback_is_permissive() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());
        client.rollback().await.unwrap();
        assert_eq!(mock.log(), vec!["ROLLBACK"]);
    }

    #[tokio::test]
    async fn with_client_finalizes_after_the_unit() {
        let mock = MockConnection::new();
        let result = with_client(mock.clone(), async |q| q.value("VALUE").await).await;
        assert_eq!(result.unwrap(), SqlValue::Text("value".to_string()));
        assert_eq!(mock.log(), vec!["VALUE"]);
    }

    #[tokio::test]
    async fn with_client_reports_unclosed_transaction() {
        let mock = MockConnection::new();
        let err = with_client(mock.clone(), async |q| {
            q.start_transaction().await?;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SqlError::UnclosedTransaction));
        assert_eq!(mock.log(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success() {
        let mock = MockConnection::new();
        with_transaction(mock.clone(), async |q| {
            q.execute("ROW").await?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(mock.log(), vec!["BEGIN", "ROW", "COMMIT"]);
    }

    #[tokio::test]
    async fn with_transaction_rolls_back_on_failure() {
        let mock = MockConnection::new();
        let err = with_transaction(mock.clone(), async |q| {
            q.execute("INVALID").await?;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SqlError::Connection(_)));
        assert_eq!(mock.log(), vec!["BEGIN", "INVALID", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn fragments_execute_with_their_parameters() {
        let mock = MockConnection::new();
        let client = QueryClient::new(mock.clone());
        let frag = sql(&["SELECT ", " FROM t"], vec![1.into()]).unwrap();
        client.execute(&frag).await.unwrap();
        assert_eq!(mock.log(), vec!["SELECT $1 FROM t"]);
    }
}
