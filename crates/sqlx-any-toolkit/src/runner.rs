use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row as _};
use sqlx_any_conn_mgr::{Database, Dialect, Session};
use tracing::{debug, error, warn};

use crate::Error;
use crate::placeholders::{
   StatementKind, has_returning_clause, translate_placeholders_with_nulls,
};

/// Named query parameters, keyed by the names used in `%(name)s` placeholders
pub type Params = IndexMap<String, JsonValue>;

/// One decoded result row, in column order
pub type Row = IndexMap<String, JsonValue>;

/// Result of [`QueryRunner::run_query`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
   /// The statement was a read; possibly empty
   Rows(Vec<Row>),
   /// The statement was a write and produces no rows
   NoRows,
}

impl QueryOutcome {
   /// Rows of a read, or `None` for a write.
   pub fn rows(&self) -> Option<&[Row]> {
      match self {
         Self::Rows(rows) => Some(rows),
         Self::NoRows => None,
      }
   }

   pub fn into_rows(self) -> Option<Vec<Row>> {
      match self {
         Self::Rows(rows) => Some(rows),
         Self::NoRows => None,
      }
   }
}

/// Statement with its placeholders rewritten and values ordered for binding
#[derive(Debug, Clone)]
pub struct PreparedStatement {
   sql: String,
   values: Vec<JsonValue>,
}

impl PreparedStatement {
   /// Translate `query` for `dialect` and pick its values out of `params`.
   ///
   /// Fails with [`Error::MissingParameter`] if a placeholder names a key that is
   /// not in `params`. Extra keys are ignored. Null values are written into the
   /// SQL as `NULL` rather than bound.
   pub fn new(query: &str, params: &Params, dialect: Dialect) -> Result<Self, Error> {
      let (sql, names) = translate_placeholders_with_nulls(query, dialect, |name| {
         params.get(name).is_some_and(JsonValue::is_null)
      });
      let values = names
         .into_iter()
         .map(|name| params.get(&name).cloned().ok_or(Error::MissingParameter(name)))
         .collect::<Result<Vec<_>, _>>()?;

      Ok(Self { sql, values })
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   /// Build a bound query borrowing this statement's SQL.
   pub fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
      let mut query = sqlx::query(&self.sql);
      for value in &self.values {
         query = bind_value(query, value.clone());
      }
      query
   }
}

/// Runs parameterised statements against a shared [`Database`].
///
/// Every call draws its own session. Reads and writes are committed on success
/// and rolled back on failure.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use sqlx_any_conn_mgr::Database;
/// use sqlx_any_toolkit::{Params, QueryOutcome, QueryRunner};
///
/// # async fn example() -> Result<(), sqlx_any_toolkit::Error> {
/// let db = Database::connect_url("sqlite://app.db?mode=rwc", None).await?;
/// let runner = QueryRunner::new(Arc::new(db));
///
/// let mut params = Params::new();
/// params.insert("name".into(), json!("Alice"));
///
/// let id = runner
///    .run_insert_query_with_id("INSERT INTO users (name) VALUES (%(name)s)", &params)
///    .await?;
///
/// let outcome = runner
///    .run_query("SELECT * FROM users WHERE name = %(name)s", &params)
///    .await?;
/// if let QueryOutcome::Rows(rows) = outcome {
///    println!("{} row(s), first id {:?}", rows.len(), id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueryRunner {
   db: Arc<Database>,
}

impl QueryRunner {
   pub fn new(db: Arc<Database>) -> Self {
      Self { db }
   }

   pub fn database(&self) -> &Arc<Database> {
      &self.db
   }

   /// Run one statement in its own committed session.
   ///
   /// Statements starting with `SELECT`, `WITH` or `RETURNING` return
   /// [`QueryOutcome::Rows`]; everything else returns [`QueryOutcome::NoRows`].
   pub async fn run_query(&self, query: &str, params: &Params) -> Result<QueryOutcome, Error> {
      let kind = StatementKind::classify(query);
      let prepared = self.prepare(query, params)?;

      let result: Result<QueryOutcome, Error> = self
         .db
         .with_session(async |session| match kind {
            StatementKind::Read => {
               let rows = session.fetch_all(prepared.query()).await?;
               Ok(QueryOutcome::Rows(decode_rows(rows)?))
            }
            StatementKind::Write => {
               let result = session.execute(prepared.query()).await?;
               debug!("{} row(s) affected", result.rows_affected());
               Ok(QueryOutcome::NoRows)
            }
         })
         .await;

      result.inspect_err(|e| error!("Query failed: {}: {}", query, e))
   }

   /// Run an INSERT and return the id of the row it created.
   ///
   /// A statement with a `RETURNING` clause reports the first column of its first
   /// row. Otherwise the engine's last generated id is read on the same connection
   /// before and after the insert, and only an id the insert itself produced is
   /// returned. Returns `None` when the statement affected no rows, or created a
   /// row without generating an id.
   pub async fn run_insert_query_with_id(
      &self,
      query: &str,
      params: &Params,
   ) -> Result<Option<i64>, Error> {
      let prepared = self.prepare(query, params)?;
      let returning = has_returning_clause(query);

      let result: Result<Option<i64>, Error> = self
         .db
         .with_session(async |session| {
            if returning {
               let rows = session.fetch_all(prepared.query()).await?;
               let Some(row) = rows.first() else {
                  return Ok(None);
               };
               return match row.try_get::<i64, _>(0) {
                  Ok(id) => Ok(Some(id)),
                  Err(e) => {
                     warn!("RETURNING value is not an integer id: {}", e);
                     Ok(None)
                  }
               };
            }

            let before = last_generated_id(session).await?;
            let result = session.execute(prepared.query()).await?;
            if result.rows_affected() == 0 {
               return Ok(None);
            }
            let after = last_generated_id(session).await?;
            Ok(after.filter(|id| Some(*id) != before))
         })
         .await;

      result.inspect_err(|e| error!("Insert failed: {}: {}", query, e))
   }

   /// Run several statements, in order, in one transaction.
   ///
   /// Every statement is bound from the same `params`. Either all of them are
   /// committed or none are; the error that stopped the batch is returned after
   /// rollback.
   pub async fn execute_in_transaction(
      &self,
      queries: &[&str],
      params: &Params,
   ) -> Result<bool, Error> {
      let prepared = queries
         .iter()
         .map(|query| self.prepare(query, params))
         .collect::<Result<Vec<_>, _>>()?;

      let result = self
         .db
         .with_session(async |session| {
            for (index, statement) in prepared.iter().enumerate() {
               session
                  .execute(statement.query())
                  .await
                  .inspect_err(|e| {
                     error!("Statement {} failed: {}: {}", index, queries[index], e)
                  })?;
            }
            Ok::<_, Error>(true)
         })
         .await;

      if result.is_ok() {
         debug!("Committed {} statement(s)", queries.len());
      }
      result
   }

   fn prepare(&self, query: &str, params: &Params) -> Result<PreparedStatement, Error> {
      PreparedStatement::new(query, params, self.db.dialect())
         .inspect_err(|e| error!("Query failed: {}: {}", query, e))
   }
}

/// Most recent id generated on the session's connection, if any.
///
/// On Postgres `lastval()` fails until the connection has drawn from a sequence.
/// The lookup runs under a savepoint so that failure leaves the transaction usable.
async fn last_generated_id(session: &mut Session) -> Result<Option<i64>, Error> {
   let dialect = session.dialect();
   let lookup = sqlx::query(dialect.last_insert_id_query());

   if dialect == Dialect::Sqlite {
      let row = session.fetch_optional(lookup).await?;
      return Ok(row.map(|row| row.try_get::<i64, _>("id")).transpose()?);
   }

   session.execute(sqlx::query("SAVEPOINT last_insert_id")).await?;
   match session.fetch_optional(lookup).await {
      Ok(row) => {
         session
            .execute(sqlx::query("RELEASE SAVEPOINT last_insert_id"))
            .await?;
         Ok(row.map(|row| row.try_get::<i64, _>("id")).transpose()?)
      }
      Err(sqlx_any_conn_mgr::Error::Sqlx(e)) => {
         debug!("No id generated on this connection yet: {}", e);
         session
            .execute(sqlx::query("ROLLBACK TO SAVEPOINT last_insert_id"))
            .await?;
         Ok(None)
      }
      Err(e) => Err(e.into()),
   }
}

/// Decode rows into column-ordered JSON maps.
pub fn decode_rows(rows: Vec<AnyRow>) -> Result<Vec<Row>, Error> {
   let mut results = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = IndexMap::default();
      for (i, column) in row.columns().iter().enumerate() {
         let v = row.try_get_raw(i)?;
         let v = crate::decode::to_json(v)?;
         value.insert(column.name().to_string(), v);
      }
      results.push(value);
   }
   Ok(results)
}

/// Bind a JSON value to an `Any` query.
///
/// Scalars bind as their native type. Arrays and objects bind as their JSON text.
/// Null binds as a text-typed NULL, which Postgres only accepts for text columns;
/// [`PreparedStatement`] inlines nulls instead of calling this.
pub fn bind_value<'a>(
   query: Query<'a, Any, AnyArguments<'a>>,
   value: JsonValue,
) -> Query<'a, Any, AnyArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Too large for i64 (as_i64 failed), fall back to f64
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      JsonValue::String(s) => query.bind(s),
      other @ (JsonValue::Array(_) | JsonValue::Object(_)) => query.bind(other.to_string()),
   }
}
