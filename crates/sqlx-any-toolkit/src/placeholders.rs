//! Named placeholder translation and statement classification

use std::sync::LazyLock;

use regex::{Captures, Regex};
use sqlx_any_conn_mgr::Dialect;

static NAMED_PLACEHOLDER: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"%\((\w+)\)s").expect("placeholder pattern is valid"));

static RETURNING_CLAUSE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("returning pattern is valid"));

/// Rewrite `%(name)s` placeholders into the engine's positional syntax.
///
/// Each distinct name gets the 1-based position of its first appearance, and
/// repeated names reuse that position. Returns the rewritten SQL together with the
/// names in position order. Text that does not match `%(word)s` is left untouched.
///
/// ```
/// use sqlx_any_conn_mgr::Dialect;
/// use sqlx_any_toolkit::translate_placeholders;
///
/// let (sql, names) = translate_placeholders(
///    "SELECT * FROM t WHERE a = %(a)s OR b = %(b)s OR c = %(a)s",
///    Dialect::Postgres,
/// );
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 OR b = $2 OR c = $1");
/// assert_eq!(names, vec!["a", "b"]);
/// ```
pub fn translate_placeholders(query: &str, dialect: Dialect) -> (String, Vec<String>) {
   translate_placeholders_with_nulls(query, dialect, |_| false)
}

/// Like [`translate_placeholders`], but names for which `is_null` holds are written
/// as the literal `NULL` and take no position.
///
/// A bound NULL carries a parameter type, and Postgres rejects a text-typed NULL
/// for a column of another type. The bare literal takes the column's type.
///
/// ```
/// use sqlx_any_conn_mgr::Dialect;
/// use sqlx_any_toolkit::placeholders::translate_placeholders_with_nulls;
///
/// let (sql, names) = translate_placeholders_with_nulls(
///    "INSERT INTO t (a, b) VALUES (%(a)s, %(b)s)",
///    Dialect::Postgres,
///    |name| name == "a",
/// );
/// assert_eq!(sql, "INSERT INTO t (a, b) VALUES (NULL, $1)");
/// assert_eq!(names, vec!["b"]);
/// ```
pub fn translate_placeholders_with_nulls(
   query: &str,
   dialect: Dialect,
   is_null: impl Fn(&str) -> bool,
) -> (String, Vec<String>) {
   let mut names: Vec<String> = Vec::new();
   let sql = NAMED_PLACEHOLDER.replace_all(query, |caps: &Captures| {
      let name = &caps[1];
      if is_null(name) {
         return "NULL".to_string();
      }
      let position = match names.iter().position(|n| n == name) {
         Some(existing) => existing + 1,
         None => {
            names.push(name.to_string());
            names.len()
         }
      };
      dialect.placeholder(position)
   });

   (sql.into_owned(), names)
}

/// True when the statement has a `RETURNING` clause, in any case.
pub fn has_returning_clause(query: &str) -> bool {
   RETURNING_CLAUSE.is_match(query)
}

/// Whether a statement produces rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
   Read,
   Write,
}

impl StatementKind {
   /// Classify by the leading keyword of the trimmed statement.
   ///
   /// Only upper-case `SELECT`, `WITH` and `RETURNING` count as reads.
   pub fn classify(query: &str) -> Self {
      let query = query.trim();
      if ["SELECT", "WITH", "RETURNING"]
         .iter()
         .any(|keyword| query.starts_with(keyword))
      {
         Self::Read
      } else {
         Self::Write
      }
   }
}
