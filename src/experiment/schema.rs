//! SQLite table definitions for run records.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS`; an existing table is
//! accepted only if its columns, declared types and primary key match.

use rusqlite::Connection;

use crate::{Error, Result};

/// The two record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `RunSummary` table.
    Summary,
    /// `RunDetail` table.
    Detail,
}

const SUMMARY_COLUMNS: &[(&str, &str)] = &[
    ("run_id", "INTEGER"),
    ("model_name", "TEXT"),
    ("model_type", "TEXT"),
    ("started_at", "TEXT"),
    ("finished_at", "TEXT"),
];

const DETAIL_COLUMNS: &[(&str, &str)] = &[
    ("run_id", "INTEGER"),
    ("model_name", "TEXT"),
    ("model_type", "TEXT"),
    ("started_at", "TEXT"),
    ("finished_at", "TEXT"),
    ("best_params", "BLOB"),
    ("all_params", "BLOB"),
    ("test_scores", "BLOB"),
    ("train_scores", "BLOB"),
    ("fit_time_secs", "BLOB"),
    ("score_time_secs", "BLOB"),
    ("best_model", "BLOB"),
];

impl RecordKind {
    /// Both kinds, in definition order.
    pub const ALL: [Self; 2] = [Self::Summary, Self::Detail];

    /// Table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Summary => "RunSummary",
            Self::Detail => "RunDetail",
        }
    }

    /// Column names with declared types, primary key first.
    #[must_use]
    pub const fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Summary => SUMMARY_COLUMNS,
            Self::Detail => DETAIL_COLUMNS,
        }
    }

    /// Comma-separated column list.
    #[must_use]
    pub fn column_list(self) -> String {
        self.columns().iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
    }

    /// `CREATE TABLE IF NOT EXISTS` statement.
    #[must_use]
    pub fn create_sql(self) -> String {
        let columns = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                if i == 0 {
                    format!("    {name} {ty} PRIMARY KEY")
                } else {
                    format!("    {name} {ty} NOT NULL")
                }
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{columns}\n)", self.table_name())
    }

    /// Parameterized insert statement covering every column.
    #[must_use]
    pub fn insert_sql(self) -> String {
        let placeholders = (1..=self.columns().len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.table_name(),
            self.column_list()
        )
    }
}

/// Whether the table for `kind` exists.
pub(crate) fn table_exists(conn: &Connection, kind: RecordKind) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [kind.table_name()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Create the table for `kind` if absent, then verify its shape.
pub(crate) fn define(conn: &Connection, kind: RecordKind) -> Result<()> {
    conn.execute_batch(&kind.create_sql())?;
    verify(conn, kind)
}

/// Compare the live table definition against the expected columns.
fn verify(conn: &Connection, kind: RecordKind) -> Result<()> {
    let table = kind.table_name();
    let mut stmt = conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let actual = stmt
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let expected = kind.columns();
    if actual.len() != expected.len() {
        return Err(Error::Schema {
            table: table.to_string(),
            reason: format!("expected {} columns, found {}", expected.len(), actual.len()),
        });
    }

    for (i, ((name, ty, pk), (want_name, want_ty))) in actual.iter().zip(expected).enumerate() {
        if name != want_name || !ty.eq_ignore_ascii_case(want_ty) {
            return Err(Error::Schema {
                table: table.to_string(),
                reason: format!("column {i} is `{name} {ty}`, expected `{want_name} {want_ty}`"),
            });
        }
        let want_pk = i64::from(i == 0);
        if *pk != want_pk {
            return Err(Error::Schema {
                table: table.to_string(),
                reason: format!("primary key mismatch on column `{name}`"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sql_shape() {
        let sql = RecordKind::Summary.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS RunSummary"));
        assert!(sql.contains("run_id INTEGER PRIMARY KEY"));
        assert!(sql.contains("finished_at TEXT NOT NULL"));
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let sql = RecordKind::Detail.insert_sql();
        assert!(sql.starts_with("INSERT INTO RunDetail (run_id, model_name"));
        assert!(sql.ends_with("?12)"));
    }

    #[test]
    fn test_define_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        define(&conn, RecordKind::Detail).unwrap();
        define(&conn, RecordKind::Detail).unwrap();
        assert!(table_exists(&conn, RecordKind::Detail).unwrap());
        assert!(!table_exists(&conn, RecordKind::Summary).unwrap());
    }

    #[test]
    fn test_conflicting_table_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE RunSummary (run_id TEXT PRIMARY KEY, note TEXT)")
            .unwrap();
        let err = define(&conn, RecordKind::Summary).unwrap_err();
        assert!(matches!(err, Error::Schema { ref table, .. } if table == "RunSummary"));
    }

    #[test]
    fn test_wrong_column_type_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE RunSummary (run_id INTEGER PRIMARY KEY, model_name TEXT, \
             model_type TEXT, started_at INTEGER, finished_at TEXT)",
        )
        .unwrap();
        let err = define(&conn, RecordKind::Summary).unwrap_err();
        assert!(matches!(err, Error::Schema { reason, .. } if reason.contains("started_at")));
    }
}
