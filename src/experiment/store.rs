//! Metadata Store - SQLite storage for run records
//!
//! The store exclusively owns one connection for its whole lifetime. Rows
//! are append-only: there is no update or delete path, and a duplicate
//! `run_id` is rejected by the primary key.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use tracing::{debug, info};

use super::schema::{self, RecordKind};
use super::{ParamSet, RunDetail, RunId, RunSummary};
use crate::codec::{self, ModelArtifact};
use crate::{Error, Result};

/// Rows fetched per round trip by [`RecordCursor`].
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Where the store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Volatile database, lost when the store closes.
    InMemory,
    /// Durable database file.
    File(PathBuf),
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A record type with a table in the store.
pub trait StoredRecord: Sized {
    /// Table this record lives in.
    const KIND: RecordKind;

    /// Primary key.
    fn run_id(&self) -> RunId;

    /// Column values in [`RecordKind::columns`] order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if a blob column cannot be produced.
    fn to_values(&self) -> Result<Vec<Value>>;

    /// Rebuild the record from column values in [`RecordKind::columns`] order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if a column has the wrong type or a blob is invalid.
    fn from_values(values: Vec<Value>) -> Result<Self>;
}

/// SQLite-backed store for run summaries and details.
///
/// ## Example
///
/// ```rust
/// use runvault::experiment::{MetadataStore, RecordKind, RunId, RunSummary, StoreTarget};
/// use chrono::Utc;
///
/// let mut store = MetadataStore::open(StoreTarget::InMemory)?;
/// store.define_schema(RecordKind::Summary)?;
///
/// let now = Utc::now();
/// let summary = RunSummary::new(RunId::new(201_905_101_901), "RandomForestClassifier",
///     "runvault::ml::RandomForestClassifier", now, now)?;
/// store.insert(&summary)?;
///
/// let rows: Vec<RunSummary> = store.read_all::<RunSummary>().collect::<Result<_, _>>()?;
/// assert_eq!(rows, vec![summary]);
/// store.close()?;
/// # Ok::<(), runvault::Error>(())
/// ```
pub struct MetadataStore {
    conn: Connection,
    target: StoreTarget,
    defined: HashSet<RecordKind>,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("target", &self.target)
            .field("defined", &self.defined)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Open a store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the database cannot be opened or created.
    pub fn open(target: StoreTarget) -> Result<Self> {
        let conn = match &target {
            StoreTarget::InMemory => Connection::open_in_memory(),
            StoreTarget::File(path) => Connection::open(path),
        }
        .map_err(|e| Error::Connection(format!("{target}: {e}")))?;

        // Surface unwritable locations now rather than at the first insert.
        conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Connection(format!("{target}: {e}")))?;

        info!(location = %target, "opened metadata store");
        Ok(Self { conn, target, defined: HashSet::new() })
    }

    /// Open a file-backed store.
    ///
    /// # Errors
    ///
    /// See [`MetadataStore::open`].
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(StoreTarget::File(path.as_ref().to_path_buf()))
    }

    /// Backing location.
    #[must_use]
    pub const fn target(&self) -> &StoreTarget {
        &self.target
    }

    /// Whether the store is volatile.
    #[must_use]
    pub const fn is_in_memory(&self) -> bool {
        matches!(self.target, StoreTarget::InMemory)
    }

    /// Create the table for `kind` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if an existing table conflicts with the expected definition.
    pub fn define_schema(&mut self, kind: RecordKind) -> Result<()> {
        schema::define(&self.conn, kind)?;
        self.defined.insert(kind);
        debug!(table = kind.table_name(), "schema defined");
        Ok(())
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// - [`Error::Constraint`] if the `run_id` already exists (existing row unchanged)
    /// - [`Error::Serialization`] if a blob field cannot be produced
    /// - [`Error::Schema`] if the table has not been defined
    pub fn insert<R: StoredRecord>(&mut self, record: &R) -> Result<()> {
        let kind = R::KIND;
        let table = kind.table_name();
        if !self.defined.contains(&kind) {
            if schema::table_exists(&self.conn, kind)? {
                self.defined.insert(kind);
            } else {
                return Err(Error::Schema {
                    table: table.to_string(),
                    reason: "table not defined; call define_schema first".to_string(),
                });
            }
        }

        let run_id = record.run_id();
        let values = record.to_values()?;
        let result = self
            .conn
            .prepare_cached(&kind.insert_sql())
            .and_then(|mut stmt| stmt.execute(params_from_iter(values)));

        match result {
            Ok(_) => {
                info!(table, %run_id, "inserted run record");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(Error::Constraint { table: table.to_string(), run_id: run_id.get() })
            }
            Err(err) => Err(Error::Sqlite(err)),
        }
    }

    /// Lazily iterate every record of type `R` in `run_id` order.
    ///
    /// The cursor borrows the store, so it cannot outlive it; call
    /// [`RecordCursor::restart`] or `read_all` again to re-read.
    #[must_use]
    pub fn read_all<R: StoredRecord>(&self) -> RecordCursor<'_, R> {
        RecordCursor::new(&self.conn, DEFAULT_PAGE_SIZE)
    }

    /// Like [`MetadataStore::read_all`] with an explicit page size.
    #[must_use]
    pub fn read_all_paged<R: StoredRecord>(&self, page_size: usize) -> RecordCursor<'_, R> {
        RecordCursor::new(&self.conn, page_size.max(1))
    }

    /// Fetch a single record by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub fn get<R: StoredRecord>(&self, run_id: RunId) -> Result<Option<R>> {
        let kind = R::KIND;
        let sql = format!(
            "SELECT {} FROM {} WHERE run_id = ?1",
            kind.column_list(),
            kind.table_name()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query([run_id.get()])?;
        match rows.next()? {
            Some(row) => R::from_values(read_values(row, kind.columns().len())?).map(Some),
            None => Ok(None),
        }
    }

    /// Number of rows in the table for `R`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, or [`Error::Decode`]
    /// if SQLite reports a count that does not fit in `usize`.
    pub fn count<R: StoredRecord>(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::KIND.table_name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| Error::Decode(format!("{} reported row count {count}", R::KIND.table_name())))
    }

    /// Write a compacted copy of the whole database to `path`.
    ///
    /// `path` must not exist or must be an empty file.
    pub(crate) fn vacuum_into(&self, path: &Path) -> Result<()> {
        let path_str = path.to_str().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not valid UTF-8: {}", path.display()),
            ))
        })?;
        self.conn.execute("VACUUM INTO ?1", params![path_str])?;
        Ok(())
    }

    /// Release the connection, reporting any close failure.
    ///
    /// Dropping the store also releases the connection, but silently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if SQLite refuses to close.
    pub fn close(self) -> Result<()> {
        let target = self.target;
        self.conn
            .close()
            .map_err(|(_, e)| Error::Connection(format!("closing {target}: {e}")))?;
        debug!(location = %target, "closed metadata store");
        Ok(())
    }
}

fn read_values(row: &rusqlite::Row<'_>, columns: usize) -> Result<Vec<Value>> {
    (0..columns).map(|i| row.get::<_, Value>(i).map_err(Error::from)).collect()
}

/// Lazy, restartable iterator over the rows of one table.
///
/// Rows are fetched in pages keyed on `run_id`, so the cursor holds no open
/// statement between calls to `next`.
pub struct RecordCursor<'s, R> {
    conn: &'s Connection,
    page_size: usize,
    last_id: Option<i64>,
    buffer: VecDeque<Vec<Value>>,
    exhausted: bool,
    _record: PhantomData<R>,
}

impl<'s, R: StoredRecord> RecordCursor<'s, R> {
    fn new(conn: &'s Connection, page_size: usize) -> Self {
        Self {
            conn,
            page_size,
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
            _record: PhantomData,
        }
    }

    /// Rewind to the first row.
    pub fn restart(&mut self) {
        self.last_id = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fetch_page(&mut self) -> Result<()> {
        let kind = R::KIND;
        let columns = kind.columns().len();
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let filter = if self.last_id.is_some() { "WHERE run_id > ?1" } else { "WHERE ?1 IS NULL" };
        let sql = format!(
            "SELECT {} FROM {} {filter} ORDER BY run_id LIMIT ?2",
            kind.column_list(),
            kind.table_name()
        );

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![self.last_id, limit])?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let values = read_values(row, columns)?;
            if let Some(Value::Integer(id)) = values.first() {
                self.last_id = Some(*id);
            }
            self.buffer.push_back(values);
            fetched += 1;
        }
        if fetched < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl<R: StoredRecord> Iterator for RecordCursor<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(R::from_values)
    }
}

// ============================================================================
// Column conversions
// ============================================================================

fn format_timestamp(ts: DateTime<Utc>) -> Value {
    Value::Text(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn blob<T: codec::Blob>(value: &T) -> Result<Value> {
    codec::encode(value).map(Value::Blob)
}

/// Positional reader over a row's values.
struct Columns {
    kind: RecordKind,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl Columns {
    fn new(kind: RecordKind, values: Vec<Value>) -> Result<Self> {
        let expected = kind.columns().len();
        if values.len() != expected {
            return Err(Error::Decode(format!(
                "{} row has {} columns, expected {expected}",
                kind.table_name(),
                values.len()
            )));
        }
        Ok(Self { kind, values: values.into_iter(), index: 0 })
    }

    fn next_value(&mut self) -> (&'static str, Option<Value>) {
        let name = self.kind.columns().get(self.index).map_or("?", |(name, _)| *name);
        self.index += 1;
        (name, self.values.next())
    }

    fn mismatch(&self, name: &str, want: &str, got: Option<&Value>) -> Error {
        Error::Decode(format!(
            "{}.{name}: expected {want}, found {:?}",
            self.kind.table_name(),
            got.map(Value::data_type)
        ))
    }

    fn integer(&mut self) -> Result<i64> {
        match self.next_value() {
            (_, Some(Value::Integer(v))) => Ok(v),
            (name, other) => Err(self.mismatch(name, "INTEGER", other.as_ref())),
        }
    }

    fn text(&mut self) -> Result<String> {
        match self.next_value() {
            (_, Some(Value::Text(v))) => Ok(v),
            (name, other) => Err(self.mismatch(name, "TEXT", other.as_ref())),
        }
    }

    fn timestamp(&mut self) -> Result<DateTime<Utc>> {
        let raw = self.text()?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| Error::Decode(format!("bad timestamp {raw:?}: {e}")))
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        match self.next_value() {
            (_, Some(Value::Blob(v))) => Ok(v),
            (name, other) => Err(self.mismatch(name, "BLOB", other.as_ref())),
        }
    }

    fn decoded<T: codec::Blob>(&mut self) -> Result<T> {
        codec::decode(&self.blob()?)
    }

    fn summary(&mut self) -> Result<RunSummary> {
        let run_id = RunId::new(self.integer()?);
        let model_name = self.text()?;
        let model_type = self.text()?;
        let started_at = self.timestamp()?;
        let finished_at = self.timestamp()?;
        RunSummary::new(run_id, model_name, model_type, started_at, finished_at)
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

fn summary_values(summary: &RunSummary) -> Vec<Value> {
    vec![
        Value::Integer(summary.run_id().get()),
        Value::Text(summary.model_name().to_string()),
        Value::Text(summary.model_type().to_string()),
        format_timestamp(summary.started_at()),
        format_timestamp(summary.finished_at()),
    ]
}

impl StoredRecord for RunSummary {
    const KIND: RecordKind = RecordKind::Summary;

    fn run_id(&self) -> RunId {
        Self::run_id(self)
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(summary_values(self))
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        Columns::new(Self::KIND, values)?.summary()
    }
}

impl StoredRecord for RunDetail {
    const KIND: RecordKind = RecordKind::Detail;

    fn run_id(&self) -> RunId {
        self.summary().run_id()
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        let mut values = summary_values(self.summary());
        values.push(blob(self.best_params())?);
        values.push(blob(&self.all_params().to_vec())?);
        values.push(blob(&self.test_scores().to_vec())?);
        values.push(blob(&self.train_scores().to_vec())?);
        values.push(blob(&self.fit_time_secs().to_vec())?);
        values.push(blob(&self.score_time_secs().to_vec())?);
        values.push(Value::Blob(self.best_model().as_bytes().to_vec()));
        Ok(values)
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut cols = Columns::new(Self::KIND, values)?;
        let summary = cols.summary()?;
        let best_params: ParamSet = cols.decoded()?;
        let all_params: Vec<ParamSet> = cols.decoded()?;
        let test_scores: Vec<f64> = cols.decoded()?;
        let train_scores: Vec<f64> = cols.decoded()?;
        let fit_time_secs: Vec<f64> = cols.decoded()?;
        let score_time_secs: Vec<f64> = cols.decoded()?;
        let best_model = ModelArtifact::from_bytes(cols.blob()?)?;

        Self::builder(summary)
            .best_params(best_params)
            .all_params(all_params)
            .test_scores(test_scores)
            .train_scores(train_scores)
            .fit_time_secs(fit_time_secs)
            .score_time_secs(score_time_secs)
            .best_model(best_model)
            .build()
            .map_err(|e| Error::Decode(e.to_string()))
    }
}
