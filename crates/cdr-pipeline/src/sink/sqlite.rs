//! SQLite 레코드 싱크
//!
//! 배치 하나를 트랜잭션 하나로 저장합니다. 준비나 실행 중 하나라도 실패하면
//! 트랜잭션이 롤백되어 호출자 관점에서 아무 행도 저장되지 않습니다.
//!
//! `idempotent`가 켜져 있으면 (session_id, leg_id, type, timestamp) 유니크 인덱스를
//! 만들고 `INSERT OR IGNORE`로 중복 행을 무시합니다. 재시작 후 같은 배치가
//! 다시 제출되어도 보이는 행이 늘지 않습니다.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdrflow_core::config::{SinkConfig, is_sql_identifier};
use cdrflow_core::error::{CdrflowError, StorageError};
use cdrflow_core::metrics as m;
use cdrflow_core::pipeline::RecordSink;
use cdrflow_core::types::{CdrRecord, RecordType};
use rusqlite::types::Type;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

/// SQLite 싱크
#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
    table: String,
    idempotent: bool,
    insert_sql: Arc<str>,
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("table", &self.table)
            .field("idempotent", &self.idempotent)
            .finish()
    }
}

impl SqliteSink {
    /// 설정에 따라 데이터베이스 파일을 열고 스키마를 준비합니다.
    pub fn open(config: &SinkConfig) -> Result<Self, CdrflowError> {
        let path = Path::new(&config.database_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(connection_error)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(connection_error)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(connection_error)?;

        info!(
            path = %path.display(),
            table = config.table.as_str(),
            idempotent = config.idempotent,
            "sqlite sink opened"
        );
        Self::with_connection(conn, &config.table, config.idempotent)
    }

    /// 인메모리 데이터베이스로 생성합니다 (테스트용).
    pub fn open_in_memory(table: &str, idempotent: bool) -> Result<Self, CdrflowError> {
        let conn = Connection::open_in_memory().map_err(connection_error)?;
        Self::with_connection(conn, table, idempotent)
    }

    fn with_connection(conn: Connection, table: &str, idempotent: bool) -> Result<Self, CdrflowError> {
        if !is_sql_identifier(table) {
            return Err(StorageError::Prepare(format!("invalid table name '{table}'")).into());
        }

        conn.execute_batch(&schema_sql(table, idempotent))
            .map_err(|e| StorageError::Prepare(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_owned(),
            idempotent,
            insert_sql: insert_sql(table, idempotent).into(),
        })
    }

    /// 대상 테이블 이름
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 저장된 전체 행 수
    pub async fn count(&self) -> Result<u64, CdrflowError> {
        let conn = Arc::clone(&self.conn);
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        run_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Connection("connection lock poisoned".to_owned()))?;
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| StorageError::Query(e.to_string()))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    /// 저장된 레코드를 삽입 순서대로 읽습니다.
    pub async fn fetch_all(&self) -> Result<Vec<CdrRecord>, CdrflowError> {
        let conn = Arc::clone(&self.conn);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            quoted_columns(),
            self.table
        );
        run_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Connection("connection lock poisoned".to_owned()))?;
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| StorageError::Prepare(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    let tag: String = row.get(1)?;
                    let record_type = tag.parse::<RecordType>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            Type::Text,
                            Box::new(io::Error::new(io::ErrorKind::InvalidData, e)),
                        )
                    })?;
                    let mut record = CdrRecord::new(
                        row.get::<_, String>(0)?,
                        record_type,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    );
                    for (idx, column) in CdrRecord::COLUMNS.iter().enumerate().skip(4) {
                        let value: Option<String> = row.get(idx)?;
                        if let Some(slot) = record.optional_slot(column) {
                            *slot = value;
                        }
                    }
                    Ok(record)
                })
                .map_err(|e| StorageError::Query(e.to_string()))?;
            let records = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Query(e.to_string()))?;
            Ok(records)
        })
        .await
    }
}

impl RecordSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn submit(&self, source: &str, records: Vec<CdrRecord>) -> Result<usize, CdrflowError> {
        let total = records.len();
        let conn = Arc::clone(&self.conn);
        let sql = Arc::clone(&self.insert_sql);

        let stored = run_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StorageError::Connection("connection lock poisoned".to_owned()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            let mut stored = 0usize;
            {
                let mut stmt = tx
                    .prepare(&sql)
                    .map_err(|e| StorageError::Prepare(e.to_string()))?;
                for record in &records {
                    stored += stmt
                        .execute(params_from_iter(record.column_values()))
                        .map_err(|e| StorageError::Query(format!("{record}: {e}")))?;
                }
            }

            tx.commit()
                .map_err(|e| StorageError::Query(e.to_string()))?;
            Ok(stored)
        })
        .await?;

        let duplicates = total - stored;
        metrics::counter!(m::SINK_RECORDS_STORED_TOTAL, m::LABEL_SINK => "sqlite")
            .increment(stored as u64);
        if duplicates > 0 {
            metrics::counter!(m::SINK_DUPLICATES_IGNORED_TOTAL).increment(duplicates as u64);
        }
        debug!(
            source,
            table = self.table.as_str(),
            stored,
            duplicates,
            "batch committed"
        );
        Ok(stored)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CdrflowError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Connection(format!("blocking task failed: {e}")))?
        .map_err(CdrflowError::from)
}

fn connection_error(e: rusqlite::Error) -> CdrflowError {
    StorageError::Connection(e.to_string()).into()
}

fn quoted_columns() -> String {
    CdrRecord::COLUMNS
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn schema_sql(table: &str, idempotent: bool) -> String {
    let mut columns = String::from("id INTEGER PRIMARY KEY AUTOINCREMENT");
    for (idx, column) in CdrRecord::COLUMNS.iter().enumerate() {
        columns.push_str(&format!(",\n    \"{column}\" TEXT"));
        if idx < 4 {
            columns.push_str(" NOT NULL");
        }
    }

    let mut sql = format!("CREATE TABLE IF NOT EXISTS {table} (\n    {columns}\n);");
    if idempotent {
        sql.push_str(&format!(
            "\nCREATE UNIQUE INDEX IF NOT EXISTS {table}_event_key \
             ON {table} (\"session_id\", \"leg_id\", \"type\", \"timestamp\");"
        ));
    }
    sql
}

fn insert_sql(table: &str, idempotent: bool) -> String {
    let verb = if idempotent {
        "INSERT OR IGNORE"
    } else {
        "INSERT"
    };
    let placeholders = (1..=CdrRecord::COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{verb} INTO {table} ({}) VALUES ({placeholders})",
        quoted_columns()
    )
}
