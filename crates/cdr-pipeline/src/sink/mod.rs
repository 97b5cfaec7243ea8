//! 레코드 싱크 구현
//!
//! - [`SqliteSink`]: 배치 단위 트랜잭션으로 SQLite에 저장
//! - [`EchoSink`]: 저장 없이 로그 스트림으로 직렬화 (진단/dry-run)
//! - [`ConfiguredSink`]: `sink.mode` 설정으로 둘 중 하나를 선택

pub mod echo;
pub mod sqlite;

pub use echo::EchoSink;
pub use sqlite::SqliteSink;

use cdrflow_core::config::{SinkConfig, SinkMode};
use cdrflow_core::error::CdrflowError;
use cdrflow_core::pipeline::RecordSink;
use cdrflow_core::types::CdrRecord;

/// 설정으로 선택된 싱크
#[derive(Debug, Clone)]
pub enum ConfiguredSink {
    Sqlite(SqliteSink),
    Echo(EchoSink),
}

impl ConfiguredSink {
    /// `sink.mode`에 따라 싱크를 생성합니다.
    pub fn from_config(config: &SinkConfig) -> Result<Self, CdrflowError> {
        match config.mode {
            SinkMode::Persist => Ok(Self::Sqlite(SqliteSink::open(config)?)),
            SinkMode::Echo => Ok(Self::Echo(EchoSink::new())),
        }
    }

    /// 싱크 모드
    pub fn mode(&self) -> SinkMode {
        match self {
            Self::Sqlite(_) => SinkMode::Persist,
            Self::Echo(_) => SinkMode::Echo,
        }
    }
}

impl RecordSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Sqlite(sink) => sink.name(),
            Self::Echo(sink) => sink.name(),
        }
    }

    async fn submit(&self, source: &str, records: Vec<CdrRecord>) -> Result<usize, CdrflowError> {
        match self {
            Self::Sqlite(sink) => sink.submit(source, records).await,
            Self::Echo(sink) => sink.submit(source, records).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_mode_needs_no_database() {
        let config = SinkConfig {
            mode: SinkMode::Echo,
            database_path: String::new(),
            ..SinkConfig::default()
        };
        let sink = ConfiguredSink::from_config(&config).unwrap();
        assert_eq!(sink.mode(), SinkMode::Echo);
        assert_eq!(sink.name(), "echo");
    }

    #[test]
    fn persist_mode_opens_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            database_path: dir.path().join("cdr.db").display().to_string(),
            ..SinkConfig::default()
        };
        let sink = ConfiguredSink::from_config(&config).unwrap();
        assert_eq!(sink.mode(), SinkMode::Persist);
        assert_eq!(sink.name(), "sqlite");
    }
}
