//! 에러 타입 -- 도메인별 에러 정의

/// cdrflow 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CdrflowError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 수집 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 스토리지(레코드 싱크) 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 수집 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 배치 처리 실패 (배치 경로와 원인 포함)
    #[error("batch '{path}' failed: {reason}")]
    BatchFailed { path: String, reason: String },

    /// 디렉토리 감시 실패
    #[error("watch failed: {0}")]
    WatchFailed(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 파일 전체에서 매칭된 라인이 없음
    #[error("no records found in '{path}' ({lines} lines read)")]
    NoRecords { path: String, lines: u64 },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// INSERT 문 준비 실패
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// 쿼리 실행 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 레코드 직렬화 실패 (echo 모드)
    #[error("serialize failed: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_converts_to_top_level() {
        let err: CdrflowError = StorageError::Query("disk I/O error".to_owned()).into();
        assert!(matches!(err, CdrflowError::Storage(_)));
        assert!(err.to_string().contains("disk I/O error"));
    }

    #[test]
    fn no_records_display_names_file() {
        let err = ParseError::NoRecords {
            path: "/data/tmp/batch1".to_owned(),
            lines: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("batch1"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue {
            field: "sink.table".to_owned(),
            reason: "must be an identifier".to_owned(),
        };
        assert!(err.to_string().contains("sink.table"));
    }
}
