//! 설정 관리 -- cdrflow.toml 파싱 및 런타임 설정
//!
//! [`CdrflowConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CDRFLOW_INGEST_DROP_DIR=/data/new` 형식)
//! 3. 설정 파일 (`cdrflow.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), cdrflow_core::error::CdrflowError> {
//! use cdrflow_core::config::CdrflowConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CdrflowConfig::load("cdrflow.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CdrflowConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CdrflowError, ConfigError};

/// cdrflow 통합 설정
///
/// `cdrflow.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrflowConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집(드롭 디렉토리 감시, 압축 해제, 파싱) 설정
    #[serde(default)]
    pub ingest: IngestSection,
    /// 레코드 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl CdrflowConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CdrflowError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CdrflowError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CdrflowError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CdrflowError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CdrflowError> {
        toml::from_str(toml_str).map_err(|e| {
            CdrflowError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CDRFLOW_{SECTION}_{FIELD}`
    /// 예: `CDRFLOW_SINK_MODE=echo`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CDRFLOW_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CDRFLOW_GENERAL_LOG_FORMAT");

        // Ingest
        override_string(&mut self.ingest.drop_dir, "CDRFLOW_INGEST_DROP_DIR");
        override_string(&mut self.ingest.work_dir, "CDRFLOW_INGEST_WORK_DIR");
        override_string(&mut self.ingest.archive_dir, "CDRFLOW_INGEST_ARCHIVE_DIR");
        override_string(
            &mut self.ingest.archive_suffix,
            "CDRFLOW_INGEST_ARCHIVE_SUFFIX",
        );
        override_parsed(
            &mut self.ingest.log_generation,
            "CDRFLOW_INGEST_LOG_GENERATION",
        );
        override_string(
            &mut self.ingest.timestamp_layout,
            "CDRFLOW_INGEST_TIMESTAMP_LAYOUT",
        );
        override_parsed(&mut self.ingest.settle_ms, "CDRFLOW_INGEST_SETTLE_MS");
        override_parsed(
            &mut self.ingest.startup_sweep,
            "CDRFLOW_INGEST_STARTUP_SWEEP",
        );
        override_parsed(
            &mut self.ingest.max_line_length,
            "CDRFLOW_INGEST_MAX_LINE_LENGTH",
        );

        // Sink
        override_parsed(&mut self.sink.mode, "CDRFLOW_SINK_MODE");
        override_string(&mut self.sink.database_path, "CDRFLOW_SINK_DATABASE_PATH");
        override_string(&mut self.sink.table, "CDRFLOW_SINK_TABLE");
        override_parsed(&mut self.sink.idempotent, "CDRFLOW_SINK_IDEMPOTENT");
        override_parsed(
            &mut self.sink.busy_timeout_ms,
            "CDRFLOW_SINK_BUSY_TIMEOUT_MS",
        );

        // Metrics
        override_parsed(&mut self.metrics.enabled, "CDRFLOW_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "CDRFLOW_METRICS_LISTEN_ADDR",
        );
        override_parsed(&mut self.metrics.port, "CDRFLOW_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CdrflowError> {
        const MAX_SETTLE_MS: u64 = 60_000;
        const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 디렉토리 검증: 비어 있지 않고 서로 달라야 함
        let dirs = [
            ("ingest.drop_dir", &self.ingest.drop_dir),
            ("ingest.work_dir", &self.ingest.work_dir),
            ("ingest.archive_dir", &self.ingest.archive_dir),
        ];
        for (field, dir) in &dirs {
            if dir.is_empty() {
                return Err(invalid(field, "directory must not be empty".to_owned()));
            }
        }
        for (i, (field, dir)) in dirs.iter().enumerate() {
            for (other_field, other) in &dirs[i + 1..] {
                if Path::new(dir.as_str()) == Path::new(other.as_str()) {
                    return Err(invalid(
                        field,
                        format!("must differ from {other_field} ('{dir}')"),
                    ));
                }
            }
        }

        let suffix = &self.ingest.archive_suffix;
        if !suffix.starts_with('.') || suffix.len() < 2 {
            return Err(invalid(
                "ingest.archive_suffix",
                format!("'{suffix}' must start with '.' and name an extension"),
            ));
        }

        if self.ingest.timestamp_layout.is_empty() {
            return Err(invalid(
                "ingest.timestamp_layout",
                "layout must not be empty".to_owned(),
            ));
        }

        if self.ingest.settle_ms == 0 || self.ingest.settle_ms > MAX_SETTLE_MS {
            return Err(invalid(
                "ingest.settle_ms",
                format!("must be 1-{MAX_SETTLE_MS}"),
            ));
        }

        if self.ingest.max_line_length == 0 || self.ingest.max_line_length > MAX_LINE_LENGTH {
            return Err(invalid(
                "ingest.max_line_length",
                format!("must be 1-{MAX_LINE_LENGTH}"),
            ));
        }

        if !is_sql_identifier(&self.sink.table) {
            return Err(invalid(
                "sink.table",
                format!(
                    "'{}' must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)",
                    self.sink.table
                ),
            ));
        }

        if self.sink.mode == SinkMode::Persist && self.sink.database_path.is_empty() {
            return Err(invalid(
                "sink.database_path",
                "database path must not be empty in persist mode".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> CdrflowError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// SQL 식별자로 안전한 이름인지 확인합니다 (테이블 이름은 쿼리에 직접 삽입됨).
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 로그 형식 세대
///
/// 교환기 소프트웨어 버전에 따라 두 가지 라인 형식이 관찰됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogGeneration {
    /// 초기 형식: UTC 오프셋은 `-hhmm`만, 대부분의 값은 비어 있을 수 없음
    Legacy,
    /// 현행 형식: `+hhmm`/`-hhmm` 모두 허용, 세션/레그 ID 외 빈 값 허용
    #[default]
    Current,
}

impl fmt::Display for LogGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Current => write!(f, "current"),
        }
    }
}

impl std::str::FromStr for LogGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "current" => Ok(Self::Current),
            other => Err(format!("unknown log generation '{other}'")),
        }
    }
}

/// 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// 새 압축 배치가 도착하는 드롭 디렉토리
    pub drop_dir: String,
    /// 압축 해제된 중간 파일을 두는 작업 디렉토리
    pub work_dir: String,
    /// 처리 완료된 원본 배치를 보관하는 디렉토리
    pub archive_dir: String,
    /// 배치 파일 확장자
    pub archive_suffix: String,
    /// 라인 형식 세대
    pub log_generation: LogGeneration,
    /// 입력 타임스탬프 레이아웃 (chrono 형식)
    pub timestamp_layout: String,
    /// 마지막 쓰기 알림 이후 배치를 스케줄하기까지의 대기 시간 (밀리초)
    pub settle_ms: u64,
    /// 시작 시 기존 파일 일괄 처리 여부
    pub startup_sweep: bool,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            drop_dir: "./new".to_owned(),
            work_dir: "./tmp".to_owned(),
            archive_dir: "./archive".to_owned(),
            archive_suffix: ".gz".to_owned(),
            log_generation: LogGeneration::Current,
            timestamp_layout: "%Y-%m-%d %H:%M:%S%.f%z".to_owned(),
            settle_ms: 500,
            startup_sweep: true,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// 싱크 동작 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// 데이터베이스에 저장
    #[default]
    Persist,
    /// 저장하지 않고 로그 스트림으로 직렬화 (진단/dry-run)
    Echo,
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persist => write!(f, "persist"),
            Self::Echo => write!(f, "echo"),
        }
    }
}

impl std::str::FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persist" => Ok(Self::Persist),
            "echo" => Ok(Self::Echo),
            other => Err(format!("unknown sink mode '{other}'")),
        }
    }
}

/// 레코드 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 싱크 모드 (persist, echo)
    pub mode: SinkMode,
    /// SQLite 데이터베이스 파일 경로
    pub database_path: String,
    /// 대상 테이블 이름
    pub table: String,
    /// (session_id, leg_id, type, timestamp) 유니크 키로 중복 행 억제
    pub idempotent: bool,
    /// 잠금 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::Persist,
            database_path: "./cdr.db".to_owned(),
            table: "tb_cdr".to_owned(),
            idempotent: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T>(target: &mut T, env_key: &str)
where
    T: std::str::FromStr,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
