//! 수집 파이프라인 설정
//!
//! [`IngestConfig`]는 core의 [`IngestSection`](cdrflow_core::config::IngestSection)을
//! 기반으로 파이프라인 내부에서 사용하는 설정을 제공합니다.
//! 디렉토리와 문법 설정을 한 번 만들어 Extractor, File Processor, Watcher에
//! 참조로 전달합니다.
//!
//! # 사용 예시
//! ```ignore
//! use cdrflow_core::config::CdrflowConfig;
//! use cdrflow_pipeline::config::IngestConfig;
//!
//! let core_config = CdrflowConfig::default();
//! let config = IngestConfig::from_core(&core_config.ingest);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cdrflow_core::config::{IngestSection, LogGeneration};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// 수집 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 새 압축 배치가 도착하는 드롭 디렉토리
    pub drop_dir: PathBuf,
    /// 점유한 배치와 압축 해제 결과를 두는 작업 디렉토리
    pub work_dir: PathBuf,
    /// 처리 완료된 원본 배치 보관 디렉토리
    pub archive_dir: PathBuf,
    /// 배치 파일 확장자 (`.gz`)
    pub archive_suffix: String,
    /// 라인 형식 세대
    pub log_generation: LogGeneration,
    /// 입력 타임스탬프 레이아웃 (chrono 형식)
    pub timestamp_layout: String,
    /// 쓰기 알림 후 안정화 대기 시간 (밀리초)
    pub settle_ms: u64,
    /// 시작 시 기존 파일 일괄 처리 여부
    pub startup_sweep: bool,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 네이티브 감시 백엔드를 쓸 수 없을 때 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from_core(&IngestSection::default())
    }
}

impl IngestConfig {
    /// core의 `IngestSection`에서 파이프라인 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &IngestSection) -> Self {
        Self {
            drop_dir: PathBuf::from(&core.drop_dir),
            work_dir: PathBuf::from(&core.work_dir),
            archive_dir: PathBuf::from(&core.archive_dir),
            archive_suffix: core.archive_suffix.clone(),
            log_generation: core.log_generation,
            timestamp_layout: core.timestamp_layout.clone(),
            settle_ms: core.settle_ms,
            startup_sweep: core.startup_sweep,
            max_line_length: core.max_line_length,
            poll_interval_ms: 2000,
        }
    }

    /// 안정화 대기 시간
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// 폴링 감시 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 경로가 배치 파일 확장자를 가진 일반 파일 이름인지 확인합니다.
    ///
    /// 확장자만 있는 이름(`.gz`)과 임시 파일은 제외합니다.
    pub fn is_batch_path(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => {
                name.len() > self.archive_suffix.len()
                    && name.ends_with(&self.archive_suffix)
                    && !name.starts_with('.')
            }
            None => false,
        }
    }

    /// 세 디렉토리를 생성합니다 (이미 있으면 무시).
    pub async fn ensure_dirs(&self) -> Result<(), IngestError> {
        for dir in [&self.drop_dir, &self.work_dir, &self.archive_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        const MAX_SETTLE_MS: u64 = 60_000;
        const MAX_POLL_INTERVAL_MS: u64 = 600_000;
        const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

        let dirs = [
            ("drop_dir", &self.drop_dir),
            ("work_dir", &self.work_dir),
            ("archive_dir", &self.archive_dir),
        ];
        for (field, dir) in &dirs {
            if dir.as_os_str().is_empty() {
                return Err(config_error(field, "directory must not be empty"));
            }
        }
        for (i, (field, dir)) in dirs.iter().enumerate() {
            for (other_field, other) in &dirs[i + 1..] {
                if dir == other {
                    return Err(config_error(
                        field,
                        format!("must differ from {other_field} ({})", dir.display()),
                    ));
                }
            }
        }

        if !self.archive_suffix.starts_with('.') || self.archive_suffix.len() < 2 {
            return Err(config_error(
                "archive_suffix",
                format!("'{}' must start with '.'", self.archive_suffix),
            ));
        }

        if self.timestamp_layout.is_empty() {
            return Err(config_error("timestamp_layout", "must not be empty"));
        }

        if self.settle_ms == 0 || self.settle_ms > MAX_SETTLE_MS {
            return Err(config_error(
                "settle_ms",
                format!("must be 1-{MAX_SETTLE_MS}"),
            ));
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(config_error(
                "poll_interval_ms",
                format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            ));
        }

        if self.max_line_length == 0 || self.max_line_length > MAX_LINE_LENGTH {
            return Err(config_error(
                "max_line_length",
                format!("must be 1-{MAX_LINE_LENGTH}"),
            ));
        }

        Ok(())
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 수집 설정 빌더
#[derive(Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 세 디렉토리를 `root` 아래 `new`, `tmp`, `archive`로 설정합니다.
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.config.drop_dir = root.join("new");
        self.config.work_dir = root.join("tmp");
        self.config.archive_dir = root.join("archive");
        self
    }

    /// 드롭 디렉토리를 설정합니다.
    pub fn drop_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.drop_dir = dir.into();
        self
    }

    /// 작업 디렉토리를 설정합니다.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    /// 아카이브 디렉토리를 설정합니다.
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = dir.into();
        self
    }

    /// 배치 파일 확장자를 설정합니다.
    pub fn archive_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.archive_suffix = suffix.into();
        self
    }

    /// 라인 형식 세대를 설정합니다.
    pub fn log_generation(mut self, generation: LogGeneration) -> Self {
        self.config.log_generation = generation;
        self
    }

    /// 타임스탬프 레이아웃을 설정합니다.
    pub fn timestamp_layout(mut self, layout: impl Into<String>) -> Self {
        self.config.timestamp_layout = layout.into();
        self
    }

    /// 안정화 대기 시간(밀리초)을 설정합니다.
    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.config.settle_ms = ms;
        self
    }

    /// 시작 시 일괄 처리 여부를 설정합니다.
    pub fn startup_sweep(mut self, enabled: bool) -> Self {
        self.config.startup_sweep = enabled;
        self
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// 폴링 감시 주기(밀리초)를 설정합니다.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// 설정을 검증하고 `IngestConfig`를 생성합니다.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
