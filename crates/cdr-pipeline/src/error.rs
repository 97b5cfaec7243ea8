//! 수집 파이프라인 에러 타입
//!
//! [`IngestError`]는 배치 하나를 점유/압축 해제/파싱/저장/아카이브하는 동안
//! 발생하는 모든 에러를 표현합니다. 라인 단위 문법 불일치는 에러가 아니라
//! [`LineRejection`](crate::grammar::LineRejection) 값으로 보고됩니다.
//!
//! `From<IngestError> for CdrflowError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::path::{Path, PathBuf};

use cdrflow_core::error::{CdrflowError, ParseError, PipelineError};

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 드롭 디렉토리에서 배치를 점유(이동)하지 못함
    #[error("claim failed: {path}: {source}")]
    Claim {
        /// 배치 경로
        path: PathBuf,
        /// 원인
        source: std::io::Error,
    },

    /// 압축 배치 파일 열기 실패
    #[error("cannot open archive {path}: {source}")]
    ExtractOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 압축 형식 오류 (손상된 gzip 등)
    #[error("decompression failed for {path}: {source}")]
    Decompress {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 압축 해제 결과 쓰기 실패
    #[error("cannot write extracted file {path}: {source}")]
    ExtractWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 압축 해제된 로그 파일 열기 실패
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 로그 파일 읽기 실패
    #[error("cannot read log file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 파일 전체에서 매칭된 라인이 하나도 없음 (손상 또는 형식 불일치)
    #[error("no records found in {path} ({lines} lines read)")]
    NoRecords {
        /// 로그 파일 경로
        path: PathBuf,
        /// 읽은 라인 수
        lines: u64,
    },

    /// 레코드 싱크 실패 (배치 전체가 커밋되지 않음)
    #[error("sink '{sink}' rejected batch {path}: {source}")]
    Sink {
        /// 싱크 이름
        sink: String,
        /// 배치 경로
        path: PathBuf,
        /// 원인
        source: CdrflowError,
    },

    /// 아카이브 디렉토리로 이동 실패
    #[error("cannot archive {path} to {dest}: {source}")]
    Archive {
        path: PathBuf,
        dest: PathBuf,
        source: std::io::Error,
    },

    /// 디렉토리 감시 설정 실패
    #[error("watch error: {0}")]
    Watch(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 비동기 작업 조인 실패
    #[error("task join failed: {0}")]
    Join(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl IngestError {
    /// 에러와 관련된 파일 경로 (있는 경우)
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Claim { path, .. }
            | Self::ExtractOpen { path, .. }
            | Self::Decompress { path, .. }
            | Self::ExtractWrite { path, .. }
            | Self::Open { path, .. }
            | Self::Read { path, .. }
            | Self::NoRecords { path, .. }
            | Self::Sink { path, .. }
            | Self::Archive { path, .. } => Some(path),
            _ => None,
        }
    }

    /// 메트릭/로그용 단계 이름
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Claim { .. } => "claim",
            Self::ExtractOpen { .. } | Self::Decompress { .. } | Self::ExtractWrite { .. } => {
                "extract"
            }
            Self::Open { .. } | Self::Read { .. } | Self::NoRecords { .. } => "process",
            Self::Sink { .. } => "sink",
            Self::Archive { .. } => "archive",
            Self::Watch(_) => "watch",
            Self::Config { .. } => "config",
            Self::Join(_) | Self::Io(_) | Self::Regex(_) => "internal",
        }
    }
}

impl From<IngestError> for CdrflowError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoRecords { path, lines } => CdrflowError::Parse(ParseError::NoRecords {
                path: path.display().to_string(),
                lines,
            }),
            IngestError::Sink { source, .. } => source,
            IngestError::Watch(reason) => CdrflowError::Pipeline(PipelineError::WatchFailed(reason)),
            IngestError::Config { field, reason } => {
                CdrflowError::Pipeline(PipelineError::InitFailed(format!("{field}: {reason}")))
            }
            IngestError::Io(e) => CdrflowError::Io(e),
            other => {
                let path = other
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                CdrflowError::Pipeline(PipelineError::BatchFailed {
                    path,
                    reason: other.to_string(),
                })
            }
        }
    }
}
