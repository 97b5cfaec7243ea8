//! cdrflow 공통 크레이트
//!
//! 수집 파이프라인과 데몬이 공유하는 타입, trait, 에러, 설정을 정의합니다.
//!
//! - [`types`]: CDR 레코드와 레코드 유형
//! - [`pipeline`]: 레코드 싱크 trait
//! - [`config`]: `cdrflow.toml` 설정
//! - [`error`]: 에러 분류
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CdrflowError, ConfigError, ParseError, PipelineError, StorageError};

// 설정
pub use config::{CdrflowConfig, LogGeneration, SinkMode};

// 파이프라인 trait
pub use pipeline::RecordSink;

// 도메인 타입
pub use types::{CdrRecord, RecordType};
