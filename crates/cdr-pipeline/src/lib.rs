//! cdrflow CDR 수집 파이프라인
//!
//! 교환기가 드롭 디렉토리에 떨어뜨리는 gzip 배치를 감지해
//! 압축 해제 -> 라인 파싱 -> 레코드 싱크 저장 -> 아카이브 순서로 처리합니다.
//!
//! # 구성 요소
//! - [`grammar`]: 로그 한 줄을 CDR 레코드로 변환하는 라인 문법
//! - [`processor`]: 압축 해제된 파일을 라인 순서대로 파싱
//! - [`extractor`]: 배치 점유/압축 해제/아카이브/반환
//! - [`sink`]: SQLite 저장 싱크와 진단용 echo 싱크
//! - [`pipeline`]: 배치 하나의 전체 처리 순서
//! - [`watcher`]: 드롭 디렉토리 감시와 시작 시 일괄 처리
//!
//! # 아키텍처
//! ```text
//! drop/*.gz --notify--> DirectoryWatcher --spawn--> IngestPipeline::ingest
//!                                                     |- Extractor::claim / extract
//!                                                     |- FileProcessor::process (LineGrammar)
//!                                                     |- RecordSink::submit
//!                                                     `- Extractor::archive
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod grammar;
pub mod pipeline;
pub mod processor;
pub mod sink;
pub mod watcher;

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::IngestError;
pub use extractor::{ClaimedBatch, Extractor};
pub use grammar::{LineGrammar, LineRejection};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use processor::{FileProcessor, LineStats, ProcessedFile};
pub use sink::{ConfiguredSink, EchoSink, SqliteSink};
pub use watcher::{DirectoryWatcher, WatchBackend};
