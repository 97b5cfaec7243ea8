//! 배치 수집 오케스트레이션
//!
//! [`IngestPipeline`]은 배치 하나를 점유 -> 압축 해제 -> 파싱 -> 싱크 제출 -> 아카이브
//! 순서로 처리합니다. 아카이브는 싱크가 성공한 뒤에만 일어나므로,
//! 도중에 프로세스가 종료되면 배치는 드롭 디렉토리(또는 작업 디렉토리)에 남아
//! 다음 시작 시 다시 처리됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use std::sync::Arc;
//! use cdrflow_pipeline::{IngestConfig, IngestPipeline, sink::EchoSink};
//!
//! let pipeline = IngestPipeline::new(IngestConfig::default(), Arc::new(EchoSink::new()))?;
//! let outcome = pipeline.ingest(Path::new("./new/batch1.gz")).await?;
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use cdrflow_core::metrics as m;
use cdrflow_core::pipeline::RecordSink;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::extractor::{ClaimedBatch, Extractor};
use crate::processor::FileProcessor;

/// 배치 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 저장과 아카이브까지 완료
    Archived {
        /// 아카이브된 원본 경로
        archive: PathBuf,
        /// 파싱된 레코드 수
        records: usize,
        /// 싱크가 새로 저장한 레코드 수
        stored: usize,
        /// 건너뛴 라인 수
        skipped: u64,
    },
    /// 다른 태스크가 이미 점유함 (정상 종료)
    AlreadyClaimed,
}

/// 배치 수집 파이프라인
pub struct IngestPipeline<S> {
    extractor: Extractor,
    processor: FileProcessor,
    sink: Arc<S>,
    /// 실패 후 드롭 디렉토리로 되돌린 경로. 다음 일괄 처리 전까지 감시기가 다시 잡지 않음
    returned: Mutex<HashSet<PathBuf>>,
}

impl<S: RecordSink> IngestPipeline<S> {
    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn new(config: IngestConfig, sink: Arc<S>) -> Result<Self, IngestError> {
        config.validate()?;
        let processor = FileProcessor::from_config(&config)?;
        Ok(Self {
            extractor: Extractor::new(config),
            processor,
            sink,
            returned: Mutex::new(HashSet::new()),
        })
    }

    /// 수집 설정
    pub fn config(&self) -> &IngestConfig {
        self.extractor.config()
    }

    /// 배치 이동/압축 해제기
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// 레코드 싱크
    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// 실패해서 드롭 디렉토리로 되돌린 배치인지 확인합니다.
    pub fn was_returned(&self, path: &Path) -> bool {
        self.returned_set().contains(path)
    }

    /// 되돌린 배치 표시를 지웁니다 (새로 쓰여진 경우). 표시가 있었으면 참입니다.
    pub fn forget_returned(&self, path: &Path) -> bool {
        self.returned_set().remove(path)
    }

    /// 되돌린 배치 표시를 모두 지웁니다. 일괄 처리가 다시 시도하기 전에 호출합니다.
    pub fn clear_returned(&self) {
        self.returned_set().clear();
    }

    fn returned_set(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.returned.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 이전 실행에서 작업 디렉토리에 남은 배치를 드롭 디렉토리로 되돌립니다.
    pub async fn recover(&self) -> Result<Vec<PathBuf>, IngestError> {
        self.config().ensure_dirs().await?;
        self.extractor.recover_orphans().await
    }

    /// 배치 하나를 끝까지 처리합니다.
    ///
    /// 2단계 이후에서 실패하면 점유한 원본을 드롭 디렉토리로 되돌리고 에러를 반환합니다.
    /// 파싱 실패 시에는 압축 해제 결과를 조사용으로 작업 디렉토리에 남깁니다.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();

        let Some(batch) = self.extractor.claim(path).await? else {
            debug!(path = %path.display(), "batch already claimed, skipping");
            metrics::counter!(m::INGEST_BATCHES_ALREADY_CLAIMED_TOTAL).increment(1);
            return Ok(IngestOutcome::AlreadyClaimed);
        };

        match self.process_claimed(&batch).await {
            Ok(outcome) => {
                metrics::counter!(m::INGEST_BATCHES_ARCHIVED_TOTAL).increment(1);
                metrics::histogram!(m::INGEST_BATCH_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                Ok(outcome)
            }
            Err(err) => {
                metrics::counter!(m::INGEST_BATCHES_FAILED_TOTAL, m::LABEL_REASON => err.stage())
                    .increment(1);
                if matches!(err, IngestError::Sink { .. } | IngestError::Archive { .. }) {
                    // 재처리 시 다시 압축 해제하므로 지움
                    self.extractor.discard_extracted(&batch).await;
                }
                self.release(&batch).await;
                Err(err)
            }
        }
    }

    async fn process_claimed(&self, batch: &ClaimedBatch) -> Result<IngestOutcome, IngestError> {
        self.extractor.extract(batch).await?;
        let processed = self.processor.process(&batch.extracted).await?;
        let records = processed.records.len();

        let stored = self
            .sink
            .submit(&batch.name, processed.records)
            .await
            .map_err(|source| IngestError::Sink {
                sink: self.sink.name().to_owned(),
                path: batch.claimed.clone(),
                source,
            })?;

        let archive = self.extractor.archive(batch).await?;
        Ok(IngestOutcome::Archived {
            archive,
            records,
            stored,
            skipped: processed.stats.skipped(),
        })
    }

    async fn release(&self, batch: &ClaimedBatch) {
        match self.extractor.return_to_drop(batch).await {
            Ok(dest) => {
                warn!(
                    path = %dest.display(),
                    "batch returned to drop directory, will be retried on next startup"
                );
                self.returned_set().insert(dest);
            }
            Err(e) => error!(
                path = %batch.claimed.display(),
                error = %e,
                "failed to return batch to drop directory, left in work directory"
            ),
        }
    }

    /// 태스크 경계: 배치를 처리하고 결과를 로그로 남깁니다. 에러를 전파하지 않습니다.
    pub async fn run_task(&self, path: PathBuf) {
        match self.ingest(&path).await {
            Ok(IngestOutcome::Archived {
                archive,
                records,
                stored,
                skipped,
            }) => info!(
                path = %path.display(),
                archive = %archive.display(),
                records,
                stored,
                skipped,
                "batch archived"
            ),
            Ok(IngestOutcome::AlreadyClaimed) => {}
            Err(e) => error!(
                path = %path.display(),
                stage = e.stage(),
                error = %e,
                "batch ingestion failed"
            ),
        }
    }
}
