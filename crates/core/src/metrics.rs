//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `cdrflow_`
//! - 구성 요소: `ingest_`, `grammar_`, `sink_`, `watcher_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(cdrflow_core::metrics::INGEST_BATCHES_ARCHIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 라인 스킵 사유 레이블 키 (unknown_type, mismatch, bad_timestamp, too_long)
pub const LABEL_REASON: &str = "reason";

/// 레코드 유형 레이블 키 (BEG, UPD, END)
pub const LABEL_RECORD_TYPE: &str = "type";

/// 싱크 레이블 키 (sqlite, echo)
pub const LABEL_SINK: &str = "sink";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 아카이브까지 완료된 배치 수 (counter)
pub const INGEST_BATCHES_ARCHIVED_TOTAL: &str = "cdrflow_ingest_batches_archived_total";

/// Ingest: 실패한 배치 수 (counter)
pub const INGEST_BATCHES_FAILED_TOTAL: &str = "cdrflow_ingest_batches_failed_total";

/// Ingest: 이미 다른 태스크가 점유한 배치 수 (counter)
pub const INGEST_BATCHES_ALREADY_CLAIMED_TOTAL: &str =
    "cdrflow_ingest_batches_already_claimed_total";

/// Ingest: 배치 처리 소요 시간 (histogram, 초)
pub const INGEST_BATCH_DURATION_SECONDS: &str = "cdrflow_ingest_batch_duration_seconds";

// ─── Grammar 메트릭 ────────────────────────────────────────────────

/// Grammar: 읽은 라인 수 (counter)
pub const GRAMMAR_LINES_READ_TOTAL: &str = "cdrflow_grammar_lines_read_total";

/// Grammar: 파싱된 레코드 수 (counter, label: type)
pub const GRAMMAR_RECORDS_PARSED_TOTAL: &str = "cdrflow_grammar_records_parsed_total";

/// Grammar: 스킵된 라인 수 (counter, label: reason)
pub const GRAMMAR_LINES_SKIPPED_TOTAL: &str = "cdrflow_grammar_lines_skipped_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 저장된 레코드 수 (counter, label: sink)
pub const SINK_RECORDS_STORED_TOTAL: &str = "cdrflow_sink_records_stored_total";

/// Sink: 멱등 키로 무시된 중복 레코드 수 (counter)
pub const SINK_DUPLICATES_IGNORED_TOTAL: &str = "cdrflow_sink_duplicates_ignored_total";

// ─── Watcher 메트릭 ────────────────────────────────────────────────

/// Watcher: 스케줄된 배치 수 (counter)
pub const WATCHER_BATCHES_SCHEDULED_TOTAL: &str = "cdrflow_watcher_batches_scheduled_total";

/// Watcher: 알림 채널 에러 수 (counter)
pub const WATCHER_ERRORS_TOTAL: &str = "cdrflow_watcher_errors_total";

/// 배치 처리 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 300s 범위 (압축 해제 + 파싱 + 트랜잭션 포함)
pub const BATCH_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        INGEST_BATCHES_ARCHIVED_TOTAL,
        "Total number of batches parsed, stored and archived"
    );
    describe_counter!(
        INGEST_BATCHES_FAILED_TOTAL,
        "Total number of batches that failed and were left for inspection"
    );
    describe_counter!(
        INGEST_BATCHES_ALREADY_CLAIMED_TOTAL,
        "Total number of ingestion tasks that found their batch already claimed"
    );
    describe_histogram!(
        INGEST_BATCH_DURATION_SECONDS,
        "Time to claim, extract, parse, store and archive one batch in seconds"
    );
    describe_counter!(
        GRAMMAR_LINES_READ_TOTAL,
        "Total number of log lines read from extracted batches"
    );
    describe_counter!(
        GRAMMAR_RECORDS_PARSED_TOTAL,
        "Total number of CDR records parsed per record type"
    );
    describe_counter!(
        GRAMMAR_LINES_SKIPPED_TOTAL,
        "Total number of log lines skipped per reason"
    );
    describe_counter!(
        SINK_RECORDS_STORED_TOTAL,
        "Total number of CDR records written by the record sink"
    );
    describe_counter!(
        SINK_DUPLICATES_IGNORED_TOTAL,
        "Total number of CDR records ignored by the idempotency key"
    );
    describe_counter!(
        WATCHER_BATCHES_SCHEDULED_TOTAL,
        "Total number of ingestion tasks scheduled by the drop directory watcher"
    );
    describe_counter!(
        WATCHER_ERRORS_TOTAL,
        "Total number of errors reported by the notification channel"
    );
}
