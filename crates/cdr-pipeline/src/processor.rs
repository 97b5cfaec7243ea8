//! 파일 처리기 -- 압축 해제된 로그 파일을 라인 순서대로 파싱
//!
//! 파일을 순차적으로 읽어 각 라인에 [`LineGrammar`]를 적용합니다.
//! 라인 단위 실패는 집계 후 건너뛰고, 매칭된 라인이 하나도 없으면
//! 파일 전체를 [`IngestError::NoRecords`]로 실패 처리합니다.
//!
//! 잘못된 UTF-8 바이트는 대체 문자로 바꿔 읽습니다. 해당 라인은 대부분
//! 문법 불일치로 건너뛰게 되며 파일 읽기 자체는 실패하지 않습니다.

use std::path::Path;

use cdrflow_core::metrics as m;
use cdrflow_core::types::{CdrRecord, RecordType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, trace, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::grammar::{LineGrammar, LineRejection};

/// 파일 하나의 라인 처리 통계
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    /// 읽은 라인 수
    pub lines: u64,
    /// 레코드가 된 라인 수
    pub parsed: u64,
    pub blank: u64,
    pub unknown_type: u64,
    pub mismatched: u64,
    pub bad_timestamp: u64,
    pub too_long: u64,
}

impl LineStats {
    /// 건너뛴 라인 수 (빈 라인 제외)
    pub fn skipped(&self) -> u64 {
        self.unknown_type + self.mismatched + self.bad_timestamp + self.too_long
    }

    fn reject(&mut self, rejection: &LineRejection) {
        match rejection {
            LineRejection::Blank => self.blank += 1,
            LineRejection::UnknownType { .. } => self.unknown_type += 1,
            LineRejection::Mismatch { .. } => self.mismatched += 1,
            LineRejection::BadTimestamp { .. } => self.bad_timestamp += 1,
            LineRejection::TooLong { .. } => self.too_long += 1,
        }
    }
}

/// 파일 처리 결과
#[derive(Debug)]
pub struct ProcessedFile {
    /// 라인 순서대로 정렬된 레코드
    pub records: Vec<CdrRecord>,
    /// 라인 통계
    pub stats: LineStats,
}

/// 파일 처리기
#[derive(Debug, Clone)]
pub struct FileProcessor {
    grammar: LineGrammar,
    max_line_length: usize,
}

impl FileProcessor {
    /// 문법과 최대 라인 길이로 처리기를 생성합니다.
    pub fn new(grammar: LineGrammar, max_line_length: usize) -> Self {
        Self {
            grammar,
            max_line_length,
        }
    }

    /// 수집 설정에서 처리기를 생성합니다.
    pub fn from_config(config: &IngestConfig) -> Result<Self, IngestError> {
        let grammar = LineGrammar::new(config.log_generation, config.timestamp_layout.clone())?;
        Ok(Self::new(grammar, config.max_line_length))
    }

    /// 사용 중인 문법
    pub fn grammar(&self) -> &LineGrammar {
        &self.grammar
    }

    /// 로그 파일을 읽어 레코드 목록을 만듭니다.
    ///
    /// # Errors
    /// - [`IngestError::Open`]: 파일 열기 실패
    /// - [`IngestError::Read`]: 읽기 도중 I/O 실패
    /// - [`IngestError::NoRecords`]: 매칭된 라인이 없음
    pub async fn process(&self, path: &Path) -> Result<ProcessedFile, IngestError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| IngestError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut stats = LineStats::default();
        let mut buf = Vec::with_capacity(1024);

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| IngestError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            stats.lines += 1;
            let line_no = stats.lines;

            match self.parse_raw(&buf) {
                Ok(record) => {
                    stats.parsed += 1;
                    records.push(record);
                }
                Err(rejection) => {
                    stats.reject(&rejection);
                    log_rejection(path, line_no, &rejection);
                }
            }
        }

        emit_metrics(&records, &stats);

        if records.is_empty() {
            return Err(IngestError::NoRecords {
                path: path.to_path_buf(),
                lines: stats.lines,
            });
        }

        debug!(
            path = %path.display(),
            lines = stats.lines,
            records = records.len(),
            skipped = stats.skipped(),
            "log file processed"
        );

        Ok(ProcessedFile { records, stats })
    }

    fn parse_raw(&self, raw: &[u8]) -> Result<CdrRecord, LineRejection> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() > self.max_line_length {
            return Err(LineRejection::TooLong { len: raw.len() });
        }
        let line = String::from_utf8_lossy(raw);
        self.grammar.parse_line(&line)
    }
}

fn log_rejection(path: &Path, line_no: u64, rejection: &LineRejection) {
    match rejection {
        LineRejection::Blank => trace!(path = %path.display(), line_no, "blank line"),
        LineRejection::UnknownType { tag } => warn!(
            path = %path.display(),
            line_no,
            tag = tag.as_str(),
            "unknown CDR type, skipping line"
        ),
        other => debug!(
            path = %path.display(),
            line_no,
            reason = other.reason(),
            "line did not match, skipping: {other}"
        ),
    }
}

fn emit_metrics(records: &[CdrRecord], stats: &LineStats) {
    metrics::counter!(m::GRAMMAR_LINES_READ_TOTAL).increment(stats.lines);

    for record_type in RecordType::ALL {
        let count = records
            .iter()
            .filter(|r| r.record_type == record_type)
            .count() as u64;
        if count > 0 {
            metrics::counter!(m::GRAMMAR_RECORDS_PARSED_TOTAL, m::LABEL_RECORD_TYPE => record_type.tag())
                .increment(count);
        }
    }

    for (reason, count) in [
        ("unknown_type", stats.unknown_type),
        ("mismatch", stats.mismatched),
        ("bad_timestamp", stats.bad_timestamp),
        ("too_long", stats.too_long),
    ] {
        if count > 0 {
            metrics::counter!(m::GRAMMAR_LINES_SKIPPED_TOTAL, m::LABEL_REASON => reason)
                .increment(count);
        }
    }
}
