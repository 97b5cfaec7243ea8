//! 진단용 echo 싱크
//!
//! 레코드를 저장하지 않고 `cdrflow::echo` 타깃에 JSON 한 줄씩 기록합니다.
//! 저장 싱크와 같은 컬럼 값을 그대로 직렬화하므로 골든 출력 비교에 쓸 수 있습니다.

use cdrflow_core::error::{CdrflowError, StorageError};
use cdrflow_core::metrics as m;
use cdrflow_core::pipeline::RecordSink;
use cdrflow_core::types::CdrRecord;

/// echo 싱크 로그 타깃
pub const ECHO_TARGET: &str = "cdrflow::echo";

/// 레코드를 로그 스트림으로 내보내는 싱크
#[derive(Debug, Clone, Default)]
pub struct EchoSink;

impl EchoSink {
    /// 새 echo 싱크를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 레코드를 echo 출력 형식(JSON 한 줄)으로 직렬화합니다.
    pub fn render(record: &CdrRecord) -> Result<String, CdrflowError> {
        serde_json::to_string(record)
            .map_err(|e| StorageError::Serialize(format!("{record}: {e}")).into())
    }
}

impl RecordSink for EchoSink {
    fn name(&self) -> &str {
        "echo"
    }

    async fn submit(&self, source: &str, records: Vec<CdrRecord>) -> Result<usize, CdrflowError> {
        // 하나라도 직렬화에 실패하면 아무것도 내보내지 않음
        let lines = records
            .iter()
            .map(Self::render)
            .collect::<Result<Vec<_>, _>>()?;

        for line in &lines {
            tracing::info!(target: ECHO_TARGET, source, record = line.as_str(), "cdr");
        }

        metrics::counter!(m::SINK_RECORDS_STORED_TOTAL, m::LABEL_SINK => "echo")
            .increment(lines.len() as u64);
        Ok(lines.len())
    }
}
