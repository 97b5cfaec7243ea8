//! 파이프라인 trait -- 레코드 싱크 확장 포인트 정의

use std::future::Future;

use crate::error::CdrflowError;
use crate::types::CdrRecord;

/// 한 배치의 CDR 레코드를 받아 저장하는 싱크
///
/// 배치 단위 원자성을 보장해야 합니다. 배치의 모든 레코드를 저장하거나,
/// 실패 시 호출자 관점에서 어떤 레코드도 저장되지 않은 것으로 보여야 합니다.
/// 동시에 여러 수집 태스크가 같은 싱크를 공유하므로 내부 잠금은 구현체의 책임입니다.
///
/// 레코드의 소유권은 `submit` 호출과 함께 싱크로 넘어갑니다.
/// 같은 배치가 재시작 후 다시 제출될 수 있으므로 (at-least-once),
/// 구현체는 중복 제출에 안전해야 합니다.
pub trait RecordSink: Send + Sync + 'static {
    /// 싱크 이름 (로그용)
    fn name(&self) -> &str;

    /// 한 파일에서 나온 레코드를 라인 순서대로 저장합니다.
    ///
    /// # Arguments
    /// - `source`: 배치 식별자 (로그 컨텍스트용 파일명)
    /// - `records`: 라인 순서대로 정렬된 레코드
    ///
    /// # Returns
    /// 새로 저장된 레코드 수. 멱등 키로 걸러진 중복은 포함하지 않습니다.
    fn submit(
        &self,
        source: &str,
        records: Vec<CdrRecord>,
    ) -> impl Future<Output = Result<usize, CdrflowError>> + Send;
}
