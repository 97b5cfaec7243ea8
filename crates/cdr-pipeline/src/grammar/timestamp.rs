//! 타임스탬프 정규화
//!
//! 입력: `2024-01-02 10:00:00.000-0500` (소수 초 + UTC 오프셋)
//! 출력: `2024-01-02 10:00:00` (원본 오프셋 기준 벽시계 시각, 오프셋 제거)
//!
//! UTC로 변환하지 않습니다. 저장소의 기존 행들이 벽시계 시각을 쓰기 때문입니다.

use chrono::DateTime;
use chrono::format::{Item, StrftimeItems};

/// 정규화된 타임스탬프 형식
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// chrono 레이아웃 문자열이 유효한지 확인합니다.
pub fn is_valid_layout(layout: &str) -> bool {
    !layout.is_empty() && !StrftimeItems::new(layout).any(|item| matches!(item, Item::Error))
}

/// 원시 타임스탬프를 `layout`으로 파싱해 정규 형식으로 다시 씁니다.
///
/// 패턴에는 맞지만 실제 날짜/시각이 아닌 값(13월 등)은 에러입니다.
pub fn normalize(raw: &str, layout: &str) -> Result<String, chrono::ParseError> {
    let parsed = DateTime::parse_from_str(raw, layout)?;
    Ok(parsed.naive_local().format(CANONICAL_FORMAT).to_string())
}
