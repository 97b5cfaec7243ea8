//! 레코드 유형별 절(clause) 테이블과 정규식 생성
//!
//! 각 문법은 (세대, 유형 태그)로 선택되는 고정된 절 목록입니다.
//! 모든 라인은 `타임스탬프,태그,SessionId='..',LegId='..'`로 시작하고
//! 그 뒤에 유형별 절이 고정 순서로 이어집니다.
//! 캡처 그룹 이름은 [`CdrRecord::COLUMNS`](cdrflow_core::types::CdrRecord::COLUMNS)의
//! 컬럼 이름과 같습니다.

use cdrflow_core::config::LogGeneration;
use cdrflow_core::types::RecordType;
use regex::Regex;

/// 절 하나: `key='value'` 또는 `key=value`
#[derive(Debug, Clone, Copy)]
pub struct Clause {
    /// 로그 라인의 키
    pub key: &'static str,
    /// 레코드 컬럼 이름 (캡처 그룹 이름)
    pub column: &'static str,
    /// 값을 작은따옴표로 감싸는지 여부
    pub quoted: bool,
    /// legacy 세대에서 빈 값을 허용하는지 여부
    pub legacy_may_be_empty: bool,
}

const fn quoted(key: &'static str, column: &'static str) -> Clause {
    Clause {
        key,
        column,
        quoted: true,
        legacy_may_be_empty: false,
    }
}

const fn quoted_lenient(key: &'static str, column: &'static str) -> Clause {
    Clause {
        key,
        column,
        quoted: true,
        legacy_may_be_empty: true,
    }
}

const fn bare(key: &'static str, column: &'static str) -> Clause {
    Clause {
        key,
        column,
        quoted: false,
        legacy_may_be_empty: true,
    }
}

/// BEG: 세션 시작
pub const BEGIN_CLAUSES: &[Clause] = &[
    quoted("StartTime", "start_time"),
    quoted("ConnectedTime", "connected_time"),
    quoted("Calling", "calling"),
    quoted("Called", "called"),
    quoted("NAP", "nap"),
    quoted("Protocol", "protocol"),
    quoted("Direction", "direction"),
];

/// UPD: 미디어 카운터 갱신
pub const UPDATE_CLAUSES: &[Clause] = &[
    quoted("Rtp:Rx", "rtp_rx"),
    quoted("Rtp:Tx", "rtp_tx"),
    quoted("T38:Rx", "t38_rx"),
    quoted("T38:Tx", "t38_tx"),
    quoted("Error:FromNetwork", "error_from_network"),
    quoted("Error:ToNetwork", "error_to_network"),
];

/// END: 세션 종료 (품질 지표 포함)
pub const END_CLAUSES: &[Clause] = &[
    quoted("StartTime", "start_time"),
    quoted("ConnectedTime", "connected_time"),
    quoted("EndTime", "end_time"),
    quoted("FreedTime", "freed_time"),
    quoted("Duration", "duration"),
    quoted("TerminationCause", "termination_cause"),
    quoted("TerminationSource", "termination_source"),
    quoted("Calling", "calling"),
    quoted("Called", "called"),
    quoted_lenient("NAP", "nap"),
    quoted_lenient("Direction", "direction"),
    quoted_lenient("Media", "media"),
    quoted_lenient("Rtp:Rx", "rtp_rx"),
    quoted_lenient("Rtp:Tx", "rtp_tx"),
    quoted_lenient("T38:Rx", "t38_rx"),
    quoted_lenient("T38:Tx", "t38_tx"),
    quoted_lenient("Error:FromNetwork", "error_from_network"),
    quoted_lenient("Error:ToNetwork", "error_to_network"),
    bare("MOS", "mos"),
    bare("NetworkQuality", "network_quality"),
];

/// 레코드 유형의 절 목록
pub fn clauses(record_type: RecordType) -> &'static [Clause] {
    match record_type {
        RecordType::Begin => BEGIN_CLAUSES,
        RecordType::Update => UPDATE_CLAUSES,
        RecordType::End => END_CLAUSES,
    }
}

/// 라인 시작부터 매칭해야 하는 유형인지 여부
///
/// BEG 라인 앞에는 상위 장비가 붙인 접두 텍스트가 올 수 있습니다.
pub fn is_anchored(record_type: RecordType) -> bool {
    !matches!(record_type, RecordType::Begin)
}

fn timestamp_pattern(generation: LogGeneration) -> &'static str {
    match generation {
        LogGeneration::Legacy => r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d+-\d{4}",
        LogGeneration::Current => r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d+[+-]\d{4}",
    }
}

fn value_pattern(generation: LogGeneration, clause: &Clause, last: bool) -> &'static str {
    if !clause.quoted {
        // 마지막 bare 절은 라인 끝까지
        return if last { ".*" } else { "[^,]*" };
    }
    match generation {
        LogGeneration::Legacy if !clause.legacy_may_be_empty => "[^']+",
        _ => "[^']*",
    }
}

/// (세대, 유형)에 해당하는 정규식 소스를 만듭니다.
pub fn pattern_source(generation: LogGeneration, record_type: RecordType) -> String {
    let mut src = String::with_capacity(512);
    if is_anchored(record_type) {
        src.push('^');
    }
    src.push_str("(?P<timestamp>");
    src.push_str(timestamp_pattern(generation));
    src.push_str("),");
    src.push_str(record_type.tag());
    src.push_str(",SessionId='(?P<session_id>[^']+)',LegId='(?P<leg_id>[^']+)'");

    let clauses = clauses(record_type);
    for (i, clause) in clauses.iter().enumerate() {
        let value = value_pattern(generation, clause, i + 1 == clauses.len());
        src.push(',');
        src.push_str(&regex::escape(clause.key));
        if clause.quoted {
            src.push_str(&format!("='(?P<{}>{})'", clause.column, value));
        } else {
            src.push_str(&format!("=(?P<{}>{})", clause.column, value));
        }
    }
    src
}

/// 컴파일된 유형별 패턴
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub record_type: RecordType,
    pub regex: Regex,
    pub clauses: &'static [Clause],
}

impl CompiledPattern {
    /// (세대, 유형)에 해당하는 패턴을 컴파일합니다.
    pub fn compile(
        generation: LogGeneration,
        record_type: RecordType,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            record_type,
            regex: Regex::new(&pattern_source(generation, record_type))?,
            clauses: clauses(record_type),
        })
    }
}
