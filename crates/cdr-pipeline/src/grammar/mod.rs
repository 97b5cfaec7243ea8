//! 라인 문법 -- 교환기 로그 한 줄을 CDR 레코드로 변환
//!
//! [`LineGrammar`]는 유형 태그(`BEG`/`UPD`/`END`)로 패턴을 선택하고,
//! 패턴의 이름 있는 캡처 그룹을 레코드 필드에 1:1로 대응시킵니다.
//! I/O가 없는 순수 함수이며, 매칭 실패는 에러가 아니라 [`LineRejection`] 값입니다.
//!
//! # 라인 형식
//! ```text
//! 2024-01-02 10:00:00.000-0500,BEG,SessionId='S1',LegId='L1',StartTime='t1',...
//! ```
//!
//! # 사용 예시
//! ```ignore
//! use cdrflow_core::config::LogGeneration;
//! use cdrflow_pipeline::grammar::LineGrammar;
//!
//! let grammar = LineGrammar::new(LogGeneration::Current, "%Y-%m-%d %H:%M:%S%.f%z")?;
//! match grammar.parse_line(line) {
//!     Ok(record) => records.push(record),
//!     Err(rejection) => tracing::debug!(reason = rejection.reason(), "line skipped"),
//! }
//! ```

pub mod patterns;
pub mod timestamp;

use std::fmt;

use cdrflow_core::config::LogGeneration;
use cdrflow_core::types::{CdrRecord, RecordType};

use crate::error::IngestError;
use patterns::CompiledPattern;

/// 유형 태그 로그 출력 시 최대 길이
const MAX_TAG_DISPLAY: usize = 16;

/// 라인을 레코드로 만들지 못한 사유
///
/// 배치를 중단시키지 않습니다. 파일 처리기가 집계하고 건너뜁니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRejection {
    /// 빈 라인 (공백만 있는 라인 포함)
    Blank,
    /// 알려진 유형 태그가 없음
    UnknownType {
        /// 두 번째 절에서 추정한 태그 (로그용)
        tag: String,
    },
    /// 유형 태그는 있으나 해당 문법과 맞지 않음
    Mismatch {
        /// 감지된 레코드 유형
        record_type: RecordType,
    },
    /// 타임스탬프가 형식에는 맞지만 유효한 시각이 아님
    BadTimestamp {
        /// 원시 타임스탬프
        raw: String,
    },
    /// 설정된 최대 라인 길이 초과
    TooLong {
        /// 라인 길이 (바이트)
        len: usize,
    },
}

impl LineRejection {
    /// 메트릭 레이블용 사유
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Blank => "blank",
            Self::UnknownType { .. } => "unknown_type",
            Self::Mismatch { .. } => "mismatch",
            Self::BadTimestamp { .. } => "bad_timestamp",
            Self::TooLong { .. } => "too_long",
        }
    }
}

impl fmt::Display for LineRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "blank line"),
            Self::UnknownType { tag } => write!(f, "unknown record type '{tag}'"),
            Self::Mismatch { record_type } => {
                write!(f, "line does not match the {record_type} grammar")
            }
            Self::BadTimestamp { raw } => write!(f, "invalid timestamp '{raw}'"),
            Self::TooLong { len } => write!(f, "line too long ({len} bytes)"),
        }
    }
}

/// 로그 세대별 라인 문법
///
/// 생성 시 세 가지 유형의 패턴을 한 번 컴파일하고 이후 공유합니다.
#[derive(Debug, Clone)]
pub struct LineGrammar {
    generation: LogGeneration,
    layout: String,
    begin: CompiledPattern,
    update: CompiledPattern,
    end: CompiledPattern,
}

impl LineGrammar {
    /// 세대와 타임스탬프 레이아웃으로 문법을 생성합니다.
    pub fn new(generation: LogGeneration, layout: impl Into<String>) -> Result<Self, IngestError> {
        let layout = layout.into();
        if !timestamp::is_valid_layout(&layout) {
            return Err(IngestError::Config {
                field: "timestamp_layout".to_owned(),
                reason: format!("'{layout}' is not a valid chrono layout"),
            });
        }

        Ok(Self {
            generation,
            layout,
            begin: CompiledPattern::compile(generation, RecordType::Begin)?,
            update: CompiledPattern::compile(generation, RecordType::Update)?,
            end: CompiledPattern::compile(generation, RecordType::End)?,
        })
    }

    /// 문법 세대
    pub fn generation(&self) -> LogGeneration {
        self.generation
    }

    fn pattern(&self, record_type: RecordType) -> &CompiledPattern {
        match record_type {
            RecordType::Begin => &self.begin,
            RecordType::Update => &self.update,
            RecordType::End => &self.end,
        }
    }

    /// 로그 한 줄을 파싱합니다.
    ///
    /// 절 값은 그대로 보존되며 빈 값은 `Some("")`입니다.
    /// 해당 유형 문법에 없는 필드는 `None`으로 남습니다.
    pub fn parse_line(&self, line: &str) -> Result<CdrRecord, LineRejection> {
        if line.trim().is_empty() {
            return Err(LineRejection::Blank);
        }

        let record_type = detect_type(line)?;
        let pattern = self.pattern(record_type);
        let caps = pattern
            .regex
            .captures(line)
            .ok_or(LineRejection::Mismatch { record_type })?;

        let group = |name: &str| caps.name(name).map(|m| m.as_str());
        let (Some(raw_ts), Some(session_id), Some(leg_id)) =
            (group("timestamp"), group("session_id"), group("leg_id"))
        else {
            return Err(LineRejection::Mismatch { record_type });
        };

        let timestamp = timestamp::normalize(raw_ts, &self.layout).map_err(|_| {
            LineRejection::BadTimestamp {
                raw: raw_ts.to_owned(),
            }
        })?;

        let mut record = CdrRecord::new(timestamp, record_type, session_id, leg_id);
        for clause in pattern.clauses {
            if let (Some(slot), Some(value)) =
                (record.optional_slot(clause.column), group(clause.column))
            {
                *slot = Some(value.to_owned());
            }
        }

        Ok(record)
    }

    /// 레코드를 해당 유형 문법의 절 순서로 다시 씁니다.
    ///
    /// 타임스탬프는 `.000`과 0 오프셋을 붙여 씁니다. 누락된 필드는 빈 값이 됩니다.
    /// 기본 레이아웃에서 `parse_line(render_line(r)) == r`이 성립합니다.
    pub fn render_line(&self, record: &CdrRecord) -> String {
        let offset = match self.generation {
            LogGeneration::Legacy => "-0000",
            LogGeneration::Current => "+0000",
        };
        let mut line = format!(
            "{}.000{},{},SessionId='{}',LegId='{}'",
            record.timestamp,
            offset,
            record.record_type.tag(),
            record.session_id,
            record.leg_id
        );

        let values = record.column_values();
        for clause in self.pattern(record.record_type).clauses {
            let value = CdrRecord::COLUMNS
                .iter()
                .position(|c| *c == clause.column)
                .and_then(|idx| values[idx])
                .unwrap_or("");
            if clause.quoted {
                line.push_str(&format!(",{}='{}'", clause.key, value));
            } else {
                line.push_str(&format!(",{}={}", clause.key, value));
            }
        }
        line
    }
}

/// `,TAG,` 절에서 레코드 유형을 찾습니다.
///
/// 여러 태그가 보이면 라인에서 가장 먼저 나오는 것을 사용합니다.
/// 값 안에 다른 유형 이름이 들어 있어도 실제 태그 절이 항상 앞에 있습니다.
fn detect_type(line: &str) -> Result<RecordType, LineRejection> {
    RecordType::ALL
        .into_iter()
        .filter_map(|t| line.find(&format!(",{},", t.tag())).map(|pos| (pos, t)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, t)| t)
        .ok_or_else(|| LineRejection::UnknownType {
            tag: line
                .split(',')
                .nth(1)
                .unwrap_or_default()
                .chars()
                .take(MAX_TAG_DISPLAY)
                .collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f%z";

    const BEG_LINE: &str = "2024-01-02 10:00:00.000-0500,BEG,SessionId='S1',LegId='L1',StartTime='t1',ConnectedTime='t2',Calling='1001',Called='2002',NAP='napA',Protocol='SIP',Direction='out'";

    const UPD_LINE: &str = "2024-01-02 10:00:30.250-0500,UPD,SessionId='S1',LegId='L1',Rtp:Rx='1500',Rtp:Tx='1498',T38:Rx='0',T38:Tx='0',Error:FromNetwork='0',Error:ToNetwork='2'";

    const END_LINE: &str = "2024-01-02 10:05:00.000-0500,END,SessionId='S1',LegId='L1',StartTime='t1',ConnectedTime='t2',EndTime='t3',FreedTime='t4',Duration='300',TerminationCause='NORMAL_CALL_CLEARING',TerminationSource='caller',Calling='1001',Called='2002',NAP='napA',Direction='out',Media='audio',Rtp:Rx='15000',Rtp:Tx='14980',T38:Rx='0',T38:Tx='0',Error:FromNetwork='0',Error:ToNetwork='0',MOS=4.3,NetworkQuality=good";

    fn current() -> LineGrammar {
        LineGrammar::new(LogGeneration::Current, LAYOUT).unwrap()
    }

    fn legacy() -> LineGrammar {
        LineGrammar::new(LogGeneration::Legacy, LAYOUT).unwrap()
    }

    #[test]
    fn parse_begin_line() {
        let record = current().parse_line(BEG_LINE).unwrap();
        assert_eq!(record.record_type, RecordType::Begin);
        assert_eq!(record.timestamp, "2024-01-02 10:00:00");
        assert_eq!(record.session_id, "S1");
        assert_eq!(record.leg_id, "L1");
        assert_eq!(record.calling.as_deref(), Some("1001"));
        assert_eq!(record.called.as_deref(), Some("2002"));
        assert_eq!(record.protocol.as_deref(), Some("SIP"));
        assert_eq!(record.direction.as_deref(), Some("out"));
        // END/UPD 전용 필드는 비어 있어야 함
        assert!(record.end_time.is_none());
        assert!(record.rtp_rx.is_none());
        assert!(record.mos.is_none());
    }

    #[test]
    fn parse_update_line() {
        let record = current().parse_line(UPD_LINE).unwrap();
        assert_eq!(record.record_type, RecordType::Update);
        assert_eq!(record.timestamp, "2024-01-02 10:00:30");
        assert_eq!(record.rtp_rx.as_deref(), Some("1500"));
        assert_eq!(record.error_to_network.as_deref(), Some("2"));
        assert!(record.calling.is_none());
    }

    #[test]
    fn parse_end_line_with_bare_values() {
        let record = current().parse_line(END_LINE).unwrap();
        assert_eq!(record.record_type, RecordType::End);
        assert_eq!(record.duration.as_deref(), Some("300"));
        assert_eq!(record.termination_cause.as_deref(), Some("NORMAL_CALL_CLEARING"));
        assert_eq!(record.mos.as_deref(), Some("4.3"));
        assert_eq!(record.network_quality.as_deref(), Some("good"));
        assert!(record.protocol.is_none());
    }

    #[test]
    fn begin_accepts_prefix_text() {
        let line = format!("cdr-node-2: {BEG_LINE}");
        let record = current().parse_line(&line).unwrap();
        assert_eq!(record.session_id, "S1");
    }

    #[test]
    fn update_requires_line_start() {
        let line = format!("cdr-node-2: {UPD_LINE}");
        assert_eq!(
            current().parse_line(&line),
            Err(LineRejection::Mismatch {
                record_type: RecordType::Update
            })
        );
    }

    #[test]
    fn end_requires_line_start() {
        let line = format!("x{END_LINE}");
        assert!(matches!(
            current().parse_line(&line),
            Err(LineRejection::Mismatch { .. })
        ));
    }

    #[test]
    fn empty_called_is_kept_as_empty() {
        let line = BEG_LINE.replace("Called='2002'", "Called=''");
        let record = current().parse_line(&line).unwrap();
        assert_eq!(record.called.as_deref(), Some(""));
    }

    #[test]
    fn legacy_rejects_empty_called_but_allows_empty_counters() {
        let line = BEG_LINE.replace("Called='2002'", "Called=''");
        assert!(matches!(
            legacy().parse_line(&line),
            Err(LineRejection::Mismatch { .. })
        ));

        let line = END_LINE.replace("Media='audio'", "Media=''");
        let record = legacy().parse_line(&line).unwrap();
        assert_eq!(record.media.as_deref(), Some(""));
    }

    #[test]
    fn legacy_rejects_positive_offset() {
        let line = BEG_LINE.replace("-0500", "+0900");
        assert!(legacy().parse_line(&line).is_err());
        assert!(current().parse_line(&line).is_ok());
    }

    #[test]
    fn non_numeric_placeholders_are_text() {
        let line = END_LINE.replace("MOS=4.3", "MOS=N/A");
        let record = current().parse_line(&line).unwrap();
        assert_eq!(record.mos.as_deref(), Some("N/A"));
    }

    #[test]
    fn unknown_type_is_rejected_with_tag() {
        let line = "2024-01-02 10:00:00.000-0500,REG,SessionId='S1',LegId='L1'";
        assert_eq!(
            current().parse_line(line),
            Err(LineRejection::UnknownType {
                tag: "REG".to_owned()
            })
        );
    }

    #[test]
    fn tag_inside_value_does_not_confuse_detection() {
        // Calling 값에 END가 있어도 BEG 절이 먼저 나옴
        let line = BEG_LINE.replace("Calling='1001'", "Calling='x,END,y'");
        let record = current().parse_line(&line).unwrap();
        assert_eq!(record.record_type, RecordType::Begin);
        assert_eq!(record.calling.as_deref(), Some("x,END,y"));
    }

    #[test]
    fn substring_without_clause_is_not_a_tag() {
        let line = "BEGIN of maintenance window";
        assert!(matches!(
            current().parse_line(line),
            Err(LineRejection::UnknownType { .. })
        ));
    }

    #[test]
    fn blank_lines_are_rejected() {
        assert_eq!(current().parse_line(""), Err(LineRejection::Blank));
        assert_eq!(current().parse_line("   \t"), Err(LineRejection::Blank));
    }

    #[test]
    fn impossible_timestamp_is_bad_timestamp() {
        let line = BEG_LINE.replace("2024-01-02 10:00:00.000", "2024-13-45 10:00:00.000");
        assert!(matches!(
            current().parse_line(&line),
            Err(LineRejection::BadTimestamp { .. })
        ));
    }

    #[test]
    fn invalid_layout_is_config_error() {
        let result = LineGrammar::new(LogGeneration::Current, "%Y-%Q");
        assert!(matches!(result, Err(IngestError::Config { .. })));
    }

    #[test]
    fn render_line_reproduces_clause_order() {
        let grammar = current();
        let record = grammar.parse_line(END_LINE).unwrap();
        let rendered = grammar.render_line(&record);
        assert!(rendered.starts_with("2024-01-02 10:05:00.000+0000,END,SessionId='S1'"));
        assert!(rendered.ends_with(",MOS=4.3,NetworkQuality=good"));
        assert_eq!(grammar.parse_line(&rendered).unwrap(), record);
    }

    #[test]
    fn rejection_reasons_are_stable() {
        assert_eq!(LineRejection::Blank.reason(), "blank");
        assert_eq!(LineRejection::TooLong { len: 10 }.reason(), "too_long");
        assert!(LineRejection::TooLong { len: 10 }.to_string().contains("10"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn value(non_empty: bool) -> impl Strategy<Value = String> {
            if non_empty {
                "[A-Za-z0-9_:./ -]{1,12}".boxed()
            } else {
                "[A-Za-z0-9_:./ -]{0,12}".boxed()
            }
        }

        fn bare_value() -> impl Strategy<Value = String> {
            "[A-Za-z0-9_./-]{0,8}"
        }

        fn record_strategy(
            generation: LogGeneration,
        ) -> impl Strategy<Value = CdrRecord> {
            let legacy = generation == LogGeneration::Legacy;
            (
                prop::sample::select(RecordType::ALL.to_vec()),
                (2000i32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60),
                "[A-Za-z0-9-]{1,16}",
                "[A-Za-z0-9-]{1,16}",
                prop::collection::vec(value(true), 20),
                prop::collection::vec(value(false), 20),
                (bare_value(), bare_value()),
            )
                .prop_map(
                    move |(record_type, (y, mo, d, h, mi, s), session, leg, full, sparse, bare)| {
                        let ts = format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}");
                        let mut record = CdrRecord::new(ts, record_type, session, leg);
                        let clauses = patterns::clauses(record_type);
                        for (i, clause) in clauses.iter().enumerate() {
                            let v = if !clause.quoted {
                                if clause.column == "mos" { bare.0.clone() } else { bare.1.clone() }
                            } else if legacy && !clause.legacy_may_be_empty {
                                full[i].clone()
                            } else {
                                sparse[i].clone()
                            };
                            if let Some(slot) = record.optional_slot(clause.column) {
                                *slot = Some(v);
                            }
                        }
                        record
                    },
                )
        }

        proptest! {
            #[test]
            fn current_render_then_parse_roundtrips(record in record_strategy(LogGeneration::Current)) {
                let grammar = current();
                let line = grammar.render_line(&record);
                prop_assert_eq!(grammar.parse_line(&line), Ok(record));
            }

            #[test]
            fn legacy_render_then_parse_roundtrips(record in record_strategy(LogGeneration::Legacy)) {
                let grammar = legacy();
                let line = grammar.render_line(&record);
                prop_assert_eq!(grammar.parse_line(&line), Ok(record));
            }

            #[test]
            fn arbitrary_text_never_panics(line in ".{0,400}") {
                let _ = current().parse_line(&line);
                let _ = legacy().parse_line(&line);
            }

            #[test]
            fn unknown_tags_are_skipped(tag in "[A-Z]{3}") {
                prop_assume!(RecordType::from_tag(&tag).is_none());
                let line = BEG_LINE.replace(",BEG,", &format!(",{tag},"));
                let is_unknown = matches!(
                    current().parse_line(&line),
                    Err(LineRejection::UnknownType { .. })
                );
                prop_assert!(is_unknown);
            }
        }
    }
}
