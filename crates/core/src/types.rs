//! 도메인 타입 -- CDR 레코드와 레코드 유형
//!
//! 교환기 로그 한 줄에서 추출된 통화 세션 이벤트를 [`CdrRecord`]로 표현합니다.
//! 모든 부가 필드는 문자열로 보관합니다. 상위 장비가 숫자 필드에
//! 비숫자 자리표시자를 내보내는 경우가 있기 때문입니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CDR 레코드 유형 (세션 이벤트 단계)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// 세션 시작 (`BEG`)
    #[default]
    #[serde(rename = "BEG")]
    Begin,
    /// 세션 중간 갱신 (`UPD`)
    #[serde(rename = "UPD")]
    Update,
    /// 세션 종료 (`END`)
    #[serde(rename = "END")]
    End,
}

impl RecordType {
    /// 모든 레코드 유형
    pub const ALL: [RecordType; 3] = [RecordType::Begin, RecordType::Update, RecordType::End];

    /// 로그 라인에 나타나는 유형 태그
    pub fn tag(self) -> &'static str {
        match self {
            Self::Begin => "BEG",
            Self::Update => "UPD",
            Self::End => "END",
        }
    }

    /// 유형 태그를 레코드 유형으로 변환합니다. 알 수 없는 태그는 `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BEG" => Some(Self::Begin),
            "UPD" => Some(Self::Update),
            "END" => Some(Self::End),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown record type tag '{s}'"))
    }
}

/// CDR 레코드 -- 로그 한 줄에서 매칭된 세션 이벤트 하나
///
/// `timestamp`, `record_type`, `session_id`, `leg_id`는 항상 존재합니다.
/// 나머지 필드는 해당 유형의 문법에 없으면 `None`이며, 로그에 빈 값으로
/// 기록된 경우 `Some("")`로 보존됩니다 (빈 값과 누락은 구분됩니다).
///
/// 레코드 간 병합이나 세션 단위 상관 분석은 하지 않습니다.
/// (session_id, leg_id, type, timestamp)가 암묵적인 키입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrRecord {
    /// 이벤트 시각 (`YYYY-MM-DD HH:MM:SS`로 정규화됨)
    pub timestamp: String,
    /// 레코드 유형
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// 세션 ID
    pub session_id: String,
    /// 레그 ID
    pub leg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_source: Option<String>,
    /// 발신 번호
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling: Option<String>,
    /// 착신 번호 (연결 전이면 빈 값일 수 있음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called: Option<String>,
    /// 네트워크 접속점 (트렁크/라우트 식별자)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nap: Option<String>,
    /// 시그널링 프로토콜 (BEG 레코드에만 존재)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_rx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t38_rx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t38_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_from_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_to_network: Option<String>,
    /// 평균 통화 품질 점수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_quality: Option<String>,
}

impl CdrRecord {
    /// 저장 컬럼 순서. 저장 싱크와 echo 싱크가 동일한 순서를 사용합니다.
    pub const COLUMNS: [&'static str; 25] = [
        "timestamp",
        "type",
        "session_id",
        "leg_id",
        "start_time",
        "connected_time",
        "end_time",
        "freed_time",
        "duration",
        "termination_cause",
        "termination_source",
        "calling",
        "called",
        "nap",
        "protocol",
        "direction",
        "media",
        "rtp_rx",
        "rtp_tx",
        "t38_rx",
        "t38_tx",
        "error_from_network",
        "error_to_network",
        "mos",
        "network_quality",
    ];

    /// 필수 필드만 채운 레코드를 생성합니다.
    pub fn new(
        timestamp: impl Into<String>,
        record_type: RecordType,
        session_id: impl Into<String>,
        leg_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            record_type,
            session_id: session_id.into(),
            leg_id: leg_id.into(),
            ..Self::default()
        }
    }

    /// [`COLUMNS`](Self::COLUMNS) 순서의 컬럼 값을 반환합니다.
    pub fn column_values(&self) -> [Option<&str>; 25] {
        [
            Some(self.timestamp.as_str()),
            Some(self.record_type.tag()),
            Some(self.session_id.as_str()),
            Some(self.leg_id.as_str()),
            self.start_time.as_deref(),
            self.connected_time.as_deref(),
            self.end_time.as_deref(),
            self.freed_time.as_deref(),
            self.duration.as_deref(),
            self.termination_cause.as_deref(),
            self.termination_source.as_deref(),
            self.calling.as_deref(),
            self.called.as_deref(),
            self.nap.as_deref(),
            self.protocol.as_deref(),
            self.direction.as_deref(),
            self.media.as_deref(),
            self.rtp_rx.as_deref(),
            self.rtp_tx.as_deref(),
            self.t38_rx.as_deref(),
            self.t38_tx.as_deref(),
            self.error_from_network.as_deref(),
            self.error_to_network.as_deref(),
            self.mos.as_deref(),
            self.network_quality.as_deref(),
        ]
    }

    /// 컬럼 이름으로 선택 필드의 가변 슬롯을 찾습니다.
    ///
    /// 필수 필드(`timestamp`, `type`, `session_id`, `leg_id`)와
    /// 알 수 없는 이름은 `None`을 반환합니다.
    pub fn optional_slot(&mut self, column: &str) -> Option<&mut Option<String>> {
        let slot = match column {
            "start_time" => &mut self.start_time,
            "connected_time" => &mut self.connected_time,
            "end_time" => &mut self.end_time,
            "freed_time" => &mut self.freed_time,
            "duration" => &mut self.duration,
            "termination_cause" => &mut self.termination_cause,
            "termination_source" => &mut self.termination_source,
            "calling" => &mut self.calling,
            "called" => &mut self.called,
            "nap" => &mut self.nap,
            "protocol" => &mut self.protocol,
            "direction" => &mut self.direction,
            "media" => &mut self.media,
            "rtp_rx" => &mut self.rtp_rx,
            "rtp_tx" => &mut self.rtp_tx,
            "t38_rx" => &mut self.t38_rx,
            "t38_tx" => &mut self.t38_tx,
            "error_from_network" => &mut self.error_from_network,
            "error_to_network" => &mut self.error_to_network,
            "mos" => &mut self.mos,
            "network_quality" => &mut self.network_quality,
            _ => return None,
        };
        Some(slot)
    }

    /// 멱등 키 (session_id, leg_id, type, timestamp)
    pub fn idempotency_key(&self) -> (&str, &str, RecordType, &str) {
        (
            &self.session_id,
            &self.leg_id,
            self.record_type,
            &self.timestamp,
        )
    }
}

impl fmt::Display for CdrRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} session={} leg={}",
            self.record_type, self.timestamp, self.session_id, self.leg_id,
        )
    }
}
