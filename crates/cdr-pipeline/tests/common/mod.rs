//! 통합 테스트 공용 헬퍼 -- 인메모리 싱크, 임시 디렉토리 트리, gzip 배치 생성

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cdrflow_core::error::{CdrflowError, StorageError};
use cdrflow_core::pipeline::RecordSink;
use cdrflow_core::types::CdrRecord;
use cdrflow_pipeline::{IngestConfig, IngestConfigBuilder};

pub const BEG_LINE: &str = "2024-01-02 10:00:00.000-0500,BEG,SessionId='S1',LegId='L1',StartTime='t1',ConnectedTime='t2',Calling='1001',Called='2002',NAP='napA',Protocol='SIP',Direction='out'";

pub const UPD_LINE: &str = "2024-01-02 10:00:30.000-0500,UPD,SessionId='S1',LegId='L1',Rtp:Rx='1500',Rtp:Tx='1498',T38:Rx='0',T38:Tx='0',Error:FromNetwork='0',Error:ToNetwork='0'";

pub const END_LINE: &str = "2024-01-02 10:05:00.000-0500,END,SessionId='S1',LegId='L1',StartTime='t1',ConnectedTime='t2',EndTime='t3',FreedTime='t4',Duration='300',TerminationCause='16',TerminationSource='caller',Calling='1001',Called='2002',NAP='napA',Direction='out',Media='audio',Rtp:Rx='15000',Rtp:Tx='14980',T38:Rx='0',T38:Tx='0',Error:FromNetwork='0',Error:ToNetwork='0',MOS=4.3,NetworkQuality=good";

/// 제출된 배치를 메모리에 보관하는 싱크
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<CdrRecord>)>>,
    fail: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 제출을 모두 실패시킵니다.
    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<(String, Vec<CdrRecord>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<CdrRecord> {
        self.batches()
            .into_iter()
            .flat_map(|(_, records)| records)
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, source: &str, records: Vec<CdrRecord>) -> Result<usize, CdrflowError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Query("injected failure".to_owned()).into());
        }
        let n = records.len();
        self.batches
            .lock()
            .unwrap()
            .push((source.to_owned(), records));
        Ok(n)
    }
}

/// drop/work/archive 디렉토리를 가진 임시 트리
pub struct Scratch {
    pub dir: tempfile::TempDir,
    pub config: IngestConfig,
}

impl Scratch {
    pub fn new() -> Self {
        Self::with(|b| b)
    }

    pub fn with(f: impl FnOnce(IngestConfigBuilder) -> IngestConfigBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = f(IngestConfigBuilder::new().root(dir.path()).settle_ms(50))
            .build()
            .unwrap();
        for d in [&config.drop_dir, &config.work_dir, &config.archive_dir] {
            std::fs::create_dir_all(d).unwrap();
        }
        Self { dir, config }
    }

    /// 드롭 디렉토리에 gzip 배치를 씁니다.
    pub fn drop_batch(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.config.drop_dir.join(name);
        std::fs::write(&path, gzip_lines(lines)).unwrap();
        path
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("cdr.db")
    }

    pub fn drop_names(&self) -> Vec<String> {
        dir_names(&self.config.drop_dir)
    }

    pub fn work_names(&self) -> Vec<String> {
        dir_names(&self.config.work_dir)
    }

    pub fn archive_names(&self) -> Vec<String> {
        dir_names(&self.config.archive_dir)
    }
}

pub fn gzip_lines(lines: &[&str]) -> Vec<u8> {
    let mut content = lines.join("\n");
    content.push('\n');
    gzip(content.as_bytes())
}

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

pub fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// 조건이 참이 될 때까지 최대 `timeout` 동안 기다립니다.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
