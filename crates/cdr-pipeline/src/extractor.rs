//! 배치 파일 이동과 압축 해제
//!
//! 배치 하나의 디렉토리 간 생명주기를 담당합니다.
//!
//! ```text
//! drop/<name>.gz --claim--> work/<name>.gz --extract--> work/<name>
//!                                 |
//!                                 +--archive--> archive/<name>.gz   (전체 성공)
//!                                 +--return---> drop/<name>.gz      (실패)
//! ```
//!
//! 드롭 디렉토리에서 작업 디렉토리로의 이동이 배타적 점유 연산입니다.
//! 모든 이동은 hard link 후 원본 삭제로 이루어지며 기존 파일을 덮어쓰지 않습니다.
//! 원본이 `NotFound`이면 다른 태스크가 이미 점유한 것이므로 조용히 빠집니다.
//! 작업 디렉토리에 같은 이름이 있으면 (같은 이름으로 다시 떨어진 배치) 점유하지 않고
//! 드롭 디렉토리에 남겨 다음 일괄 처리에 맡깁니다.
//! 아카이브/반환 대상에 같은 이름이 있으면 `<stem>-<uuid><suffix>`로 옮겨 둘 다 보존합니다.
//! 압축 해제는 고유 이름의 `.part` 임시 파일에 쓴 뒤 rename하므로
//! 중간 상태의 결과 파일이 노출되지 않습니다.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;

/// 압축 해제 버퍼 크기
const COPY_BUF_SIZE: usize = 64 * 1024;

/// 임시 파일 이름 표식
const PART_MARKER: &str = ".part-";

/// 이 태스크가 점유한 배치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedBatch {
    /// 원래 파일 이름 (`batch1.gz`)
    pub name: String,
    /// 작업 디렉토리로 옮겨진 압축 파일
    pub claimed: PathBuf,
    /// 압축 해제 결과 경로 (확장자 제거)
    pub extracted: PathBuf,
}

/// 배치 이동/압축 해제기
#[derive(Debug, Clone)]
pub struct Extractor {
    config: IngestConfig,
}

impl Extractor {
    /// 수집 설정으로 생성합니다.
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// 수집 설정
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// 배치를 드롭 디렉토리에서 작업 디렉토리로 옮겨 점유합니다.
    ///
    /// `path`의 파일 이름만 사용하며 항상 드롭 디렉토리 기준으로 찾습니다.
    /// 이미 사라진 파일이면 `Ok(None)`을 반환합니다.
    pub async fn claim(&self, path: &Path) -> Result<Option<ClaimedBatch>, IngestError> {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(IngestError::Claim {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "batch path has no UTF-8 file name",
                ),
            });
        };
        let Some(stem) = name.strip_suffix(self.config.archive_suffix.as_str()) else {
            return Err(IngestError::Claim {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("missing '{}' suffix", self.config.archive_suffix),
                ),
            });
        };

        let source = self.config.drop_dir.join(name);
        let claimed = self.config.work_dir.join(name);
        match move_no_clobber(&source, &claimed).await {
            Ok(()) => {
                debug!(path = %source.display(), "batch claimed");
                Ok(Some(ClaimedBatch {
                    name: name.to_owned(),
                    extracted: self.config.work_dir.join(stem),
                    claimed,
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if same_file(&source, &claimed).await {
                    // 같은 배치를 다른 태스크가 점유하는 중
                    debug!(path = %source.display(), "batch claimed concurrently");
                } else {
                    warn!(
                        path = %source.display(),
                        in_flight = %claimed.display(),
                        "same-named batch already in work directory, left for next sweep"
                    );
                }
                Ok(None)
            }
            Err(source_err) => Err(IngestError::Claim {
                path: source,
                source: source_err,
            }),
        }
    }

    /// 점유한 배치를 압축 해제합니다.
    ///
    /// 실패 시 임시 파일을 지우고, 결과 경로에는 아무것도 남기지 않습니다.
    pub async fn extract(&self, batch: &ClaimedBatch) -> Result<(), IngestError> {
        let claimed = batch.claimed.clone();
        let extracted = batch.extracted.clone();
        let part = self.config.work_dir.join(format!(
            ".{}{}{}",
            batch.name,
            PART_MARKER,
            uuid::Uuid::new_v4()
        ));

        let result = tokio::task::spawn_blocking(move || {
            let outcome = decompress(&claimed, &part)
                .and_then(|bytes| {
                    std::fs::rename(&part, &extracted).map_err(|source| {
                        IngestError::ExtractWrite {
                            path: extracted.clone(),
                            source,
                        }
                    })?;
                    Ok(bytes)
                });
            if outcome.is_err() {
                // 실패한 임시 파일은 남기지 않음
                let _ = std::fs::remove_file(&part);
            }
            outcome
        })
        .await
        .map_err(|e| IngestError::Join(e.to_string()))?;

        let bytes = result?;
        debug!(
            path = %batch.extracted.display(),
            bytes,
            "batch extracted"
        );
        Ok(())
    }

    /// 처리 완료된 배치를 아카이브 디렉토리로 옮기고 압축 해제 결과를 지웁니다.
    ///
    /// 아카이브 경로를 반환합니다.
    pub async fn archive(&self, batch: &ClaimedBatch) -> Result<PathBuf, IngestError> {
        let dest = self
            .move_into(&batch.claimed, &self.config.archive_dir, &batch.name)
            .await
            .map_err(|source| IngestError::Archive {
                path: batch.claimed.clone(),
                dest: self.config.archive_dir.join(&batch.name),
                source,
            })?;

        self.discard_extracted(batch).await;
        Ok(dest)
    }

    /// 점유한 배치를 드롭 디렉토리로 되돌립니다.
    ///
    /// 같은 이름의 새 배치가 이미 있으면 다른 이름으로 되돌립니다. 되돌린 경로를 반환합니다.
    pub async fn return_to_drop(&self, batch: &ClaimedBatch) -> Result<PathBuf, IngestError> {
        Ok(self
            .move_into(&batch.claimed, &self.config.drop_dir, &batch.name)
            .await?)
    }

    /// 압축 해제 결과 파일을 지웁니다. 실패는 경고만 남깁니다.
    pub async fn discard_extracted(&self, batch: &ClaimedBatch) {
        match tokio::fs::remove_file(&batch.extracted).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %batch.extracted.display(),
                error = %e,
                "failed to remove extracted file"
            ),
        }
    }

    /// 드롭 디렉토리의 배치 파일 목록 (이름순)
    pub async fn list_pending(&self) -> Result<Vec<PathBuf>, IngestError> {
        self.list_batches(&self.config.drop_dir).await
    }

    /// 이전 실행에서 점유된 채 남은 배치를 드롭 디렉토리로 되돌립니다.
    ///
    /// 남은 `.part` 임시 파일도 지웁니다. 되돌린 파일 경로 목록을 반환합니다.
    pub async fn recover_orphans(&self) -> Result<Vec<PathBuf>, IngestError> {
        let mut recovered = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.starts_with('.') && name.contains(PART_MARKER) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to remove stale part file");
                }
                continue;
            }

            if !self.config.is_batch_path(&path) || !entry.file_type().await?.is_file() {
                continue;
            }

            let dest = self.move_into(&path, &self.config.drop_dir, name).await?;
            info!(path = %dest.display(), "orphaned batch returned to drop directory");
            recovered.push(dest);
        }
        recovered.sort();
        Ok(recovered)
    }

    /// `dir/name`으로 옮기되, 이미 있으면 고유 이름으로 옮깁니다. 실제 경로를 반환합니다.
    async fn move_into(&self, from: &Path, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
        let dest = dir.join(name);
        match move_no_clobber(from, &dest).await {
            Ok(()) => Ok(dest),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let alt = dir.join(self.alternate_name(name));
                warn!(
                    path = %dest.display(),
                    moved_to = %alt.display(),
                    "name already taken, keeping both files"
                );
                move_no_clobber(from, &alt).await?;
                Ok(alt)
            }
            Err(e) => Err(e),
        }
    }

    /// 충돌 시 이름: `batch1.gz` -> `batch1-<uuid>.gz`
    fn alternate_name(&self, name: &str) -> String {
        let id = uuid::Uuid::new_v4().simple();
        let suffix = self.config.archive_suffix.as_str();
        match name.strip_suffix(suffix) {
            Some(stem) => format!("{stem}-{id}{suffix}"),
            None => format!("{name}.{id}"),
        }
    }

    async fn list_batches(&self, dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let mut batches = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if self.config.is_batch_path(&path) && entry.file_type().await?.is_file() {
                batches.push(path);
            }
        }
        batches.sort();
        Ok(batches)
    }
}

/// `to`가 없을 때만 `from`을 `to`로 옮깁니다.
///
/// 대상이 이미 있으면 `AlreadyExists`로 실패하고 아무것도 바꾸지 않습니다.
async fn move_no_clobber(from: &Path, to: &Path) -> std::io::Result<()> {
    tokio::fs::hard_link(from, to).await?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        let _ = tokio::fs::remove_file(to).await;
        return Err(e);
    }
    Ok(())
}

/// 두 경로가 같은 파일인지 확인합니다. `a`가 이미 사라졌으면 참입니다.
async fn same_file(a: &Path, b: &Path) -> bool {
    let (a, b) = match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
        (Err(_), _) => return true,
        (Ok(a), Ok(b)) => (a, b),
        (Ok(_), Err(_)) => return false,
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        a.dev() == b.dev() && a.ino() == b.ino()
    }
    #[cfg(not(unix))]
    {
        a.len() == b.len() && a.modified().ok() == b.modified().ok()
    }
}

/// gzip 스트림 하나를 `dest`로 풀어 씁니다. 쓴 바이트 수를 반환합니다.
///
/// 읽기 쪽 에러는 압축 형식 에러, 쓰기 쪽 에러는 쓰기 에러로 구분합니다.
fn decompress(src: &Path, dest: &Path) -> Result<u64, IngestError> {
    let input = File::open(src).map_err(|source| IngestError::ExtractOpen {
        path: src.to_path_buf(),
        source,
    })?;
    let output = File::create(dest).map_err(|source| IngestError::ExtractWrite {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut decoder = GzDecoder::new(input);
    let mut writer = BufWriter::new(output);
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;

    let write_err = |source| IngestError::ExtractWrite {
        path: dest.to_path_buf(),
        source,
    };

    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(IngestError::Decompress {
                    path: src.to_path_buf(),
                    source,
                });
            }
        };
        writer.write_all(&buf[..n]).map_err(write_err)?;
        total += n as u64;
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfigBuilder;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    async fn setup() -> (tempfile::TempDir, Extractor) {
        let tmp = tempfile::tempdir().unwrap();
        let config = IngestConfigBuilder::new().root(tmp.path()).build().unwrap();
        config.ensure_dirs().await.unwrap();
        (tmp, Extractor::new(config))
    }

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    fn drop_file(extractor: &Extractor, name: &str, bytes: &[u8]) -> PathBuf {
        let path = extractor.config().drop_dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn claim_moves_into_work_dir() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"x"));

        let batch = extractor.claim(&path).await.unwrap().unwrap();
        assert_eq!(batch.name, "batch1.gz");
        assert!(batch.claimed.exists());
        assert!(!path.exists());
        assert_eq!(batch.extracted, extractor.config().work_dir.join("batch1"));
    }

    #[tokio::test]
    async fn second_claim_is_a_noop() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"x"));

        assert!(extractor.claim(&path).await.unwrap().is_some());
        assert!(extractor.claim(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redropped_name_does_not_replace_in_flight_claim() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", b"first");
        let batch = extractor.claim(&path).await.unwrap().unwrap();

        // 같은 이름의 다른 배치가 점유 중에 도착
        drop_file(&extractor, "batch1.gz", b"second");
        assert!(extractor.claim(&path).await.unwrap().is_none());

        assert_eq!(std::fs::read(&batch.claimed).unwrap(), b"first");
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn archive_keeps_earlier_archive_of_same_name() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"first\n"));
        let batch = extractor.claim(&path).await.unwrap().unwrap();
        let first = extractor.archive(&batch).await.unwrap();

        drop_file(&extractor, "batch1.gz", &gzip(b"second\n"));
        let batch = extractor.claim(&path).await.unwrap().unwrap();
        let second = extractor.archive(&batch).await.unwrap();

        assert_eq!(first, extractor.config().archive_dir.join("batch1.gz"));
        assert_ne!(first, second);
        let names = dir_names(&extractor.config().archive_dir);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"batch1.gz".to_owned()), "{names:?}");
        assert!(
            names.iter().any(|n| n.starts_with("batch1-") && n.ends_with(".gz")),
            "{names:?}"
        );
        assert_eq!(std::fs::read(&first).unwrap(), gzip(b"first\n"));
        assert_eq!(std::fs::read(&second).unwrap(), gzip(b"second\n"));
    }

    #[tokio::test]
    async fn return_to_drop_keeps_newer_batch_of_same_name() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", b"old");
        let batch = extractor.claim(&path).await.unwrap().unwrap();
        drop_file(&extractor, "batch1.gz", b"new");

        let dest = extractor.return_to_drop(&batch).await.unwrap();
        assert_ne!(dest, path);
        assert!(extractor.config().is_batch_path(&dest));
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert!(dir_names(&extractor.config().work_dir).is_empty());
    }

    #[tokio::test]
    async fn claim_rejects_wrong_suffix() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.txt", b"x");
        assert!(matches!(
            extractor.claim(&path).await,
            Err(IngestError::Claim { .. })
        ));
    }

    #[tokio::test]
    async fn extract_writes_plain_file() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"line one\nline two\n"));
        let batch = extractor.claim(&path).await.unwrap().unwrap();

        extractor.extract(&batch).await.unwrap();
        let content = std::fs::read(&batch.extracted).unwrap();
        assert_eq!(content, b"line one\nline two\n");
        // 임시 파일은 남지 않음
        assert_eq!(
            dir_names(&extractor.config().work_dir),
            vec!["batch1", "batch1.gz"]
        );
    }

    #[tokio::test]
    async fn corrupt_archive_leaves_no_output() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "bad.gz", b"this is not gzip at all");
        let batch = extractor.claim(&path).await.unwrap().unwrap();

        let err = extractor.extract(&batch).await.unwrap_err();
        assert!(matches!(err, IngestError::Decompress { .. }));
        assert!(!batch.extracted.exists());
        assert_eq!(dir_names(&extractor.config().work_dir), vec!["bad.gz"]);
    }

    #[tokio::test]
    async fn truncated_archive_is_decompress_error() {
        let (_tmp, extractor) = setup().await;
        let full = gzip(&b"2024-01-02 10:00:00.000-0500,BEG\n".repeat(100));
        let path = drop_file(&extractor, "cut.gz", &full[..full.len() / 2]);
        let batch = extractor.claim(&path).await.unwrap().unwrap();

        let err = extractor.extract(&batch).await.unwrap_err();
        assert!(matches!(err, IngestError::Decompress { .. }));
        assert!(!batch.extracted.exists());
    }

    #[tokio::test]
    async fn archive_moves_original_and_removes_extracted() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"data\n"));
        let batch = extractor.claim(&path).await.unwrap().unwrap();
        extractor.extract(&batch).await.unwrap();

        let dest = extractor.archive(&batch).await.unwrap();
        assert_eq!(dest, extractor.config().archive_dir.join("batch1.gz"));
        assert!(dest.exists());
        assert!(dir_names(&extractor.config().work_dir).is_empty());
        assert!(dir_names(&extractor.config().drop_dir).is_empty());
    }

    #[tokio::test]
    async fn return_to_drop_restores_original() {
        let (_tmp, extractor) = setup().await;
        let path = drop_file(&extractor, "batch1.gz", &gzip(b"data\n"));
        let batch = extractor.claim(&path).await.unwrap().unwrap();

        let dest = extractor.return_to_drop(&batch).await.unwrap();
        assert_eq!(dest, path);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn recover_orphans_returns_claimed_batches() {
        let (_tmp, extractor) = setup().await;
        let work = &extractor.config().work_dir;
        std::fs::write(work.join("a.gz"), gzip(b"a")).unwrap();
        std::fs::write(work.join("a"), b"a").unwrap();
        std::fs::write(work.join(".b.gz.part-1234"), b"partial").unwrap();

        let recovered = extractor.recover_orphans().await.unwrap();
        assert_eq!(recovered, vec![extractor.config().drop_dir.join("a.gz")]);
        // 압축 해제 결과는 그대로 둠 (재처리 시 덮어씀)
        assert_eq!(dir_names(work), vec!["a"]);
    }

    #[tokio::test]
    async fn list_pending_filters_and_sorts() {
        let (_tmp, extractor) = setup().await;
        drop_file(&extractor, "b.gz", b"");
        drop_file(&extractor, "a.gz", b"");
        drop_file(&extractor, "notes.txt", b"");
        std::fs::create_dir(extractor.config().drop_dir.join("dir.gz")).unwrap();

        let pending = extractor.list_pending().await.unwrap();
        let names: Vec<_> = pending
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.gz", "b.gz"]);
    }
}
