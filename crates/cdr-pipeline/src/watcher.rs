//! 드롭 디렉토리 감시
//!
//! [`DirectoryWatcher`]는 드롭 디렉토리의 쓰기 알림을 받아 배치마다
//! 수집 태스크 하나를 스케줄합니다.
//!
//! # 동작 순서
//! 1. 알림 구독 생성 (네이티브 백엔드, 실패 시 폴링 백엔드)
//! 2. 시작 시 일괄 처리: 기존 파일마다 태스크를 띄우고 모두 끝날 때까지 대기
//! 3. 감시 루프: 쓰기 알림이 `settle_ms` 동안 조용하면 태스크를 분리 실행
//!
//! 구독을 먼저 만들기 때문에 일괄 처리 중 도착한 알림은 채널에 쌓입니다.
//! 같은 파일이 두 번 스케줄되어도 점유 이동이 한 번만 성공하므로 안전합니다.
//! 실패해서 드롭 디렉토리로 되돌아온 배치는 다음 일괄 처리나 새 쓰기 전까지
//! 다시 스케줄하지 않습니다.
//! 알림 채널 에러는 로그를 남기고 디렉토리를 다시 훑을 뿐 루프를 멈추지 않습니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cdrflow_core::metrics as m;
use cdrflow_core::pipeline::RecordSink;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind};
use notify::{Config as NotifyConfig, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::pipeline::IngestPipeline;

/// 안정화 대기 확인 주기 하한
const MIN_TICK: Duration = Duration::from_millis(10);

/// 사용 중인 알림 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    Native,
    Poll,
}

enum ActiveWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl ActiveWatcher {
    fn backend(&self) -> WatchBackend {
        match self {
            Self::Native(_) => WatchBackend::Native,
            Self::Poll(_) => WatchBackend::Poll,
        }
    }

    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Self::Native(w) => w.watch(path, RecursiveMode::NonRecursive),
            Self::Poll(w) => w.watch(path, RecursiveMode::NonRecursive),
        }
    }
}

/// 알림 하나가 배치에 주는 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteSignal {
    /// 쓰기 진행 중: 안정화 대기 시작/연장
    Pending,
    /// 쓰기 종료: 즉시 스케줄
    Ready,
    /// 파일 등장 (폴링 백엔드의 생성): 되돌린 배치가 아니면 안정화 대기
    Appeared,
    Ignore,
}

/// 알림 종류를 쓰기 신호로 분류합니다.
///
/// 네이티브 백엔드에서 생성 알림만으로는 스케줄하지 않습니다 (생성 후 쓰는 도구 대응).
/// 폴링 백엔드는 쓰기를 mtime 변경이나 생성으로만 알려 줍니다. 생성은 드롭
/// 디렉토리로 되돌린 배치에도 발생하므로 [`WriteSignal::Appeared`]로 구분합니다.
/// rename 알림은 무시합니다.
fn classify(kind: &EventKind, backend: WatchBackend) -> WriteSignal {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => WriteSignal::Ready,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => WriteSignal::Pending,
        EventKind::Modify(ModifyKind::Metadata(_)) if backend == WatchBackend::Poll => {
            WriteSignal::Pending
        }
        EventKind::Create(_) if backend == WatchBackend::Poll => WriteSignal::Appeared,
        _ => WriteSignal::Ignore,
    }
}

/// 드롭 디렉토리 감시기
pub struct DirectoryWatcher<S> {
    pipeline: Arc<IngestPipeline<S>>,
}

impl<S: RecordSink> DirectoryWatcher<S> {
    /// 파이프라인을 공유하는 감시기를 생성합니다.
    pub fn new(pipeline: Arc<IngestPipeline<S>>) -> Self {
        Self { pipeline }
    }

    /// 드롭 디렉토리의 기존 배치를 모두 처리하고 끝날 때까지 기다립니다.
    ///
    /// 스케줄한 배치 수를 반환합니다.
    pub async fn sweep(&self) -> Result<usize, IngestError> {
        self.pipeline.clear_returned();
        let pending = self.pipeline.extractor().list_pending().await?;
        let count = pending.len();
        if count > 0 {
            info!(count, "sweeping pre-existing batches");
        }

        let mut tasks = JoinSet::new();
        for path in pending {
            let pipeline = Arc::clone(&self.pipeline);
            metrics::counter!(m::WATCHER_BATCHES_SCHEDULED_TOTAL).increment(1);
            tasks.spawn(async move { pipeline.run_task(path).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "sweep task panicked");
            }
        }
        Ok(count)
    }

    /// 감시 루프를 실행합니다. `cancel`이 취소될 때까지 반환하지 않습니다.
    ///
    /// 알림 구독을 만들 수 없으면 에러를 반환합니다.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), IngestError> {
        let config = self.pipeline.config().clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = create_watcher(tx, config.poll_interval())?;
        watcher.watch(&config.drop_dir).map_err(|e| {
            IngestError::Watch(format!("cannot watch {}: {e}", config.drop_dir.display()))
        })?;
        let backend = watcher.backend();
        info!(
            path = %config.drop_dir.display(),
            backend = ?backend,
            "watching drop directory"
        );

        if config.startup_sweep {
            self.sweep().await?;
        }

        let settle = config.settle();
        let mut tick = tokio::time::interval((settle / 2).max(MIN_TICK));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(pending = pending.len(), "watcher stopping");
                    break;
                }
                received = rx.recv() => {
                    let Some(result) = received else {
                        // 발신자는 watcher가 살아 있는 동안 유지됨
                        return Err(IngestError::Watch("notification channel closed".to_owned()));
                    };
                    self.handle(result, backend, &mut pending).await;
                }
                _ = tick.tick() => {
                    for path in self.take_settled(&mut pending, settle) {
                        self.schedule(path);
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    async fn handle(
        &self,
        result: notify::Result<Event>,
        backend: WatchBackend,
        pending: &mut HashMap<PathBuf, Instant>,
    ) {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "notification channel error, rescanning drop directory");
                metrics::counter!(m::WATCHER_ERRORS_TOTAL).increment(1);
                self.rescan(pending).await;
                return;
            }
        };

        if event.need_rescan() {
            debug!("notification backend requested rescan");
            self.rescan(pending).await;
            return;
        }

        let signal = classify(&event.kind, backend);
        if signal == WriteSignal::Ignore {
            return;
        }

        let config = self.pipeline.config();
        for path in event.paths {
            if !config.is_batch_path(&path) {
                continue;
            }
            match signal {
                WriteSignal::Ready => {
                    self.pipeline.forget_returned(&path);
                    pending.remove(&path);
                    self.schedule(path);
                }
                WriteSignal::Pending => {
                    self.pipeline.forget_returned(&path);
                    pending.insert(path, Instant::now());
                }
                WriteSignal::Appeared => {
                    if self.pipeline.was_returned(&path) {
                        debug!(path = %path.display(), "returned batch reappeared, not rescheduled");
                        continue;
                    }
                    pending.insert(path, Instant::now());
                }
                WriteSignal::Ignore => {}
            }
        }
    }

    /// 안정화 시간이 지난 배치를 대기 목록에서 꺼냅니다.
    ///
    /// 대기 중에 실패로 되돌아온 배치는 버립니다.
    fn take_settled(
        &self,
        pending: &mut HashMap<PathBuf, Instant>,
        settle: Duration,
    ) -> Vec<PathBuf> {
        let now = Instant::now();
        let settled: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= settle)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &settled {
            pending.remove(path);
        }
        settled
            .into_iter()
            .filter(|path| !self.pipeline.was_returned(path))
            .collect()
    }

    /// 드롭 디렉토리를 다시 훑어 되돌린 배치를 뺀 나머지를 안정화 대기에 넣습니다.
    async fn rescan(&self, pending: &mut HashMap<PathBuf, Instant>) {
        match self.pipeline.extractor().list_pending().await {
            Ok(paths) => {
                let now = Instant::now();
                for path in paths {
                    if !self.pipeline.was_returned(&path) {
                        pending.insert(path, now);
                    }
                }
            }
            Err(e) => warn!(error = %e, "drop directory rescan failed"),
        }
    }

    /// 배치 하나를 분리된 태스크로 실행합니다. 완료를 기다리지 않습니다.
    fn schedule(&self, path: PathBuf) {
        debug!(path = %path.display(), "batch scheduled");
        metrics::counter!(m::WATCHER_BATCHES_SCHEDULED_TOTAL).increment(1);
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move { pipeline.run_task(path).await });
    }
}

fn create_watcher(
    tx: mpsc::UnboundedSender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<ActiveWatcher, IngestError> {
    let native_tx = tx.clone();
    match notify::recommended_watcher(move |res| {
        let _ = native_tx.send(res);
    }) {
        Ok(watcher) => Ok(ActiveWatcher::Native(watcher)),
        Err(e) => {
            warn!(error = %e, "native watcher unavailable, falling back to polling");
            metrics::counter!(m::WATCHER_ERRORS_TOTAL).increment(1);
            let poll_config = NotifyConfig::default().with_poll_interval(poll_interval);
            PollWatcher::new(
                move |res| {
                    let _ = tx.send(res);
                },
                poll_config,
            )
            .map(ActiveWatcher::Poll)
            .map_err(|e| IngestError::Watch(format!("cannot create poll watcher: {e}")))
        }
    }
}
