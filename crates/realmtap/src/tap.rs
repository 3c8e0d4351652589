//! キャプチャスレッドと処理スレッド
//!
//! ## スレッド構成
//!
//! ```text
//! capture-0 (FrameSource) ──┐
//! capture-1 (FrameSource) ──┼─push─▶ InterFrameBuffer ─pop_wait─▶ processor (Pipeline を所有)
//! capture-N (FrameSource) ──┘                                       │
//!                                                                   ▼
//!                                                         Dispatcher ─▶ 購読者
//! ```
//!
//! - 最初にフレームを届けた供給元が採用され、残りのキャプチャスレッドは終了する。
//! - キャプチャスレッドは処理を待たない（キューは満杯になると容量を倍にする）。
//! - 回復不能な欠落が起きると処理スレッドはキャプチャを止めて終了する。
//! - 停止時はキャプチャを先に閉じ、その後で処理スレッドを時間制限付きで待つ。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use realmtap_pipeline::{Dispatcher, Flow, NoopObserver, Pipeline, PipelineObserver, PipelineStats};
use realmtap_stream::InterFrameBuffer;
use realmtap_transport::RawFrame;

use crate::capture::{Capture, FrameSource};
use crate::config::TapConfig;
use crate::error::{Result, TapError};

/// まだどの供給元も採用されていない
const NO_SOURCE: usize = usize::MAX;

/// 終了待ちのポーリング間隔
const JOIN_POLL: Duration = Duration::from_millis(5);

/// スレッド間で共有する状態
struct Shared {
    buffer: InterFrameBuffer<RawFrame>,
    /// キャプチャスレッドの停止
    capture_stop: AtomicBool,
    /// 処理スレッドの停止
    stop: AtomicBool,
    /// 回復不能な欠落で止まった
    halted: AtomicBool,
    /// 採用された供給元のインデックス
    chosen: AtomicUsize,
}

struct Running {
    shared: Arc<Shared>,
    source_names: Vec<String>,
    captures: Vec<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
}

/// 受動キャプチャのランタイム
///
/// `start()` でスレッドを起動し、`stop()`（または drop）で止める。
/// 購読は `dispatcher()` に対して、起動前後どちらでも行える。
pub struct PacketTap {
    config: TapConfig,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<PipelineStats>,
    /// 次の `start()` で処理スレッドに渡す観測フック
    observer: Option<Box<dyn PipelineObserver>>,
    running: Option<Running>,
}

impl PacketTap {
    /// # エラー
    /// - `TapError::Config` / `TapError::Crypto`: 設定が不正
    pub fn new(config: TapConfig) -> Result<Self> {
        config.validate()?;
        Ok(PacketTap {
            config,
            dispatcher: Arc::new(Dispatcher::new()),
            stats: Arc::new(PipelineStats::new()),
            observer: None,
            running: None,
        })
    }

    /// 観測フックを設定する（次の `start()` から有効）
    ///
    /// # エラー
    /// - `TapError::AlreadyRunning`: 実行中は差し替えられない
    pub fn set_observer(&mut self, observer: Box<dyn PipelineObserver>) -> Result<()> {
        if self.running.is_some() {
            return Err(TapError::AlreadyRunning);
        }
        self.observer = Some(observer);
        Ok(())
    }

    /// キャプチャを開始する
    ///
    /// 起動ごとに再構築状態（ストリーム・暗号同期）は初期化される。
    /// 購読と統計は起動をまたいで引き継がれる。
    ///
    /// # 引数
    /// - `sources`: 候補のキャプチャ元。最初にフレームを届けたものが採用される
    ///
    /// # エラー
    /// - `TapError::AlreadyRunning`: 既に起動している
    /// - `TapError::Config`: `sources` が空
    /// - `TapError::ThreadSpawn`: スレッドを起動できなかった
    pub fn start(&mut self, sources: Vec<Box<dyn FrameSource>>) -> Result<()> {
        if self.running.is_some() {
            return Err(TapError::AlreadyRunning);
        }
        if sources.is_empty() {
            return Err(TapError::Config("at least one capture source is required".into()));
        }

        let observer = self.observer.take().unwrap_or_else(|| Box::new(NoopObserver));
        let pipeline = Pipeline::new(self.config.pipeline.clone())?
            .with_dispatcher(Arc::clone(&self.dispatcher))
            .with_stats(Arc::clone(&self.stats))
            .with_observer(observer);

        let shared = Arc::new(Shared {
            buffer: InterFrameBuffer::new(self.config.runtime.buffer_capacity),
            capture_stop: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            chosen: AtomicUsize::new(NO_SOURCE),
        });

        let processor = {
            let shared = Arc::clone(&shared);
            spawn("realmtap-processor".to_string(), move || process_loop(pipeline, &shared))?
        };

        let mut running = Running {
            shared: Arc::clone(&shared),
            source_names: sources.iter().map(|s| s.name().to_string()).collect(),
            captures: Vec::with_capacity(sources.len()),
            processor: Some(processor),
        };

        for (index, source) in sources.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let spawned = spawn(format!("realmtap-capture-{index}"), move || {
                capture_loop(index, source, &shared)
            });
            match spawned {
                Ok(handle) => running.captures.push(handle),
                Err(e) => {
                    shutdown(running, self.config.runtime.join_timeout());
                    return Err(e);
                }
            }
        }

        tracing::info!(sources = ?running.source_names, "packet tap started");
        self.running = Some(running);
        Ok(())
    }

    /// キャプチャを止めてスレッドを回収する
    ///
    /// # エラー
    /// - `TapError::NotRunning`: 起動していない
    pub fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(TapError::NotRunning)?;
        shutdown(running, self.config.runtime.join_timeout());
        Ok(())
    }

    /// 起動済みで、回復不能な欠落で止まっていない
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.shared.halted.load(Ordering::Acquire))
    }

    /// 回復不能な欠落で止まった（`stop()` するまで true のまま）
    pub fn is_halted(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.shared.halted.load(Ordering::Acquire))
    }

    /// 採用されたキャプチャ元の名前
    pub fn chosen_source(&self) -> Option<&str> {
        let running = self.running.as_ref()?;
        let index = running.shared.chosen.load(Ordering::Acquire);
        running.source_names.get(index).map(String::as_str)
    }

    /// 処理待ちの生フレーム数
    pub fn queued(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.shared.buffer.len())
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }
}

impl Drop for PacketTap {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            shutdown(running, self.config.runtime.join_timeout());
        }
    }
}

impl std::fmt::Debug for PacketTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketTap")
            .field("running", &self.is_running())
            .field("halted", &self.is_halted())
            .field("chosen_source", &self.chosen_source())
            .finish()
    }
}

// ===== スレッド本体 =====

fn spawn<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| TapError::ThreadSpawn { name, source })
}

fn capture_loop(index: usize, mut source: Box<dyn FrameSource>, shared: &Shared) {
    let name = source.name().to_string();
    tracing::debug!(source = %name, "capture thread started");

    while !shared.capture_stop.load(Ordering::Acquire) {
        let chosen = shared.chosen.load(Ordering::Acquire);
        if chosen != NO_SOURCE && chosen != index {
            tracing::debug!(source = %name, "another source was chosen");
            break;
        }

        match source.next_frame() {
            Ok(Capture::Frame(frame)) => {
                if chosen == NO_SOURCE {
                    let won = shared
                        .chosen
                        .compare_exchange(NO_SOURCE, index, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok();
                    if !won {
                        continue;
                    }
                    tracing::info!(source = %name, "capturing game traffic on this source");
                }
                shared.buffer.push(frame);
            }
            Ok(Capture::Idle) => {}
            Ok(Capture::Closed) => {
                tracing::info!(source = %name, "capture source closed");
                break;
            }
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "capture failed");
                break;
            }
        }
    }

    source.close();
    tracing::debug!(source = %name, "capture thread finished");
}

fn process_loop(mut pipeline: Pipeline, shared: &Shared) {
    while let Some(frame) = shared.buffer.pop_wait(&shared.stop) {
        let flow = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process_raw(&frame)));
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Halt) => {
                shared.halted.store(true, Ordering::Release);
                shared.capture_stop.store(true, Ordering::Release);
                tracing::error!("pipeline halted, capture stopped");
                break;
            }
            Err(_) => {
                tracing::error!(len = frame.data.len(), "frame processing panicked, frame skipped");
            }
        }
    }
    tracing::debug!("processing thread finished");
}

/// キャプチャ → 処理スレッドの順に止める
fn shutdown(mut running: Running, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let shared = &running.shared;

    shared.capture_stop.store(true, Ordering::Release);
    for handle in running.captures.drain(..) {
        join_until(handle, deadline, "capture");
    }

    shared.stop.store(true, Ordering::Release);
    shared.buffer.wake_all();
    if let Some(handle) = running.processor.take() {
        join_until(handle, deadline, "processor");
    }

    let dropped = shared.buffer.len();
    if dropped > 0 {
        tracing::warn!(dropped, "frames left unprocessed at shutdown");
        shared.buffer.clear();
    }
    tracing::info!("packet tap stopped");
}

/// 期限までにスレッドが終われば回収する。終わらなければ切り離す
fn join_until(handle: JoinHandle<()>, deadline: Instant, role: &str) {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(role, "thread did not finish in time, detaching");
            return;
        }
        thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        tracing::error!(role, "thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ReplaySource;

    fn tap() -> PacketTap {
        let mut config = TapConfig::default();
        config.pipeline.search_size = 1_000;
        PacketTap::new(config).unwrap()
    }

    #[test]
    fn test_start_requires_sources() {
        let mut tap = tap();
        assert!(matches!(tap.start(Vec::new()), Err(TapError::Config(_))));
        assert!(!tap.is_running());
    }

    #[test]
    fn test_start_twice_and_stop_twice() {
        let mut tap = tap();
        tap.start(vec![Box::new(ReplaySource::new("a", Vec::new()))]).unwrap();
        assert!(tap.is_running());
        assert!(matches!(
            tap.start(vec![Box::new(ReplaySource::new("b", Vec::new()))]),
            Err(TapError::AlreadyRunning)
        ));
        assert!(matches!(
            tap.set_observer(Box::new(NoopObserver)),
            Err(TapError::AlreadyRunning)
        ));

        tap.stop().unwrap();
        assert!(!tap.is_running());
        assert!(matches!(tap.stop(), Err(TapError::NotRunning)));
    }

    #[test]
    fn test_replayed_frames_reach_pipeline() {
        let mut tap = tap();
        let frames: Vec<RawFrame> = (0..20).map(|i| RawFrame::new(vec![i as u8; 8], i)).collect();
        tap.start(vec![Box::new(ReplaySource::new("replay", frames))]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while tap.stats().snapshot().raw_frames < 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(tap.chosen_source(), Some("replay"));
        tap.stop().unwrap();

        let stats = tap.stats().snapshot();
        assert_eq!(stats.raw_frames, 20);
        assert_eq!(stats.ignored_packets, 20);
    }
}
