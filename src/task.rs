// 该文件是 FireGuard （火卫） 项目的一部分。
// src/task.rs - 定时采样与单飞推理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc,
  },
  thread,
  time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
  frame::StillFrame,
  input::{Camera, CaptureError},
  model::{Detection, FireDetector},
  output::{
    FrameReport, Render,
    notify::{AlertGate, FireAlert, NotificationChannel, Notifier, NotifierWrapper},
    overlay::{OverlayState, ScreenMapper, Viewport, ViewportHandle},
  },
};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
const STOP_POLL: Duration = Duration::from_millis(50);

pub trait Task<C, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, camera: C, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单飞保护：同一时刻最多一次推理在进行
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
  busy: Arc<AtomicBool>,
}

/// 持有期间占用 [`InFlightGuard`]，释放时自动归还
#[derive(Debug)]
pub struct InFlightPermit {
  busy: Arc<AtomicBool>,
}

impl InFlightGuard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn try_acquire(&self) -> Option<InFlightPermit> {
    self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| InFlightPermit {
        busy: self.busy.clone(),
      })
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }
}

impl Drop for InFlightPermit {
  fn drop(&mut self) {
    self.busy.store(false, Ordering::Release);
  }
}

/// 可跨线程共享的停止标志
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
  stopped: Arc<AtomicBool>,
}

impl StopHandle {
  pub fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::SeqCst)
  }

  /// Ctrl-C 时请求停止；正在进行的周期 30 秒内未结束则强制退出
  pub fn stop_on_ctrlc(&self) -> Result<(), ctrlc::Error> {
    let handle = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handle.stop();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

#[derive(Debug, Default)]
struct SamplingStats {
  ticks: AtomicU64,
  cycles: AtomicU64,
  skipped: AtomicU64,
  failures: AtomicU64,
  fire_frames: AtomicU64,
  alerts: AtomicU64,
}

impl SamplingStats {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn summary(&self) -> SamplingSummary {
    SamplingSummary {
      ticks: self.ticks.load(Ordering::Relaxed),
      cycles: self.cycles.load(Ordering::Relaxed),
      skipped: self.skipped.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      fire_frames: self.fire_frames.load(Ordering::Relaxed),
      alerts: self.alerts.load(Ordering::Relaxed),
    }
  }
}

/// 采样任务结束时的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SamplingSummary {
  /// 定时器触发次数
  pub ticks: u64,
  /// 实际执行的采样周期，输入耗尽的那次触发不计入
  pub cycles: u64,
  /// 因上一次推理未完成而跳过的触发
  pub skipped: u64,
  /// 拍摄或推理失败的周期
  pub failures: u64,
  /// 判定为火焰的周期
  pub fire_frames: u64,
  pub alerts: u64,
}

/// 每个周期：拍摄 → 推理 → 坐标映射 → 渲染 → 告警
struct Cycle<'a, C, M, O, N> {
  camera: C,
  model: M,
  output: O,
  notifier: Option<N>,
  mapper: ScreenMapper,
  viewport: &'a ViewportHandle,
  overlay: &'a OverlayState,
  gate: AlertGate,
  stats: &'a SamplingStats,
  stop: &'a StopHandle,
}

impl<C, M, O, N> Cycle<'_, C, M, O, N>
where
  C: Camera,
  M: FireDetector,
  M::Error: Display,
  O: Render,
  O::Error: Display,
  N: Notifier,
{
  fn run(&mut self, tick: u64) {
    let frame = match self.camera.capture() {
      Ok(frame) => frame,
      Err(CaptureError::Exhausted) => {
        info!("输入已耗尽，停止采样");
        self.overlay.clear();
        self.stop.stop();
        return;
      }
      Err(e) => {
        warn!("第 {} 次采样拍摄失败: {}", tick, e);
        SamplingStats::bump(&self.stats.cycles);
        SamplingStats::bump(&self.stats.failures);
        // 拍摄失败同样视为本周期无检测
        self.overlay.clear();
        self.gate.observe(false, Instant::now());
        return;
      }
    };
    SamplingStats::bump(&self.stats.cycles);

    let now = Instant::now();
    let detection = match self.model.detect(&frame.path) {
      Ok(detection) => detection,
      Err(e) => {
        warn!("第 {} 次采样推理失败: {}", tick, e);
        SamplingStats::bump(&self.stats.failures);
        Detection::none()
      }
    };
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let report = self.report(&detection);
    if let Err(e) = self.output.render_result(&frame, &report) {
      error!("渲染帧 {} 失败: {}", frame.index, e);
    }

    if detection.flame {
      SamplingStats::bump(&self.stats.fire_frames);
    }
    self.alert(&frame, &detection);
  }

  fn report(&self, detection: &Detection) -> FrameReport {
    let viewport: Viewport = self.viewport.get();
    let overlay = self.overlay.update(&self.mapper, detection, &viewport);
    FrameReport {
      detection: *detection,
      overlay,
      viewport,
    }
  }

  fn alert(&mut self, frame: &StillFrame, detection: &Detection) {
    if !self.gate.observe(detection.flame, Instant::now()) {
      return;
    }
    let Some(notifier) = self.notifier.as_mut() else {
      warn!("帧 {} 检测到火焰，未配置通知", frame.index);
      return;
    };

    let alert = FireAlert::new(detection.bbox.map(|b| b.conf));
    match notifier.notify(&alert) {
      Ok(()) => SamplingStats::bump(&self.stats.alerts),
      Err(e) => error!("发送火警通知失败: {}", e),
    }
  }
}

/// 固定周期采样任务
///
/// 定时器按固定节拍触发；若上一次推理仍未完成，本次触发直接跳过。
/// 拍摄与推理在工作线程中执行，失败只记日志并视为本周期无检测。
pub struct SamplingTask<N = NotifierWrapper> {
  interval: Duration,
  max_ticks: Option<u64>,
  cooldown: Duration,
  notifier: Option<N>,
  viewport: ViewportHandle,
  overlay: OverlayState,
  mapper: ScreenMapper,
  stop: StopHandle,
  guard: InFlightGuard,
}

impl<N> Default for SamplingTask<N> {
  fn default() -> Self {
    Self {
      interval: DEFAULT_INTERVAL,
      max_ticks: None,
      cooldown: Duration::ZERO,
      notifier: None,
      viewport: ViewportHandle::new(Viewport::new(
        crate::model::MODEL_INPUT_SIZE as f32,
        crate::model::MODEL_INPUT_SIZE as f32,
      )),
      overlay: OverlayState::default(),
      mapper: ScreenMapper::default(),
      stop: StopHandle::default(),
      guard: InFlightGuard::default(),
    }
  }
}

impl<N> SamplingTask<N> {
  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
    self.max_ticks = max_ticks;
    self
  }

  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  pub fn with_notifier(mut self, notifier: N) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn with_viewport(mut self, viewport: ViewportHandle) -> Self {
    self.viewport = viewport;
    self
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.stop.clone()
  }

  pub fn overlay(&self) -> OverlayState {
    self.overlay.clone()
  }

  pub fn viewport(&self) -> ViewportHandle {
    self.viewport.clone()
  }

  /// 睡到下一个节拍；被停止时提前返回 false
  fn wait_until(&self, deadline: Instant) -> bool {
    loop {
      if self.stop.is_stopped() {
        return false;
      }
      let now = Instant::now();
      if now >= deadline {
        return true;
      }
      thread::sleep((deadline - now).min(STOP_POLL));
    }
  }
}

impl<C, M, O, N> Task<C, M, O> for SamplingTask<N>
where
  C: Camera + Send,
  M: FireDetector + Send,
  M::Error: Display,
  O: Render + Send,
  O::Error: Display,
  N: Notifier + Send,
{
  type Output = SamplingSummary;
  type Error = anyhow::Error;

  fn run_task(mut self, camera: C, model: M, output: O) -> Result<Self::Output, Self::Error> {
    if let Some(notifier) = self.notifier.as_mut() {
      notifier.create_channel(&NotificationChannel::fire_alerts())?;
    }

    info!("开始采样任务，间隔 {:?}", self.interval);
    let notifier = self.notifier.take();
    let stats = SamplingStats::default();
    let (tx, rx) = mpsc::channel::<(u64, InFlightPermit)>();

    thread::scope(|scope| {
      let mut cycle = Cycle {
        camera,
        model,
        output,
        notifier,
        mapper: self.mapper,
        viewport: &self.viewport,
        overlay: &self.overlay,
        gate: AlertGate::new(self.cooldown),
        stats: &stats,
        stop: &self.stop,
      };

      let worker = scope.spawn(move || {
        for (tick, permit) in rx {
          cycle.run(tick);
          drop(permit);
        }
      });

      let mut deadline = Instant::now();
      let mut tick = 0u64;
      loop {
        if self.max_ticks.is_some_and(|n| tick >= n) {
          info!("达到指定触发次数 {}, 退出任务循环", tick);
          break;
        }
        if !self.wait_until(deadline) {
          info!("收到停止信号，退出任务循环");
          break;
        }
        tick += 1;
        SamplingStats::bump(&stats.ticks);

        match self.guard.try_acquire() {
          Some(permit) => {
            debug!("第 {} 次触发，提交采样", tick);
            if tx.send((tick, permit)).is_err() {
              error!("采样工作线程已退出");
              break;
            }
          }
          None => {
            debug!("第 {} 次触发，上一次推理尚未完成，跳过", tick);
            SamplingStats::bump(&stats.skipped);
          }
        }

        deadline += self.interval;
        let now = Instant::now();
        if deadline < now {
          // 落后超过一个周期时不补发触发
          deadline = now;
        }
      }

      drop(tx);
      if worker.join().is_err() {
        error!("采样工作线程异常退出");
      }
    });

    let summary = stats.summary();
    info!(
      "任务完成: 触发 {} 次, 执行 {} 次, 跳过 {} 次, 失败 {} 次, 告警 {} 次",
      summary.ticks, summary.cycles, summary.skipped, summary.failures, summary.alerts
    );
    Ok(summary)
  }
}

/// 单次拍摄并推理
#[derive(Debug, Default)]
pub struct OneShotTask {
  viewport: Option<Viewport>,
}

impl OneShotTask {
  pub fn with_viewport(mut self, viewport: Viewport) -> Self {
    self.viewport = Some(viewport);
    self
  }
}

impl<C, M, O> Task<C, M, O> for OneShotTask
where
  C: Camera,
  M: FireDetector,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = FrameReport;
  type Error = anyhow::Error;

  fn run_task(self, mut camera: C, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = camera.capture()?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let detection = model.detect(&frame.path)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let viewport = self
      .viewport
      .unwrap_or_else(|| Viewport::new(frame.width as f32, frame.height as f32));
    let overlay = detection
      .bbox
      .as_ref()
      .map(|bbox| ScreenMapper::default().map(bbox, &viewport));
    let report = FrameReport {
      detection,
      overlay,
      viewport,
    };
    output.render_result(&frame, &report)?;
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::overlay::ScreenRect;
  use std::sync::Mutex;

  #[test]
  fn guard_allows_single_holder() {
    let guard = InFlightGuard::new();
    let permit = guard.try_acquire().unwrap();
    assert!(guard.is_busy());
    assert!(guard.try_acquire().is_none());
    assert!(guard.clone().try_acquire().is_none());
    drop(permit);
    assert!(!guard.is_busy());
    assert!(guard.try_acquire().is_some());
  }

  #[test]
  fn permit_released_on_panic() {
    let guard = InFlightGuard::new();
    let permit = guard.try_acquire().unwrap();
    let result = std::panic::catch_unwind(move || {
      let _permit = permit;
      panic!("inference crashed");
    });
    assert!(result.is_err());
    assert!(!guard.is_busy());
  }

  struct FixedCamera {
    index: u64,
  }

  impl Camera for FixedCamera {
    fn capture(&mut self) -> Result<StillFrame, CaptureError> {
      self.index += 1;
      Ok(StillFrame::new("/nonexistent/still.jpg", 640, 480, self.index))
    }
  }

  /// 记录同时进行中的推理数
  struct SlowDetector {
    delay: Duration,
    active: Arc<std::sync::atomic::AtomicUsize>,
    peak: Arc<std::sync::atomic::AtomicUsize>,
    fail: bool,
  }

  impl FireDetector for SlowDetector {
    type Error = String;

    fn detect(&mut self, _: &std::path::Path) -> Result<Detection, Self::Error> {
      let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      thread::sleep(self.delay);
      self.active.fetch_sub(1, Ordering::SeqCst);
      if self.fail {
        return Err("model offline".to_string());
      }
      Ok(Detection {
        flame: true,
        bbox: Some(crate::model::FireBox {
          x1: 0.0,
          y1: 0.0,
          x2: 320.0,
          y2: 320.0,
          conf: 0.9,
        }),
      })
    }
  }

  struct NullOutput;

  impl Render for NullOutput {
    type Error = std::convert::Infallible;

    fn render_result(&self, _: &StillFrame, _: &FrameReport) -> Result<(), Self::Error> {
      Ok(())
    }
  }

  fn slow(delay_ms: u64, fail: bool) -> (SlowDetector, Arc<std::sync::atomic::AtomicUsize>) {
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let detector = SlowDetector {
      delay: Duration::from_millis(delay_ms),
      active: Arc::default(),
      peak: peak.clone(),
      fail,
    };
    (detector, peak)
  }

  #[test]
  fn slow_inference_skips_ticks_without_overlap() {
    let (detector, peak) = slow(120, false);
    let task: SamplingTask = SamplingTask::default()
      .with_interval(Duration::from_millis(20))
      .with_max_ticks(Some(20));
    let summary = task
      .run_task(FixedCamera { index: 0 }, detector, NullOutput)
      .unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(summary.ticks, 20);
    assert!(summary.skipped > 0);
    assert_eq!(summary.cycles + summary.skipped, summary.ticks);
  }

  #[test]
  fn inference_failure_counts_as_failure() {
    let (detector, _) = slow(0, true);
    let task: SamplingTask = SamplingTask::default()
      .with_interval(Duration::from_millis(5))
      .with_max_ticks(Some(3));
    let summary = task
      .run_task(FixedCamera { index: 0 }, detector, NullOutput)
      .unwrap();

    assert_eq!(summary.failures, summary.cycles);
    assert_eq!(summary.fire_frames, 0);
    assert_eq!(summary.alerts, 0);
  }

  /// 拍摄前记下当前叠加框，按拍摄序号失败
  struct ScriptedCamera {
    index: u64,
    fail_on: Option<u64>,
    overlay: OverlayState,
    seen: Arc<Mutex<Vec<Option<ScreenRect>>>>,
  }

  impl Camera for ScriptedCamera {
    fn capture(&mut self) -> Result<StillFrame, CaptureError> {
      self.index += 1;
      self.seen.lock().unwrap().push(self.overlay.current());
      if self.fail_on == Some(self.index) {
        return Err(CaptureError::Io(std::io::Error::other("camera busy")));
      }
      Ok(StillFrame::new("/nonexistent/still.jpg", 640, 480, self.index))
    }
  }

  /// 每次都报告火焰，按调用序号失败
  struct ScriptedDetector {
    calls: u64,
    fail_on: Option<u64>,
  }

  impl FireDetector for ScriptedDetector {
    type Error = String;

    fn detect(&mut self, _: &std::path::Path) -> Result<Detection, Self::Error> {
      self.calls += 1;
      if self.fail_on == Some(self.calls) {
        return Err("model offline".to_string());
      }
      Ok(Detection {
        flame: true,
        bbox: Some(crate::model::FireBox {
          x1: 0.0,
          y1: 0.0,
          x2: 64.0,
          y2: 64.0,
          conf: 0.9,
        }),
      })
    }
  }

  /// 三次触发，第二次失败；返回统计与每次拍摄前的叠加框
  fn run_with_failure(
    capture_fail_on: Option<u64>,
    detect_fail_on: Option<u64>,
  ) -> (SamplingSummary, Vec<Option<ScreenRect>>, Option<ScreenRect>) {
    let task = SamplingTask::default()
      .with_interval(Duration::from_millis(20))
      .with_max_ticks(Some(3))
      .with_notifier(crate::output::notify::LogNotifier::default());
    let overlay = task.overlay();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let camera = ScriptedCamera {
      index: 0,
      fail_on: capture_fail_on,
      overlay: overlay.clone(),
      seen: seen.clone(),
    };
    let detector = ScriptedDetector {
      calls: 0,
      fail_on: detect_fail_on,
    };
    let summary = task.run_task(camera, detector, NullOutput).unwrap();
    let seen = seen.lock().unwrap().clone();
    (summary, seen, overlay.current())
  }

  #[test]
  fn capture_failure_clears_overlay_and_rearms_alert() {
    let (summary, seen, last) = run_with_failure(Some(2), None);

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.fire_frames, 2);
    assert_eq!(summary.alerts, 2);
    assert_eq!(seen.len(), 3);
    assert!(seen[0].is_none());
    assert!(seen[1].is_some());
    assert!(seen[2].is_none());
    assert!(last.is_some());
  }

  #[test]
  fn inference_failure_clears_overlay_and_rearms_alert() {
    let (summary, seen, last) = run_with_failure(None, Some(2));

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.fire_frames, 2);
    assert_eq!(summary.alerts, 2);
    assert!(seen[1].is_some());
    assert!(seen[2].is_none());
    assert!(last.is_some());
  }

  /// 只有一帧的相机，第二次拍摄即耗尽
  struct OneFrameCamera {
    taken: bool,
  }

  impl Camera for OneFrameCamera {
    fn capture(&mut self) -> Result<StillFrame, CaptureError> {
      if self.taken {
        return Err(CaptureError::Exhausted);
      }
      self.taken = true;
      Ok(StillFrame::new("/nonexistent/still.jpg", 640, 480, 1))
    }
  }

  #[test]
  fn exhausted_input_stops_without_counting_cycle() {
    let task: SamplingTask = SamplingTask::default().with_interval(Duration::from_millis(5));
    let overlay = task.overlay();
    let detector = ScriptedDetector {
      calls: 0,
      fail_on: None,
    };
    let summary = task
      .run_task(OneFrameCamera { taken: false }, detector, NullOutput)
      .unwrap();

    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.fire_frames, 1);
    assert!(overlay.current().is_none());
  }

  #[test]
  fn alerts_once_for_sustained_fire() {
    let (detector, _) = slow(0, false);
    let task = SamplingTask::default()
      .with_interval(Duration::from_millis(5))
      .with_max_ticks(Some(5))
      .with_notifier(crate::output::notify::LogNotifier::default());
    let overlay = task.overlay();
    let summary = task
      .run_task(FixedCamera { index: 0 }, detector, NullOutput)
      .unwrap();

    assert_eq!(summary.alerts, 1);
    assert_eq!(summary.fire_frames, summary.cycles);
    let rect = overlay.current().unwrap();
    assert_eq!(rect.width, 320.0);
  }

  #[test]
  fn stop_handle_is_shared() {
    let task: SamplingTask = SamplingTask::default();
    let handle = task.stop_handle();
    handle.stop();
    assert!(!task.wait_until(Instant::now() + Duration::from_secs(10)));
  }
}
