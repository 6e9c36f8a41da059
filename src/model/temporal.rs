// 该文件是 FireGuard （火卫） 项目的一部分。
// src/model/temporal.rs - 火焰判定的时间滤波
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

use std::collections::VecDeque;

const TEMPORAL_WINDOW: usize = 3;
const TEMPORAL_MIN_POSITIVE: usize = 2;

/// 最近 `window` 帧中至少 `min_positive` 帧为正才判定为火焰
#[derive(Debug, Clone)]
pub struct TemporalFilter {
  window: usize,
  min_positive: usize,
  history: VecDeque<bool>,
}

impl Default for TemporalFilter {
  fn default() -> Self {
    Self::new(TEMPORAL_WINDOW, TEMPORAL_MIN_POSITIVE)
  }
}

impl TemporalFilter {
  pub fn new(window: usize, min_positive: usize) -> Self {
    let window = window.max(1);
    Self {
      window,
      min_positive: min_positive.clamp(1, window),
      history: VecDeque::with_capacity(window),
    }
  }

  /// 记录当前帧的判定并返回滤波后的结果
  pub fn push(&mut self, frame_flame: bool) -> bool {
    self.history.push_back(frame_flame);
    if self.history.len() > self.window {
      self.history.pop_front();
    }
    self.positives() >= self.min_positive
  }

  pub fn positives(&self) -> usize {
    self.history.iter().filter(|&&f| f).count()
  }

  pub fn reset(&mut self) {
    self.history.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn needs_two_of_last_three() {
    let mut filter = TemporalFilter::default();
    assert!(!filter.push(true));
    assert!(!filter.push(false));
    assert!(filter.push(true));
    // 窗口为 [false, true, true]
    assert!(filter.push(true));
    // 窗口为 [true, true, false]
    assert!(filter.push(false));
    // 窗口为 [true, false, false]
    assert!(!filter.push(false));
  }

  #[test]
  fn single_spike_is_ignored() {
    let mut filter = TemporalFilter::default();
    for _ in 0..5 {
      assert!(!filter.push(false));
    }
    assert!(!filter.push(true));
    assert!(!filter.push(false));
    assert!(!filter.push(false));
  }

  #[test]
  fn reset_forgets_history() {
    let mut filter = TemporalFilter::default();
    filter.push(true);
    filter.push(true);
    filter.reset();
    assert_eq!(filter.positives(), 0);
    assert!(!filter.push(true));
  }

  #[test]
  fn min_positive_is_bounded_by_window() {
    let mut filter = TemporalFilter::new(2, 5);
    filter.push(true);
    assert!(filter.push(true));
  }
}
