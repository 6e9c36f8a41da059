// 该文件是 FireGuard （火卫） 项目的一部分。
// src/output/overlay.rs - 模型坐标到屏幕坐标的映射
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
  str::FromStr,
  sync::{Arc, Mutex, RwLock},
};

use serde::Serialize;

use crate::model::{Detection, FireBox, MODEL_INPUT_SIZE};

/// 预览画面在屏幕上占据的区域
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Viewport {
  pub fn new(width: f32, height: f32) -> Self {
    Self {
      x: 0.0,
      y: 0.0,
      width,
      height,
    }
  }

  pub fn with_origin(mut self, x: f32, y: f32) -> Self {
    self.x = x;
    self.y = y;
    self
  }
}

impl FromStr for Viewport {
  type Err = String;

  /// 解析 `WxH` 或 `WxH+X+Y`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split('+');
    let size = parts.next().unwrap_or_default();
    let (w, h) = size
      .split_once(['x', 'X'])
      .ok_or_else(|| format!("视口格式应为 WxH[+X+Y]: {}", s))?;
    let number = |v: &str| {
      let n = v
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("视口数值无效 '{}': {}", v, e))?;
      if !n.is_finite() {
        return Err(format!("视口数值必须为有限值: {}", v));
      }
      Ok(n)
    };

    let viewport = Viewport::new(number(w)?, number(h)?);
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
      return Err(format!("视口尺寸必须为正: {}", s));
    }
    match (parts.next(), parts.next(), parts.next()) {
      (None, _, _) => Ok(viewport),
      (Some(x), Some(y), None) => Ok(viewport.with_origin(number(x)?, number(y)?)),
      _ => Err(format!("视口格式应为 WxH[+X+Y]: {}", s)),
    }
  }
}

/// 屏幕坐标系中的矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenRect {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
  pub conf: f32,
}

impl ScreenRect {
  pub fn right(&self) -> f32 {
    self.left + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.top + self.height
  }
}

/// 从固定的模型输入空间线性映射到视口
#[derive(Debug, Clone, Copy)]
pub struct ScreenMapper {
  model_width: f32,
  model_height: f32,
}

impl Default for ScreenMapper {
  fn default() -> Self {
    Self::new(MODEL_INPUT_SIZE as f32, MODEL_INPUT_SIZE as f32)
  }
}

impl ScreenMapper {
  pub fn new(model_width: f32, model_height: f32) -> Self {
    Self {
      model_width,
      model_height,
    }
  }

  /// 纯线性的缩放加平移，不做裁剪
  pub fn map(&self, bbox: &FireBox, viewport: &Viewport) -> ScreenRect {
    let sx = viewport.width / self.model_width;
    let sy = viewport.height / self.model_height;
    ScreenRect {
      left: viewport.x + bbox.x1 * sx,
      top: viewport.y + bbox.y1 * sy,
      width: bbox.width() * sx,
      height: bbox.height() * sy,
      conf: bbox.conf,
    }
  }
}

/// 可在运行中更新的当前视口（旋转、窗口尺寸变化）
#[derive(Debug, Clone)]
pub struct ViewportHandle {
  inner: Arc<RwLock<Viewport>>,
}

impl ViewportHandle {
  pub fn new(viewport: Viewport) -> Self {
    Self {
      inner: Arc::new(RwLock::new(viewport)),
    }
  }

  pub fn get(&self) -> Viewport {
    match self.inner.read() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  pub fn set(&self, viewport: Viewport) {
    match self.inner.write() {
      Ok(mut guard) => *guard = viewport,
      Err(poisoned) => *poisoned.into_inner() = viewport,
    }
  }
}

/// 最近一次映射得到的叠加框，每个采样周期替换一次
#[derive(Debug, Clone, Default)]
pub struct OverlayState {
  current: Arc<Mutex<Option<ScreenRect>>>,
}

impl OverlayState {
  /// 用本周期的检测结果替换叠加框；无检测时清除
  pub fn update(
    &self,
    mapper: &ScreenMapper,
    detection: &Detection,
    viewport: &Viewport,
  ) -> Option<ScreenRect> {
    let rect = detection.bbox.as_ref().map(|bbox| mapper.map(bbox, viewport));
    self.replace(rect);
    rect
  }

  pub fn clear(&self) {
    self.replace(None);
  }

  pub fn current(&self) -> Option<ScreenRect> {
    match self.current.lock() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  fn replace(&self, rect: Option<ScreenRect>) {
    match self.current.lock() {
      Ok(mut guard) => *guard = rect,
      Err(poisoned) => *poisoned.into_inner() = rect,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> FireBox {
    FireBox {
      x1,
      y1,
      x2,
      y2,
      conf: 0.8,
    }
  }

  #[test]
  fn scales_model_space_to_viewport() {
    let mapper = ScreenMapper::default();
    let rect = mapper.map(&bbox(160.0, 320.0, 480.0, 640.0), &Viewport::new(1080.0, 1920.0));
    assert_eq!(rect.left, 270.0);
    assert_eq!(rect.top, 960.0);
    assert_eq!(rect.width, 540.0);
    assert_eq!(rect.height, 960.0);
    assert_eq!(rect.right(), 810.0);
    assert_eq!(rect.bottom(), 1920.0);
    assert_eq!(rect.conf, 0.8);
  }

  #[test]
  fn applies_viewport_origin() {
    let mapper = ScreenMapper::default();
    let viewport = Viewport::new(640.0, 640.0).with_origin(10.0, 100.0);
    let rect = mapper.map(&bbox(0.0, 0.0, 64.0, 32.0), &viewport);
    assert_eq!((rect.left, rect.top), (10.0, 100.0));
    assert_eq!((rect.width, rect.height), (64.0, 32.0));
  }

  #[test]
  fn mapping_is_linear_and_unclamped() {
    let mapper = ScreenMapper::default();
    let viewport = Viewport::new(320.0, 160.0).with_origin(5.0, 7.0);
    let a = mapper.map(&bbox(-64.0, 0.0, 128.0, 700.0), &viewport);
    assert_eq!(a.left, 5.0 - 32.0);
    assert_eq!(a.bottom(), 7.0 + 175.0);

    // f(p) - f(0) 与 p 成正比
    let origin = mapper.map(&bbox(0.0, 0.0, 0.0, 0.0), &viewport);
    let p = mapper.map(&bbox(100.0, 200.0, 100.0, 200.0), &viewport);
    assert_eq!(p.left - origin.left, 100.0 * 0.5);
    assert_eq!(p.top - origin.top, 200.0 * 0.25);
  }

  #[test]
  fn parse_viewport() {
    assert_eq!(
      "1080x1920".parse::<Viewport>().unwrap(),
      Viewport::new(1080.0, 1920.0)
    );
    assert_eq!(
      "640X480+0+120".parse::<Viewport>().unwrap(),
      Viewport::new(640.0, 480.0).with_origin(0.0, 120.0)
    );
    assert!("640".parse::<Viewport>().is_err());
    assert!("0x480".parse::<Viewport>().is_err());
    assert!("640x480+1".parse::<Viewport>().is_err());
  }

  #[test]
  fn parse_viewport_rejects_non_finite() {
    assert!("infx100".parse::<Viewport>().is_err());
    assert!("NaNx100".parse::<Viewport>().is_err());
    assert!("100x-inf".parse::<Viewport>().is_err());
    assert!("100x100+inf+0".parse::<Viewport>().is_err());
    assert!("100x100+0+NaN".parse::<Viewport>().is_err());
  }

  #[test]
  fn overlay_is_replaced_and_cleared() {
    let state = OverlayState::default();
    let mapper = ScreenMapper::default();
    let viewport = Viewport::new(640.0, 640.0);
    let hit = Detection {
      flame: true,
      bbox: Some(bbox(1.0, 2.0, 3.0, 4.0)),
    };

    assert!(state.update(&mapper, &hit, &viewport).is_some());
    assert_eq!(state.current().unwrap().left, 1.0);
    assert!(state.update(&mapper, &Detection::none(), &viewport).is_none());
    assert!(state.current().is_none());
  }

  #[test]
  fn viewport_handle_is_shared() {
    let handle = ViewportHandle::new(Viewport::new(100.0, 100.0));
    let other = handle.clone();
    other.set(Viewport::new(200.0, 50.0));
    assert_eq!(handle.get(), Viewport::new(200.0, 50.0));
  }
}
