// 该文件是 FireGuard （火卫） 项目的一部分。
// src/model.rs - 火焰检测模型
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::FrameError};

/// 模型输入边长，检测框坐标都在 640×640 空间内
pub const MODEL_INPUT_SIZE: u32 = 640;

/// 模型坐标空间中的检测框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FireBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  pub conf: f32,
}

impl FireBox {
  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 由中心点与宽高构造
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, conf: f32) -> Self {
    Self {
      x1: cx - w / 2.0,
      y1: cy - h / 2.0,
      x2: cx + w / 2.0,
      y2: cy + h / 2.0,
      conf,
    }
  }
}

/// 单帧检测结果，只在当前帧有效
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
  /// 时间滤波后的火焰判定
  pub flame: bool,
  /// 当前帧置信度最高的框
  #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
  pub bbox: Option<FireBox>,
}

impl Detection {
  pub fn none() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    !self.flame && self.bbox.is_none()
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("{0}")]
  Frame(#[from] FrameError),
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("回放脚本错误: {0}")]
  Replay(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 外部推理调用：本地图片路径 → 检测结果
pub trait FireDetector {
  type Error;

  fn detect(&mut self, image_path: &Path) -> Result<Detection, Self::Error>;
}

mod replay;
mod temporal;
mod yolo_decode;
#[cfg(feature = "model_onnx")]
mod yolo_fire;

pub use self::replay::ReplayDetector;
pub use self::temporal::TemporalFilter;
pub use self::yolo_decode::{YOLO_ANCHORS, decode_yolo_output};
#[cfg(feature = "model_onnx")]
pub use self::yolo_fire::YoloFire;

pub enum DetectorWrapper {
  #[cfg(feature = "model_onnx")]
  Yolo(Box<YoloFire>),
  Replay(ReplayDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "model_onnx")]
      YoloFire::SCHEME => Ok(DetectorWrapper::Yolo(Box::new(YoloFire::from_url(url)?))),
      ReplayDetector::SCHEME => Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?)),
      other => Err(DetectError::SchemeMismatch(other.to_string())),
    }
  }
}

impl FireDetector for DetectorWrapper {
  type Error = DetectError;

  fn detect(&mut self, image_path: &Path) -> Result<Detection, Self::Error> {
    match self {
      #[cfg(feature = "model_onnx")]
      DetectorWrapper::Yolo(model) => model.detect(image_path),
      DetectorWrapper::Replay(model) => model.detect(image_path),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detection_json_shape() {
    let detection = Detection {
      flame: true,
      bbox: Some(FireBox::from_center(320.0, 320.0, 64.0, 32.0, 0.9)),
    };
    let json = serde_json::to_value(detection).unwrap();
    assert_eq!(json["flame"], true);
    assert_eq!(json["box"]["x1"], 288.0);
    assert_eq!(json["box"]["y2"], 336.0);

    let none = serde_json::to_string(&Detection::none()).unwrap();
    assert_eq!(none, r#"{"flame":false}"#);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("tflite:///models/best.tflite").unwrap();
    assert!(matches!(
      DetectorWrapper::from_url(&url),
      Err(DetectError::SchemeMismatch(s)) if s == "tflite"
    ));
  }
}
