// 该文件是 FireGuard （火卫） 项目的一部分。
// src/frame.rs - 静帧与模型输入帧定义
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

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{RgbImage, imageops::FilterType};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;
const FILE_URI_PREFIX: &str = "file://";

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("文件不存在: {0}")]
  FileNotFound(PathBuf),
  #[error("图像解码失败: {path}: {source}")]
  Decode {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 相机拍下的一张静帧，保存在本地文件中
#[derive(Debug, Clone)]
pub struct StillFrame {
  pub path: PathBuf,
  pub width: u32,
  pub height: u32,
  pub index: u64,
  pub captured_at: DateTime<Utc>,
}

impl StillFrame {
  pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, index: u64) -> Self {
    Self {
      path: path.into(),
      width,
      height,
      index,
      captured_at: Utc::now(),
    }
  }

  /// 重新读取静帧像素
  pub fn load(&self) -> Result<RgbImage, FrameError> {
    load_rgb(&self.path)
  }
}

/// 去掉 `file://` 前缀并确认文件存在
pub fn resolve_image_uri(uri: &str) -> Result<PathBuf, FrameError> {
  let path = PathBuf::from(uri.strip_prefix(FILE_URI_PREFIX).unwrap_or(uri));
  if !path.exists() {
    return Err(FrameError::FileNotFound(path));
  }
  Ok(path)
}

pub fn load_rgb(path: &Path) -> Result<RgbImage, FrameError> {
  let decode = |source| FrameError::Decode {
    path: path.to_path_buf(),
    source,
  };
  let image = image::ImageReader::open(path)
    .map_err(|e| decode(image::ImageError::IoError(e)))?
    .with_guessed_format()
    .map_err(|e| decode(image::ImageError::IoError(e)))?
    .decode()
    .map_err(decode)?;
  Ok(image.to_rgb8())
}

/// 固定尺寸的 NCHW 排布 RGB 帧，作为模型输入
#[derive(Debug, Clone)]
pub struct RgbNchwFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> Default for RgbNchwFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNchwFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nchw(&self) -> &[u8] {
    &self.data
  }

  /// 双线性缩放到 W×H 后按通道展开
  pub fn from_image(image: &RgbImage) -> Self {
    let resized;
    let image = if image.dimensions() == (W, H) {
      image
    } else {
      resized = image::imageops::resize(image, W, H, FilterType::Triangle);
      &resized
    };

    let mut frame = Self::default();
    let plane = (W as usize) * (H as usize);
    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * (W as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        frame.data[c * plane + idx] = pixel[c];
      }
    }
    frame
  }

  /// 取 (通道, 行, 列) 处的值并归一化到 [0, 1]
  pub fn normalized(&self, channel: usize, y: usize, x: usize) -> f32 {
    let plane = (W as usize) * (H as usize);
    self.data[channel * plane + y * (W as usize) + x] as f32 / 255.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn resolve_strips_file_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.jpg");
    std::fs::write(&path, b"x").unwrap();

    let uri = format!("file://{}", path.display());
    assert_eq!(resolve_image_uri(&uri).unwrap(), path);
    assert_eq!(resolve_image_uri(path.to_str().unwrap()).unwrap(), path);
  }

  #[test]
  fn resolve_missing_file() {
    let err = resolve_image_uri("file:///definitely/not/here.jpg").unwrap_err();
    assert!(matches!(err, FrameError::FileNotFound(p) if p == Path::new("/definitely/not/here.jpg")));
  }

  #[test]
  fn load_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not an image").unwrap();
    assert!(matches!(load_rgb(&path), Err(FrameError::Decode { .. })));
  }

  #[test]
  fn nchw_layout_is_planar() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(1, 0, Rgb([10, 20, 30]));
    let frame = RgbNchwFrame::<2, 2>::from_image(&image);
    let data = frame.as_nchw();
    assert_eq!(data.len(), 12);
    assert_eq!(data[1], 10);
    assert_eq!(data[4 + 1], 20);
    assert_eq!(data[8 + 1], 30);
    assert!((frame.normalized(2, 0, 1) - 30.0 / 255.0).abs() < 1e-6);
  }

  #[test]
  fn nchw_resizes_to_target() {
    let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 0]));
    let frame = RgbNchwFrame::<4, 4>::from_image(&image);
    assert_eq!(frame.as_nchw().len(), 48);
    assert!(frame.as_nchw()[..16].iter().all(|&v| v == 255));
    assert!(frame.as_nchw()[16..].iter().all(|&v| v == 0));
  }
}
