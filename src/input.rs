// 该文件是 FireGuard （火卫） 项目的一部分。
// src/input.rs - 相机静帧输入
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

use thiserror::Error;

use crate::{
  FromUrl,
  frame::{FrameError, StillFrame},
};

/// 拍摄一张静帧并保存到本地文件
pub trait Camera {
  fn capture(&mut self) -> Result<StillFrame, CaptureError>;
}

mod folder;
mod still_image;

pub use self::folder::FolderCamera;
pub use self::still_image::StillImageCamera;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_camera;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_camera::{
  GStreamerCamera, GStreamerCameraError, GStreamerCameraPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("{0}")]
  Frame(#[from] FrameError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("目录中没有图片: {0}")]
  EmptyDirectory(String),
  #[error("输入已耗尽")]
  Exhausted,
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 相机错误: {0}")]
  GStreamer(#[from] GStreamerCameraError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum CameraWrapper {
  StillImage(StillImageCamera),
  Folder(FolderCamera),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(Box<GStreamerCamera>),
}

impl FromUrl for CameraWrapper {
  type Error = CaptureError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      StillImageCamera::SCHEME => Ok(CameraWrapper::StillImage(StillImageCamera::from_url(url)?)),
      FolderCamera::SCHEME => Ok(CameraWrapper::Folder(FolderCamera::from_url(url)?)),
      #[cfg(feature = "gstreamer_input")]
      GStreamerCameraPipelineBuilder::SCHEME => {
        let camera = GStreamerCameraPipelineBuilder::from_url(url)?.build()?;
        Ok(CameraWrapper::GStreamer(Box::new(camera)))
      }
      other => Err(CaptureError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Camera for CameraWrapper {
  fn capture(&mut self) -> Result<StillFrame, CaptureError> {
    match self {
      CameraWrapper::StillImage(camera) => camera.capture(),
      CameraWrapper::Folder(camera) => camera.capture(),
      #[cfg(feature = "gstreamer_input")]
      CameraWrapper::GStreamer(camera) => camera.capture(),
    }
  }
}

/// 判断文件扩展名是否为支持的静帧格式
pub(crate) fn is_image_file(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      matches!(
        ext.to_ascii_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "bmp" | "webp"
      )
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;

  #[test]
  fn image_extensions() {
    assert!(is_image_file(Path::new("a/b/still.JPG")));
    assert!(is_image_file(Path::new("frame.png")));
    assert!(!is_image_file(Path::new("notes.txt")));
    assert!(!is_image_file(Path::new("noext")));
  }

  #[test]
  fn unknown_camera_scheme() {
    let url = url::Url::parse("rtsp://10.0.0.2/stream").unwrap();
    assert!(matches!(
      CameraWrapper::from_url(&url),
      Err(CaptureError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
