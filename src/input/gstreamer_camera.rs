// 该文件是 FireGuard （火卫） 项目的一部分。
// src/input/gstreamer_camera.rs - GStreamer 相机静帧采集
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

//! # GStreamer 相机
//!
//! 从 GStreamer 管道中取最新一帧，写成 JPEG 静帧交给检测器。
//!
//! 支持的 URL：
//! - `gst://camera/dev/video0?width=640&height=480&fps=15&rotate=90`
//! - `gst://file/path/to/video.mp4`
//!
//! 公共参数：
//! - `dir=<目录>` 静帧保存目录，默认系统临时目录
//! - `keep` 每帧单独保存，否则始终覆盖同一文件
//!
//! 需要系统安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::{collections::HashMap, path::PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::StillFrame,
  input::{Camera, CaptureError},
};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 15;
const STILL_FILE_NAME: &str = "fireguard-still.jpg";

#[derive(Error, Debug)]
pub enum GStreamerCameraError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to save still: {0}")]
  SaveError(#[from] image::ImageError),
}

pub enum GStreamerCameraBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerCameraBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerCameraBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerCameraBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode_str, width, height, fps
        )
      }
      GStreamerCameraBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerCameraBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 相机管道构建器
pub struct GStreamerCameraPipelineBuilder {
  items: Vec<GStreamerCameraBuilderItem>,
  still_dir: PathBuf,
  keep: bool,
}

impl FromUrlWithScheme for GStreamerCameraPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerCameraPipelineBuilder {
  fn camera_items(path: &str, query: &HashMap<String, String>) -> Vec<GStreamerCameraBuilderItem> {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    vec![GStreamerCameraBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      width: parse("width", DEFAULT_WIDTH),
      height: parse("height", DEFAULT_HEIGHT),
      fps: parse("fps", DEFAULT_FPS),
    }]
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerCameraBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerCameraBuilderItem::VideoFlip { method })
  }

  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerCameraBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=1 drop=true sync=false name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerCamera, GStreamerCameraError> {
    gst::init()?;

    let description = self.pipeline_description();
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerCameraError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerCameraError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerCameraError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;
    std::fs::create_dir_all(&self.still_dir)
      .map_err(|e| GStreamerCameraError::PipelineError(e.to_string()))?;

    Ok(GStreamerCamera {
      pipeline,
      appsink,
      still_dir: self.still_dir,
      keep: self.keep,
      index: 0,
    })
  }
}

impl FromUrl for GStreamerCameraPipelineBuilder {
  type Error = GStreamerCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerCameraError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut items = match url.host_str() {
      Some("camera") => Self::camera_items(url.path(), &query),
      Some("file") => vec![GStreamerCameraBuilderItem::FileSource(
        url.path().to_string(),
      )],
      _ => return Err(GStreamerCameraError::SchemeMismatch),
    };

    if let Some(flip) = Self::video_flip(query.get("rotate").map(|s| s.as_ref())) {
      items.push(flip);
    }
    items.push(GStreamerCameraBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    let still_dir = query
      .get("dir")
      .map(PathBuf::from)
      .unwrap_or_else(std::env::temp_dir);

    Ok(GStreamerCameraPipelineBuilder {
      items,
      still_dir,
      keep: query.contains_key("keep"),
    })
  }
}

/// 持有运行中的管道，每次拍摄取出最新一帧
pub struct GStreamerCamera {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  still_dir: PathBuf,
  keep: bool,
  index: u64,
}

impl Drop for GStreamerCamera {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerCamera {
  fn still_path(&self) -> PathBuf {
    if self.keep {
      self.still_dir.join(format!("still-{:08}.jpg", self.index))
    } else {
      self.still_dir.join(STILL_FILE_NAME)
    }
  }
}

impl Camera for GStreamerCamera {
  fn capture(&mut self) -> Result<StillFrame, CaptureError> {
    let sample = self
      .appsink
      .pull_sample()
      .map_err(|e| GStreamerCameraError::PipelineError(format!("Failed to pull sample: {}", e)))?;
    let image = convert_sample_to_rgb(sample)?;

    self.index += 1;
    let path = self.still_path();
    image
      .save(&path)
      .map_err(GStreamerCameraError::SaveError)?;
    debug!("静帧已保存: {}", path.display());

    Ok(StillFrame::new(
      path,
      image.width(),
      image.height(),
      self.index,
    ))
  }
}

fn convert_sample_to_rgb(sample: gst::Sample) -> Result<RgbImage, GStreamerCameraError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerCameraError::VideoInfoError)?;

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerCameraError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = stride * height as usize;
  if data.len() < expected_size {
    return Err(GStreamerCameraError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  // 行之间可能有填充，按 stride 取像素
  let channel = |c: usize| -> usize {
    match video_info.format() {
      gst_video::VideoFormat::Bgr => 2 - c,
      _ => c,
    }
  };
  match video_info.format() {
    gst_video::VideoFormat::Rgb | gst_video::VideoFormat::Bgr => {}
    _ => return Err(GStreamerCameraError::UnsupportedFormat),
  }

  Ok(RgbImage::from_fn(width, height, |x, y| {
    let base = y as usize * stride + x as usize * 3;
    Rgb([
      data[base + channel(0)],
      data[base + channel(1)],
      data[base + channel(2)],
    ])
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_pipeline() {
    let url =
      Url::parse("gst://camera/dev/video2?width=320&height=240&fps=10&rotate=90&dir=/tmp/fg")
        .unwrap();
    let builder = GStreamerCameraPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.pipeline_description(),
      "v4l2src device=/dev/video2 ! video/x-raw,width=320,height=240,framerate=10/1 \
       ! videoflip method=1 ! videoconvert ! video/x-raw,format=RGB \
       ! appsink max-buffers=1 drop=true sync=false name=sink"
    );
    assert_eq!(builder.still_dir, PathBuf::from("/tmp/fg"));
    assert!(!builder.keep);
  }

  #[test]
  fn unknown_host_is_rejected() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(GStreamerCameraPipelineBuilder::from_url(&url).is_err());
  }
}
