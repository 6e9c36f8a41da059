// 该文件是 FireGuard （火卫） 项目的一部分。
// src/input/still_image.rs - 固定图片相机
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

use std::path::PathBuf;

use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{StillFrame, resolve_image_uri},
  input::{Camera, CaptureError},
};

/// 每次拍摄都返回同一张图片文件
pub struct StillImageCamera {
  path: PathBuf,
  width: u32,
  height: u32,
  index: u64,
}

impl FromUrlWithScheme for StillImageCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for StillImageCamera {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CaptureError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::open(crate::url_path(url))
  }
}

impl StillImageCamera {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
    let path = resolve_image_uri(&path.into().to_string_lossy())?;
    let (width, height) = image::image_dimensions(&path).map_err(|source| {
      crate::frame::FrameError::Decode {
        path: path.clone(),
        source,
      }
    })?;
    debug!("静帧图片 {}: {}x{}", path.display(), width, height);

    Ok(Self {
      path,
      width,
      height,
      index: 0,
    })
  }
}

impl Camera for StillImageCamera {
  fn capture(&mut self) -> Result<StillFrame, CaptureError> {
    // 文件可能在运行期间被替换或删除
    let path = resolve_image_uri(&self.path.to_string_lossy())?;
    self.index += 1;
    Ok(StillFrame::new(path, self.width, self.height, self.index))
  }
}
