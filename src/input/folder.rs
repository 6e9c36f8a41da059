// 该文件是 FireGuard （火卫） 项目的一部分。
// src/input/folder.rs - 目录回放相机
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

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, StillFrame},
  input::{Camera, CaptureError, is_image_file},
};

/// 按文件名顺序回放目录中的图片
///
/// `folder:///path/to/dir?loop` 在末尾重新开始，否则返回 [`CaptureError::Exhausted`]。
pub struct FolderCamera {
  files: Vec<PathBuf>,
  cursor: usize,
  looping: bool,
  index: u64,
}

impl FromUrlWithScheme for FolderCamera {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderCamera {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CaptureError::SchemeMismatch(url.scheme().to_string()));
    }

    let looping = url.query_pairs().any(|(k, _)| k == "loop");
    Self::open(&crate::url_path(url), looping)
  }
}

impl FolderCamera {
  pub fn open(directory: &Path, looping: bool) -> Result<Self, CaptureError> {
    let mut files = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_file() && is_image_file(path))
      .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
      return Err(CaptureError::EmptyDirectory(
        directory.display().to_string(),
      ));
    }
    info!("目录 {} 中共 {} 张图片", directory.display(), files.len());

    Ok(Self {
      files,
      cursor: 0,
      looping,
      index: 0,
    })
  }
}

impl Camera for FolderCamera {
  fn capture(&mut self) -> Result<StillFrame, CaptureError> {
    if self.cursor >= self.files.len() {
      if !self.looping {
        return Err(CaptureError::Exhausted);
      }
      debug!("目录回放到末尾，重新开始");
      self.cursor = 0;
    }

    let path = self.files[self.cursor].clone();
    self.cursor += 1;
    self.index += 1;

    let (width, height) =
      image::image_dimensions(&path).map_err(|source| FrameError::Decode {
        path: path.clone(),
        source,
      })?;
    Ok(StillFrame::new(path, width, height, self.index))
  }
}
