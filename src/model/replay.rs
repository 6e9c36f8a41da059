// 该文件是 FireGuard （火卫） 项目的一部分。
// src/model/replay.rs - 回放脚本检测器
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

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::resolve_image_uri,
  model::{DetectError, Detection, FireDetector},
};

/// 按 JSON Lines 脚本逐帧返回检测结果，到末尾后循环
///
/// 每行一个检测结果，例如
/// `{"flame":true,"box":{"x1":10,"y1":20,"x2":110,"y2":220,"conf":0.9}}`，
/// `null` 表示本帧无检测。
#[derive(Debug, Clone)]
pub struct ReplayDetector {
  script: Vec<Detection>,
  cursor: usize,
  check_file: bool,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = crate::url_path(url);
    info!("加载回放脚本: {}", path.display());
    let text = std::fs::read_to_string(&path)?;
    let mut detector = Self::parse(&text)?;
    detector.check_file = !url.query_pairs().any(|(k, _)| k == "skip_check");
    Ok(detector)
  }
}

impl ReplayDetector {
  pub fn new(script: Vec<Detection>) -> Self {
    Self {
      script,
      cursor: 0,
      check_file: false,
    }
  }

  pub fn parse(text: &str) -> Result<Self, DetectError> {
    let script = text
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty())
      .map(|(no, line)| {
        serde_json::from_str::<Option<Detection>>(line)
          .map(Option::unwrap_or_default)
          .map_err(|e| DetectError::Replay(format!("第 {} 行: {}", no + 1, e)))
      })
      .collect::<Result<Vec<_>, _>>()?;

    if script.is_empty() {
      return Err(DetectError::Replay("脚本为空".to_string()));
    }
    debug!("回放脚本共 {} 帧", script.len());
    Ok(Self::new(script))
  }

  pub fn len(&self) -> usize {
    self.script.len()
  }

  pub fn is_empty(&self) -> bool {
    self.script.is_empty()
  }
}

impl FireDetector for ReplayDetector {
  type Error = DetectError;

  fn detect(&mut self, image_path: &Path) -> Result<Detection, Self::Error> {
    if self.check_file {
      resolve_image_uri(&image_path.to_string_lossy())?;
    }
    if self.script.is_empty() {
      return Ok(Detection::none());
    }
    let detection = self.script[self.cursor];
    self.cursor = (self.cursor + 1) % self.script.len();
    Ok(detection)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FireBox;

  #[test]
  fn parse_and_cycle() {
    let script = r#"
{"flame":true,"box":{"x1":10,"y1":20,"x2":110,"y2":220,"conf":0.9}}
null

{"flame":false}
"#;
    let mut detector = ReplayDetector::parse(script).unwrap();
    assert_eq!(detector.len(), 3);

    let path = Path::new("/unused.jpg");
    let first = detector.detect(path).unwrap();
    assert!(first.flame);
    assert_eq!(
      first.bbox,
      Some(FireBox {
        x1: 10.0,
        y1: 20.0,
        x2: 110.0,
        y2: 220.0,
        conf: 0.9
      })
    );
    assert!(detector.detect(path).unwrap().is_empty());
    assert!(detector.detect(path).unwrap().is_empty());
    assert_eq!(detector.detect(path).unwrap(), first);
  }

  #[test]
  fn bad_line_reports_line_number() {
    let err = ReplayDetector::parse("null\n{oops").unwrap_err();
    assert!(matches!(err, DetectError::Replay(msg) if msg.starts_with("第 2 行")));
  }

  #[test]
  fn from_url_checks_image_exists() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("script.jsonl");
    std::fs::write(&script, "{\"flame\":true}\n").unwrap();

    let url = Url::parse(&format!("replay://{}", script.display())).unwrap();
    let mut detector = ReplayDetector::from_url(&url).unwrap();
    assert!(matches!(
      detector.detect(&dir.path().join("missing.jpg")),
      Err(DetectError::Frame(_))
    ));

    let still = dir.path().join("still.jpg");
    std::fs::write(&still, b"x").unwrap();
    assert!(detector.detect(&still).unwrap().flame);
  }
}
