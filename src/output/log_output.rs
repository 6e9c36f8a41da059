// 该文件是 FireGuard （火卫） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;

use crate::{
  FromUrlWithScheme,
  frame::StillFrame,
  output::{FrameReport, Render},
};

/// 只把叠加框写进日志
pub struct LogOutput;

impl crate::FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &url::Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl Render for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &StillFrame, report: &FrameReport) -> Result<(), Self::Error> {
    match &report.overlay {
      Some(rect) => info!(
        "帧 {}: 火焰={} 叠加框 ({:.0}, {:.0}, {:.0}x{:.0}) 置信度 {:.2}",
        frame.index,
        report.detection.flame,
        rect.left,
        rect.top,
        rect.width,
        rect.height,
        rect.conf
      ),
      None => info!("帧 {}: 无检测", frame.index),
    }
    Ok(())
  }
}
