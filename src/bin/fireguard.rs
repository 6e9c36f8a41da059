// 该文件是 FireGuard （火卫） 项目的一部分。
// src/bin/fireguard.rs - 定时采样火焰检测
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use fireguard::{
  FromUrl,
  input::CameraWrapper,
  model::DetectorWrapper,
  output::{
    OutputWrapper,
    notify::NotifierWrapper,
    overlay::{Viewport, ViewportHandle},
  },
  task::{SamplingTask, Task},
};

/// FireGuard 参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 相机来源，如 gst://camera?dir=/tmp/fireguard 或本地图片路径
  #[arg(long, value_name = "CAMERA")]
  pub camera: String,
  /// 检测模型，如 yolo:///opt/models/fire.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输出，如 image:///run/fireguard/preview.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 告警通知，如 command:///usr/bin/notify-send
  #[arg(long, value_name = "NOTIFY")]
  pub notify: Option<Url>,

  /// 采样间隔（毫秒）
  #[arg(
    long,
    value_name = "MS",
    default_value_t = 1000,
    value_parser = clap::value_parser!(u64).range(1..)
  )]
  pub interval_ms: u64,
  /// 预览视口 WxH[+X+Y]
  #[arg(long, value_name = "VIEWPORT")]
  pub viewport: Option<Viewport>,
  #[arg(long, value_name = "N")]
  pub max_ticks: Option<u64>,
  /// 两次告警之间的最短间隔（秒）
  #[arg(long, value_name = "SECS", default_value_t = 0)]
  pub cooldown_secs: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("相机来源: {}", args.camera);
  info!("模型: {}", args.model);
  info!("输出: {}", args.output);

  let camera = CameraWrapper::from_url(&fireguard::parse_url_or_path(&args.camera)?)?;
  let model = DetectorWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut task = SamplingTask::default()
    .with_interval(Duration::from_millis(args.interval_ms))
    .with_max_ticks(args.max_ticks)
    .with_cooldown(Duration::from_secs(args.cooldown_secs));
  if let Some(url) = &args.notify {
    info!("告警通知: {}", url);
    task = task.with_notifier(NotifierWrapper::from_url(url)?);
  }
  if let Some(viewport) = args.viewport {
    task = task.with_viewport(ViewportHandle::new(viewport));
  }

  task.stop_handle().stop_on_ctrlc()?;
  let summary = task.run_task(camera, model, output)?;
  info!("{}", serde_json::to_string(&summary)?);

  Ok(())
}
