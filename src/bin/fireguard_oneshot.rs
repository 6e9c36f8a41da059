// 该文件是 FireGuard （火卫） 项目的一部分。
// src/bin/fireguard_oneshot.rs - 单张图片火焰检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use fireguard::{
  FromUrl,
  input::CameraWrapper,
  model::DetectorWrapper,
  output::{OutputWrapper, overlay::Viewport},
  task::{OneShotTask, Task},
};

/// 对一张图片做一次火焰检测，结果以 JSON 打印
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图片路径
  #[arg(long, value_name = "IMAGE")]
  pub image: String,
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  #[arg(long, value_name = "VIEWPORT")]
  pub viewport: Option<Viewport>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("图片: {}", args.image);
  info!("模型: {}", args.model);

  let camera = CameraWrapper::from_url(&fireguard::parse_url_or_path(&args.image)?)?;
  let model = DetectorWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut task = OneShotTask::default();
  if let Some(viewport) = args.viewport {
    task = task.with_viewport(viewport);
  }
  let report = task.run_task(camera, model, output)?;
  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}
