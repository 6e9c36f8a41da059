// 该文件是 FireGuard （火卫） 项目的一部分。
// src/model/yolo_fire.rs - 基于 tract 的 ONNX 火焰检测模型
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

use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RgbNchwFrame, load_rgb, resolve_image_uri},
  model::{
    DetectError, Detection, FireDetector, MODEL_INPUT_SIZE, TemporalFilter, YOLO_ANCHORS,
    decode_yolo_output,
  },
};

const YOLO_CONF_THRESHOLD: f32 = 0.6;
const INPUT: usize = MODEL_INPUT_SIZE as usize;

type YoloPlan = TypedRunnableModel<TypedModel>;

/// 单类 YOLO 火焰检测模型
///
/// URL 形如 `yolo:///models/fire.onnx?conf=0.6&window=3&min_positive=2`。
pub struct YoloFire {
  plan: YoloPlan,
  conf_threshold: f32,
  filter: TemporalFilter,
}

impl FromUrlWithScheme for YoloFire {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloFire {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut conf_threshold = YOLO_CONF_THRESHOLD;
    let mut filter = TemporalFilter::default();
    let mut window = None;
    let mut min_positive = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "conf" => conf_threshold = v.parse().unwrap_or(YOLO_CONF_THRESHOLD),
        "window" => window = v.parse::<usize>().ok(),
        "min_positive" => min_positive = v.parse::<usize>().ok(),
        _ => {}
      }
    }
    if window.is_some() || min_positive.is_some() {
      filter = TemporalFilter::new(window.unwrap_or(3), min_positive.unwrap_or(2));
    }

    let model = Self::load(&crate::url_path(url))?;
    Ok(Self {
      plan: model,
      conf_threshold,
      filter,
    })
  }
}

impl YoloFire {
  fn load(path: &Path) -> Result<YoloPlan, DetectError> {
    info!("加载模型文件: {}", path.display());
    let load = |e: TractError| DetectError::ModelLoad(format!("{}: {}", path.display(), e));
    let plan = tract_onnx::onnx()
      .model_for_path(path)
      .map_err(load)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, INPUT, INPUT)),
      )
      .map_err(load)?
      .into_optimized()
      .map_err(load)?
      .into_runnable()
      .map_err(load)?;
    info!("模型加载完成");
    Ok(plan)
  }

  fn build_input(frame: &RgbNchwFrame<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>) -> Tensor {
    tract_ndarray::Array4::from_shape_fn((1, 3, INPUT, INPUT), |(_, c, y, x)| {
      frame.normalized(c, y, x)
    })
    .into_tensor()
  }

  /// 输出统一为 `[5, anchors]` 行主序
  fn output_rows(output: &Tensor) -> Result<(Vec<f32>, usize), DetectError> {
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    let shape = view.shape().to_vec();
    debug!("模型输出形状: {:?}", shape);
    match shape.as_slice() {
      [1, 5, anchors] => Ok((view.iter().copied().collect(), *anchors)),
      [1, anchors, 5] => {
        let data: Vec<f32> = view.iter().copied().collect();
        let rows = (0..5)
          .flat_map(|r| (0..*anchors).map(move |i| (r, i)))
          .map(|(r, i)| data[i * 5 + r])
          .collect();
        Ok((rows, *anchors))
      }
      _ => Err(DetectError::Inference(format!(
        "不支持的输出形状 {:?}, 期望 [1, 5, {}]",
        shape, YOLO_ANCHORS
      ))),
    }
  }
}

impl FireDetector for YoloFire {
  type Error = DetectError;

  fn detect(&mut self, image_path: &Path) -> Result<Detection, Self::Error> {
    let path = resolve_image_uri(&image_path.to_string_lossy())?;
    let image = load_rgb(&path)?;
    let frame = RgbNchwFrame::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>::from_image(&image);

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(Self::build_input(&frame).into()))
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    let output = outputs
      .first()
      .ok_or_else(|| DetectError::Inference("模型没有输出".to_string()))?;

    let (rows, anchors) = Self::output_rows(output)?;
    let (frame_flame, bbox) = decode_yolo_output(&rows, anchors, self.conf_threshold);
    let flame = self.filter.push(frame_flame);
    debug!(
      "本帧火焰: {}, 滤波后: {}, 检测框: {:?}",
      frame_flame, flame, bbox
    );

    Ok(Detection { flame, bbox })
  }
}
