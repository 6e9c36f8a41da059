// 该文件是 FireGuard （火卫） 项目的一部分。
// src/model/yolo_decode.rs - 单类 YOLO 输出解码
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

use tracing::debug;

use crate::model::{FireBox, MODEL_INPUT_SIZE};

/// 640 输入下三个检测头的锚点总数 (80² + 40² + 20²)
pub const YOLO_ANCHORS: usize = 8400;
const YOLO_ROWS: usize = 5;

/// 解码 `[5, anchors]` 行主序输出
///
/// 每列依次为 `cx, cy, w, h, conf`，坐标归一化到 [0, 1]。
/// 返回 (本帧是否有超过阈值的候选, 置信度最高的候选框)。
/// 框的坐标换算到 640×640 模型空间。
pub fn decode_yolo_output(
  output: &[f32],
  anchors: usize,
  conf_threshold: f32,
) -> (bool, Option<FireBox>) {
  if output.len() < YOLO_ROWS * anchors {
    debug!(
      "输出长度不足: 期望 {}, 实际 {}",
      YOLO_ROWS * anchors,
      output.len()
    );
    return (false, None);
  }

  let row = |r: usize, i: usize| output[r * anchors + i];

  let mut frame_flame = false;
  let mut best: Option<(usize, f32)> = None;
  for i in 0..anchors {
    let conf = row(4, i);
    if conf > conf_threshold {
      frame_flame = true;
      if best.is_none_or(|(_, best_conf)| conf > best_conf) {
        best = Some((i, conf));
      }
    }
  }

  let size = MODEL_INPUT_SIZE as f32;
  let bbox = best.map(|(i, conf)| {
    FireBox::from_center(
      row(0, i) * size,
      row(1, i) * size,
      row(2, i) * size,
      row(3, i) * size,
      conf,
    )
  });

  (frame_flame, bbox)
}
