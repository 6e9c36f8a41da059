// 该文件是 FireGuard （火卫） 项目的一部分。
// src/output/draw.rs - 火焰叠加框绘制
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::output::{
  FrameReport,
  overlay::{ScreenRect, Viewport},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 3;
const FIRE_COLOR: [u8; 3] = [255, 59, 48];

pub struct Draw {
  font: Option<FontVec>,
  color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      color: FIRE_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 从字体文件加载标签字体；不设置字体时只画框
  pub fn with_font_file(mut self, path: &Path) -> std::io::Result<Self> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    self.font = Some(font);
    Ok(self)
  }

  /// 把静帧缩放到视口大小，并按屏幕坐标画出叠加框
  pub fn render_preview(&self, still: &RgbImage, report: &FrameReport) -> RgbImage {
    let viewport = &report.viewport;
    let (w, h) = (
      viewport.width.round().max(1.0) as u32,
      viewport.height.round().max(1.0) as u32,
    );
    let mut preview = if still.dimensions() == (w, h) {
      still.clone()
    } else {
      image::imageops::resize(still, w, h, FilterType::Triangle)
    };

    if let Some(rect) = &report.overlay {
      self.draw_overlay(&mut preview, rect, viewport);
    }
    preview
  }

  /// 画一个屏幕坐标的叠加框，图像左上角对应视口原点
  pub fn draw_overlay(&self, image: &mut RgbImage, rect: &ScreenRect, viewport: &Viewport) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = ((rect.left - viewport.x).floor() as i32).clamp(0, w - 1);
    let y_min = ((rect.top - viewport.y).floor() as i32).clamp(0, h - 1);
    let x_max = ((rect.right() - viewport.x).ceil() as i32).clamp(0, w - 1);
    let y_max = ((rect.bottom() - viewport.y).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let border = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, border, Rgb(self.color));
    }

    if let Some(font) = &self.font {
      self.draw_label(image, font, x_min, y_min, rect.conf);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, font: &FontVec, x: i32, y: i32, conf: f32) {
    let label = format!("FIRE {:.2}", conf);

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x.max(0);
    let label_y = (y - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min((image.width() as i32 - label_x).max(0)) as u32;

    if label_width == 0 {
      return;
    }
    let rect = Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, rect, Rgb(self.color));
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      label_x,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      PxScale::from(LABEL_FONT_SIZE),
      font,
      &label,
    );
  }
}

/// 把检测结果写成与图片同名的 `.txt` 记录
pub struct Record;

impl Record {
  pub fn record(&self, report: &FrameReport, path: &Path) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    if let Some(bbox) = report.detection.bbox {
      records.push(format!(
        "{:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
        bbox.conf, bbox.x1, bbox.y1, bbox.x2, bbox.y2
      ));
    }
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Detection, FireBox};

  fn report(viewport: Viewport, overlay: Option<ScreenRect>) -> FrameReport {
    FrameReport {
      detection: Detection {
        flame: true,
        bbox: Some(FireBox {
          x1: 64.0,
          y1: 64.0,
          x2: 320.0,
          y2: 320.0,
          conf: 0.91,
        }),
      },
      overlay,
      viewport,
    }
  }

  #[test]
  fn preview_is_viewport_sized_with_box() {
    let still = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
    let viewport = Viewport::new(100.0, 50.0);
    let rect = ScreenRect {
      left: 10.0,
      top: 10.0,
      width: 40.0,
      height: 20.0,
      conf: 0.91,
    };
    let preview = Draw::default().render_preview(&still, &report(viewport, Some(rect)));

    assert_eq!(preview.dimensions(), (100, 50));
    assert_eq!(*preview.get_pixel(10, 10), Rgb(FIRE_COLOR));
    assert_eq!(*preview.get_pixel(50, 30), Rgb(FIRE_COLOR));
    assert_eq!(*preview.get_pixel(30, 20), Rgb([0, 0, 0]));
    assert_eq!(*preview.get_pixel(5, 5), Rgb([0, 0, 0]));
  }

  #[test]
  fn box_outside_image_is_skipped() {
    let mut image = RgbImage::new(20, 20);
    let rect = ScreenRect {
      left: 100.0,
      top: 100.0,
      width: 10.0,
      height: 10.0,
      conf: 0.7,
    };
    Draw::default().draw_overlay(&mut image, &rect, &Viewport::new(20.0, 20.0));
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn record_writes_side_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    Record
      .record(&report(Viewport::new(640.0, 640.0), None), &path)
      .unwrap();
    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert_eq!(text, "0.9100, 64.00, 64.00, 320.00, 320.00");
  }
}
