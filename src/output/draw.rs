// 该文件是 Tance （探测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::model::{DetectItem, DetectResult, Labels};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: u32 = 24;
const LABEL_SWATCH_WIDTH: u32 = 12; // 无字体时的标签色块宽度
const LABEL_TEXT_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 80;

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  Invalid(#[from] InvalidFont),
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  label_text_height: u32,
  palette: Vec<Rgb<u8>>,
  labels: Labels,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      palette: (0..PALETTE_SIZE)
        .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
        .collect(),
      labels: Labels::default(),
    }
  }
}

impl Draw {
  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn load_font(path: &Path) -> Result<FontVec, FontError> {
    let data = std::fs::read(path)?;
    Ok(FontVec::try_from_vec(data)?)
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.palette[class_id as usize % self.palette.len()]
  }

  pub fn label_of(&self, item: &DetectItem) -> String {
    format!("{} {:.2}", self.labels.name(item.class_id), item.score)
  }

  /// 在图像副本上绘制全部检测结果
  pub fn draw_detection(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut canvas = image.clone();
    for item in result.items.iter() {
      self.draw_bbox_with_label(&mut canvas, item);
    }
    canvas
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let Some(bbox) = pixel_rect(image, &item.bbox) else {
      return;
    };
    let color = self.color_of(item.class_id);

    // 边框加粗为 2 像素
    for t in 0..BOX_THICKNESS {
      let width = bbox.width().saturating_sub(2 * t as u32);
      let height = bbox.height().saturating_sub(2 * t as u32);
      if width == 0 || height == 0 {
        break;
      }
      draw_hollow_rect_mut(
        image,
        Rect::at(bbox.left() + t, bbox.top() + t).of_size(width, height),
        color,
      );
    }

    let label = self.label_of(item);
    let scale = PxScale::from(self.font_size);
    let label_width = match &self.font {
      Some(font) => text_size(scale, font, &label).0 + 2 * LABEL_TEXT_PADDING as u32,
      None => LABEL_SWATCH_WIDTH,
    };

    // 标签放在框的上方，空间不足时贴着图像上边缘
    let label_x = bbox.left();
    let label_y = (bbox.top() - self.label_text_height as i32).max(0);
    let label_width = label_width.min(image.width().saturating_sub(label_x as u32));
    if label_width == 0 {
      return;
    }

    draw_filled_rect_mut(
      image,
      Rect::at(label_x, label_y).of_size(label_width, self.label_text_height),
      color,
    );

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255, 255, 255]),
        label_x + LABEL_TEXT_PADDING,
        label_y + LABEL_TEXT_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

/// 归一化 bbox 转为像素矩形，裁剪到图像范围内；退化的框返回 None
fn pixel_rect(image: &RgbImage, bbox: &[f32; 4]) -> Option<Rect> {
  let (w, h) = (image.width() as f32, image.height() as f32);
  if w < 1.0 || h < 1.0 {
    return None;
  }

  let x_min = (bbox[0] * w).floor().clamp(0.0, w - 1.0) as i32;
  let y_min = (bbox[1] * h).floor().clamp(0.0, h - 1.0) as i32;
  let x_max = (bbox[2] * w).ceil().clamp(0.0, w - 1.0) as i32;
  let y_max = (bbox[3] * h).ceil().clamp(0.0, h - 1.0) as i32;

  if x_min >= x_max || y_min >= y_max {
    return None;
  }

  Some(Rect::at(x_min, y_min).of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32))
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
