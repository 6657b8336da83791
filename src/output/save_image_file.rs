// 该文件是 Tance （探测） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use thiserror::Error;
use tracing::debug;

use crate::{
  output::{Render, draw::Draw},
  predict::Prediction,
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 在原始帧上绘制检测框后按扩展名编码保存，不负责创建目录
pub struct AnnotatedImageRender {
  draw: Draw,
}

impl AnnotatedImageRender {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }
}

impl Default for AnnotatedImageRender {
  fn default() -> Self {
    Self::new(Draw::default())
  }
}

impl Render<Prediction> for AnnotatedImageRender {
  type Error = SaveImageFileError;

  fn render_to(&self, prediction: &Prediction, path: &Path) -> Result<(), Self::Error> {
    let image = self
      .draw
      .draw_detection(&prediction.frame.image, &prediction.result);
    image.save(path)?;
    debug!("保存图像到文件: {}", path.display());
    Ok(())
  }
}
