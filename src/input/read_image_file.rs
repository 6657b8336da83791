// 该文件是 Tance （探测） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::PathBuf;

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::{Frame, FrameOrigin};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O 错误 ({}): {source}", path.display())]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("图像解码错误 ({}): {source}", path.display())]
  ImageLoadError {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 单张图像文件，只产生一帧，在第一次拉取时解码
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl ImageFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: Some(path.into()),
    }
  }

  fn load(path: PathBuf) -> Result<Frame, ImageFileInputError> {
    let reader = match ImageReader::open(&path) {
      Ok(reader) => reader,
      Err(source) => return Err(ImageFileInputError::IoError { path, source }),
    };
    let reader = match reader.with_guessed_format() {
      Ok(reader) => reader,
      Err(source) => return Err(ImageFileInputError::IoError { path, source }),
    };
    let image = match reader.decode() {
      Ok(image) => image,
      Err(source) => {
        error!("图像解码失败 {}: {}", path.display(), source);
        return Err(ImageFileInputError::ImageLoadError { path, source });
      }
    };

    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(Frame::new(image.into_rgb8(), FrameOrigin::image(path)))
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.path.take().map(Self::load)
  }
}
