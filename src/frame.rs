// 该文件是 Tance （探测） 项目的一部分。
// src/frame.rs - 帧定义
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

use std::{fmt, path::PathBuf};

use image::{RgbImage, imageops::FilterType};

/// 帧的来源：文件路径，以及视频中的帧序号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOrigin {
  pub path: PathBuf,
  pub frame_index: Option<u64>,
}

impl FrameOrigin {
  pub fn image(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      frame_index: None,
    }
  }

  pub fn video(path: impl Into<PathBuf>, frame_index: u64) -> Self {
    Self {
      path: path.into(),
      frame_index: Some(frame_index),
    }
  }
}

impl fmt::Display for FrameOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.frame_index {
      Some(index) => write!(f, "{}#{}", self.path.display(), index),
      None => write!(f, "{}", self.path.display()),
    }
  }
}

/// 输入源产生的一帧原始图像
#[derive(Debug, Clone)]
pub struct Frame {
  pub image: RgbImage,
  pub origin: FrameOrigin,
}

impl Frame {
  pub fn new(image: RgbImage, origin: FrameOrigin) -> Self {
    Self { image, origin }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

/// 固定尺寸的 NHWC 模型输入
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  /// 将任意尺寸的图像拉伸到 W x H。
  /// 检测框使用归一化坐标，拉伸后可直接映射回原图。
  pub fn from_rgb_image(image: &RgbImage) -> Self {
    if image.dimensions() == (W, H) {
      return Self {
        data: image.as_raw().clone().into_boxed_slice(),
      };
    }

    let resized = image::imageops::resize(image, W, H, FilterType::Triangle);
    Self {
      data: resized.into_raw().into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> From<&Frame> for RgbNhwcFrame<W, H> {
  fn from(frame: &Frame) -> Self {
    Self::from_rgb_image(&frame.image)
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
