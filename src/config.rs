// 该文件是 Tance （探测） 项目的一部分。
// src/config.rs - 推理运行配置
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

use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use tracing::warn;

use crate::{
  model::{Labels, ModelError},
  output::{
    DEFAULT_FILE_EXT,
    draw::{Draw, FontError},
  },
};

pub const DEFAULT_WEIGHTS: &str = "runs/detect/probe_train/weights/best.rknn";
pub const DEFAULT_OUTPUT_DIR: &str = "inference_results";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("模型加载失败: {0}")]
  Model(#[from] ModelError),
  #[error("字体加载失败 ({}): {source}", path.display())]
  Font { path: PathBuf, source: FontError },
  #[error("无法读取类别名称文件 {}: {source}", path.display())]
  Labels {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// 一次推理运行的全部配置，构造后传入流水线
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
  pub weights: String,
  pub source: PathBuf,
  pub output_dir: PathBuf,
  pub file_ext: String,
  pub labels: Option<PathBuf>,
  pub font: Option<PathBuf>,
}

impl InferenceConfig {
  pub fn new(source: impl Into<PathBuf>) -> Self {
    Self {
      weights: DEFAULT_WEIGHTS.to_string(),
      source: source.into(),
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      file_ext: DEFAULT_FILE_EXT.to_string(),
      labels: None,
      font: None,
    }
  }

  pub fn with_weights(mut self, weights: impl Into<String>) -> Self {
    self.weights = weights.into();
    self
  }

  pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
    self.output_dir = output_dir.into();
    self
  }

  pub fn with_file_ext(mut self, file_ext: impl Into<String>) -> Self {
    self.file_ext = file_ext.into();
    self
  }

  pub fn with_labels(mut self, labels: Option<PathBuf>) -> Self {
    self.labels = labels;
    self
  }

  pub fn with_font(mut self, font: Option<PathBuf>) -> Self {
    self.font = font;
    self
  }

  /// 无法编码的扩展名只给出警告，实际写入时才会失败
  pub fn check_file_ext(&self) -> bool {
    let ext = self.file_ext.trim_start_matches('.');
    let known = ImageFormat::from_extension(ext).is_some_and(|f| f.writing_enabled());
    if !known {
      warn!("输出扩展名 `{}` 可能无法编码为图像", ext);
    }
    known
  }

  /// 按配置加载类别名称与字体
  pub fn build_draw(&self) -> Result<Draw, ConfigError> {
    let mut draw = Draw::default();

    if let Some(path) = &self.labels {
      let labels = Labels::from_file(path).map_err(|source| ConfigError::Labels {
        path: path.clone(),
        source,
      })?;
      draw = draw.with_labels(labels);
    }

    if let Some(path) = &self.font {
      let font = Draw::load_font(path).map_err(|source| ConfigError::Font {
        path: path.clone(),
        source,
      })?;
      draw = draw.with_font(font);
    }

    Ok(draw)
  }

  pub fn source(&self) -> &Path {
    &self.source
  }
}
