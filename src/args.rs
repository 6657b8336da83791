// 该文件是 Tance （探测） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;

use tance::config::{DEFAULT_OUTPUT_DIR, DEFAULT_WEIGHTS, InferenceConfig};

/// Tance 批量检测推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.tif, *.tiff, *.webp
  /// - 视频: *.mp4, *.avi, *.mkv, *.mov 等
  /// - 目录: 目录下（不递归）的图片与视频，按文件名排序
  #[arg(value_name = "SOURCE")]
  pub source: PathBuf,

  /// 模型权重路径，或 `yolo26:<path>` 形式指定后端
  #[arg(long, value_name = "WEIGHTS", default_value = DEFAULT_WEIGHTS)]
  pub weights: String,

  /// 结果输出目录
  #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
  pub output_dir: PathBuf,

  /// 结果文件扩展名
  #[arg(long, value_name = "EXT", default_value = "jpg")]
  pub file_ext: String,

  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 标注文字使用的字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

impl From<Args> for InferenceConfig {
  fn from(args: Args) -> Self {
    InferenceConfig::new(args.source)
      .with_weights(args.weights)
      .with_output_dir(args.output_dir)
      .with_file_ext(args.file_ext)
      .with_labels(args.labels)
      .with_font(args.font)
  }
}
