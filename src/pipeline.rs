// 该文件是 Tance （探测） 项目的一部分。
// src/pipeline.rs - 推理到结果文件的完整流程
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

use std::sync::mpsc::Receiver;

use thiserror::Error;
use tracing::info;

use crate::{
  config::{ConfigError, InferenceConfig},
  frame::Frame,
  model::{DetectResult, Model, ModelWrapper},
  output::{AnnotatedImageRender, DirectoryRecordOutput, DirectoryRecordOutputError},
  predict::Predictor,
  task::{BatchTask, Task},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigError),
  #[error("输入源错误: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
  #[error("输出错误: {0}")]
  Output(#[from] DirectoryRecordOutputError),
  #[error("任务被中断，已写入 {written} 个结果")]
  Interrupted { written: usize },
}

impl PipelineError {
  /// 出错的阶段名称
  pub fn stage(&self) -> &'static str {
    match self {
      PipelineError::Configuration(_) => "model-load",
      PipelineError::Source(_) => "source",
      PipelineError::Output(_) => "artifact-write",
      PipelineError::Interrupted { .. } => "interrupted",
    }
  }
}

/// 加载配置中的模型后运行
pub fn run(config: &InferenceConfig, interrupt: Option<Receiver<()>>) -> Result<(), PipelineError> {
  let model = ModelWrapper::load(&config.weights).map_err(ConfigError::from)?;
  run_with_model(model, config, interrupt)
}

/// 使用给定模型运行：解析输入源，确保输出目录，按顺序写入每个结果
pub fn run_with_model<M>(
  model: M,
  config: &InferenceConfig,
  interrupt: Option<Receiver<()>>,
) -> Result<(), PipelineError>
where
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  config.check_file_ext();
  let render = AnnotatedImageRender::new(config.build_draw()?);

  let predictor = Predictor::new(model);
  let predictions = predictor
    .predict(config.source())
    .map_err(|e| PipelineError::Source(Box::new(e)))?;

  info!(
    "输出目录: {}, 扩展名: {}",
    config.output_dir.display(),
    config.file_ext
  );
  let output = DirectoryRecordOutput::new(&config.output_dir, &config.file_ext, render);

  let task = match interrupt {
    Some(rx) => BatchTask::default().with_interrupt(rx),
    None => BatchTask::default(),
  };
  task.run_task(predictions, output)
}
