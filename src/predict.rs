// 该文件是 Tance （探测） 项目的一部分。
// src/predict.rs - 输入源推理，产生检测结果序列
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
use tracing::{debug, info};

use crate::{
  frame::Frame,
  input::{InputError, SourceFrames},
  model::{DetectResult, Model},
};

#[derive(Error, Debug)]
pub enum PredictError {
  #[error(transparent)]
  Source(#[from] InputError),
  #[error("推理失败 ({origin}): {source}")]
  Inference {
    origin: String,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
  },
}

/// 单帧的检测结果，连同被检测的原始帧
#[derive(Debug, Clone)]
pub struct Prediction {
  pub frame: Frame,
  pub result: DetectResult,
}

pub struct Predictor<M> {
  model: M,
}

impl<M> Predictor<M>
where
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M) -> Self {
    Self { model }
  }

  /// 解析输入源并返回惰性结果序列。
  /// 路径不存在等错误在这里立即返回；解码与推理在迭代时进行。
  pub fn predict(&self, source: impl AsRef<Path>) -> Result<Predictions<'_, M>, PredictError> {
    let source = source.as_ref();
    info!("解析输入源: {}", source.display());
    let frames = SourceFrames::open(source)?;
    Ok(Predictions {
      model: &self.model,
      frames,
    })
  }
}

/// 按输入顺序产生的检测结果，只能消费一次
pub struct Predictions<'m, M> {
  model: &'m M,
  frames: SourceFrames,
}

impl<M> Iterator for Predictions<'_, M>
where
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  type Item = Result<Prediction, PredictError>;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = match self.frames.next()? {
      Ok(frame) => frame,
      Err(e) => return Some(Err(e.into())),
    };

    let now = std::time::Instant::now();
    let item = match self.model.infer(&frame) {
      Ok(result) => {
        debug!(
          "{}: 检测到 {} 个对象，耗时 {:.2?}",
          frame.origin,
          result.len(),
          now.elapsed()
        );
        Ok(Prediction { frame, result })
      }
      Err(e) => Err(PredictError::Inference {
        origin: frame.origin.to_string(),
        source: Box::new(e),
      }),
    };
    Some(item)
  }
}
