// 该文件是 Tance （探测） 项目的一部分。
// src/task.rs - 批处理任务
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

use tracing::{error, info, warn};

use crate::{
  output::{DirectoryRecordOutput, Render},
  pipeline::PipelineError,
};

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task(self, input: I, output: O) -> Result<(), Self::Error>;
}

/// 逐个拉取结果并写入输出目录：先确保目录存在，再按顺序写入，遇错即停
#[derive(Default, Debug)]
pub struct BatchTask {
  interrupt: Option<Receiver<()>>,
}

impl BatchTask {
  /// 每写完一个结果检查一次中断信号
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

impl<R, E, I, Rd> Task<I, DirectoryRecordOutput<Rd>> for BatchTask
where
  I: IntoIterator<Item = Result<R, E>>,
  E: std::error::Error + Send + Sync + 'static,
  Rd: Render<R>,
  Rd::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = PipelineError;

  fn run_task(self, input: I, mut output: DirectoryRecordOutput<Rd>) -> Result<(), Self::Error> {
    info!("开始任务...");
    output.ensure_directory()?;

    let now = std::time::Instant::now();
    for item in input {
      let result = item.map_err(|e| {
        error!("第 {} 个结果获取失败: {}", output.written(), e);
        PipelineError::Source(Box::new(e))
      })?;

      let path = output.write(&result).map_err(|e| {
        error!("{}", e);
        PipelineError::from(e)
      })?;
      info!("已保存结果: {}", path.display());

      if self.interrupted() {
        warn!("中断信号接收，已写入 {} 个结果", output.written());
        return Err(PipelineError::Interrupted {
          written: output.written(),
        });
      }
    }

    info!(
      "任务完成，共写入 {} 个结果，耗时: {:.2?}",
      output.written(),
      now.elapsed()
    );
    Ok(())
  }
}
