// 该文件是 Tance （探测） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use tance::{config::InferenceConfig, pipeline};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let config = InferenceConfig::from(args::Args::parse());

  info!("模型权重: {}", config.weights);
  info!("输入来源: {}", config.source.display());
  info!("输出目录: {}", config.output_dir.display());

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，当前结果写入后停止...");
    let _ = tx.send(());
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  if let Err(e) = pipeline::run(&config, Some(rx)) {
    error!("运行失败 [{}]: {}", e.stage(), e);
    return Err(e.into());
  }

  info!("全部结果已保存到 {}", config.output_dir.display());
  Ok(())
}
