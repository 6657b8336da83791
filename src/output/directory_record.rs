// 该文件是 Tance （探测） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! 将结果序列逐个写入输出目录。
//!
//! 第 i 个被消费的结果（从 0 开始）写入 `<directory>/result_<i>.<ext>`。
//! 编号只由消费顺序决定；同名的旧文件直接覆盖。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::output::Render;

pub const DEFAULT_FILE_EXT: &str = "jpg";
const ARTIFACT_PREFIX: &str = "result_";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("无法创建输出目录 {}: {source}", path.display())]
  CreateDirectory {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("保存第 {index} 个结果到 {} 失败: {source}", path.display())]
  Persist {
    index: usize,
    path: PathBuf,
    source: BoxError,
  },
}

impl DirectoryRecordOutputError {
  /// 写入失败时正在处理的结果编号
  pub fn index(&self) -> Option<usize> {
    match self {
      DirectoryRecordOutputError::Persist { index, .. } => Some(*index),
      DirectoryRecordOutputError::CreateDirectory { .. } => None,
    }
  }
}

pub struct DirectoryRecordOutput<Rd> {
  directory: PathBuf,
  extension: String,
  render: Rd,
  next_index: usize,
  directory_ready: bool,
}

impl<Rd> DirectoryRecordOutput<Rd> {
  /// 扩展名前导的 `.` 会被去掉；构造时不触碰文件系统
  pub fn new(directory: impl Into<PathBuf>, extension: &str, render: Rd) -> Self {
    let extension = extension.trim_start_matches('.');
    let extension = if extension.is_empty() {
      DEFAULT_FILE_EXT
    } else {
      extension
    };

    Self {
      directory: directory.into(),
      extension: extension.to_string(),
      render,
      next_index: 0,
      directory_ready: false,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn extension(&self) -> &str {
    &self.extension
  }

  /// 已分配的编号数量，即下一个结果的编号
  pub fn written(&self) -> usize {
    self.next_index
  }

  pub fn artifact_path(&self, index: usize) -> PathBuf {
    self
      .directory
      .join(format!("{}{}.{}", ARTIFACT_PREFIX, index, self.extension))
  }

  /// 确保输出目录存在。目录已存在时什么也不做；一次运行中只检查一次。
  pub fn ensure_directory(&mut self) -> Result<(), DirectoryRecordOutputError> {
    if self.directory_ready {
      return Ok(());
    }

    std::fs::create_dir_all(&self.directory).map_err(|source| {
      error!("创建输出目录失败 {}: {}", self.directory.display(), source);
      DirectoryRecordOutputError::CreateDirectory {
        path: self.directory.clone(),
        source,
      }
    })?;

    info!("输出目录已就绪: {}", self.directory.display());
    self.directory_ready = true;
    Ok(())
  }

  /// 为结果分配下一个编号并写入。编号在写入前分配，失败不会回收。
  pub fn write<R>(&mut self, result: &R) -> Result<PathBuf, DirectoryRecordOutputError>
  where
    Rd: Render<R>,
    Rd::Error: std::error::Error + Send + Sync + 'static,
  {
    self.ensure_directory()?;

    let index = self.next_index;
    self.next_index += 1;
    let path = self.artifact_path(index);

    debug!("写入结果 {} -> {}", index, path.display());
    self
      .render
      .render_to(result, &path)
      .map_err(|source| DirectoryRecordOutputError::Persist {
        index,
        path: path.clone(),
        source: Box::new(source),
      })?;

    Ok(path)
  }
}
