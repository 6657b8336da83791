// 该文件是 Tance （探测） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 将视频文件解码为 RGB 帧，按帧序号依次产生，不丢帧。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! **Fedora/RHEL:**
//! ```bash
//! sudo dnf install gstreamer1-devel gstreamer1-plugins-base-devel
//! ```
//!
//! 在 `Cargo.toml` 中启用 `gstreamer_input` 特性后，目录或视频输入源中的视频文件
//! 才会被解码；否则读取视频时返回 `InputError::VideoUnsupported`。

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::frame::{Frame, FrameOrigin};

const RGB_CHANNELS: usize = 3;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

fn file_pipeline(path: &Path) -> String {
  let location = path.display().to_string().replace('"', "\\\"");
  // 批处理不允许丢帧：appsink 阻塞上游而不是丢弃缓冲区
  format!(
    "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
     appsink name=sink sync=false max-buffers=4 drop=false",
    location
  )
}

/// 视频文件输入，迭代产生每一帧
pub struct GStreamerVideoInput {
  path: PathBuf,
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  frame_index: u64,
  finished: bool,
}

impl Drop for GStreamerVideoInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerVideoInput {
  pub fn open(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = file_pipeline(path);
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerVideoInput {
      path: path.to_path_buf(),
      pipeline,
      appsink,
      frame_index: 0,
      finished: false,
    })
  }

  /// 拉取失败时区分正常结束与管道错误。
  /// 解码出错时上游会在错误消息之后再推送 EOS，所以先检查总线上的错误。
  fn pipeline_failure(&self) -> Option<GStreamerInputError> {
    if let Some(err) = self.pipeline.bus().and_then(|bus| bus_error(&bus)) {
      error!("GStreamer 管道错误 ({}): {}", self.path.display(), err);
      return Some(err);
    }

    if self.appsink.is_eos() {
      debug!("视频 {} 解码结束，共 {} 帧", self.path.display(), self.frame_index);
      return None;
    }

    Some(GStreamerInputError::PipelineError(format!(
      "在第 {} 帧之后无法继续读取，且未到达流末尾",
      self.frame_index
    )))
  }

  fn next_frame(&mut self) -> Option<Result<Frame, GStreamerInputError>> {
    if self.finished {
      return None;
    }

    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) => {
        self.finished = true;
        return self.pipeline_failure().map(Err);
      }
    };

    let index = self.frame_index;
    self.frame_index += 1;
    debug!("解码视频帧 {}#{}", self.path.display(), index);

    let result = convert_sample_to_rgb(&sample)
      .map(|image| Frame::new(image, FrameOrigin::video(&self.path, index)));
    if result.is_err() {
      self.finished = true;
    }
    Some(result)
  }
}

impl Iterator for GStreamerVideoInput {
  type Item = Result<Frame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.next_frame()
  }
}

/// 取出总线上第一条错误消息
fn bus_error(bus: &gst::Bus) -> Option<GStreamerInputError> {
  let message = bus.pop_filtered(&[gst::MessageType::Error])?;
  match message.view() {
    gst::MessageView::Error(err) => {
      let debug_info = err
        .debug()
        .map(|d| d.to_string())
        .unwrap_or_default();
      Some(GStreamerInputError::PipelineError(format!(
        "{}: {}",
        err.error(),
        debug_info
      )))
    }
    _ => None,
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row_size = width * RGB_CHANNELS;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = if height == 0 {
    0
  } else {
    (height - 1) * stride + row_size
  };
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_size * height);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_size]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for row in 0..height {
        let start = row * stride;
        for bgr in data[start..start + row_size].chunks_exact(RGB_CHANNELS) {
          pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
        }
      }
    }
    other => return Err(GStreamerInputError::UnsupportedFormat(other)),
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row_size * height,
      actual: data.len(),
    },
  )
}
