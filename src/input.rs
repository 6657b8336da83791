// 该文件是 Tance （探测） 项目的一部分。
// src/input.rs - 图像/视频/目录输入源解析
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

//! 输入源模块
//!
//! 输入源是一个文件系统路径，可以是单张图片、单个视频，或包含图片/视频的目录。
//! [`SourceFrames`] 把它解析为按发现顺序惰性产生的帧序列：
//! - 目录只扫描一层，按文件名排序，跳过不支持的文件；
//! - 图片在被拉取时才解码；
//! - 视频在轮到时才打开，并按帧序号依次产生每一帧。

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::Frame;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInputError, GStreamerVideoInput};

/// 只列出启用的 `image` 解码器能读取的格式
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp"];

pub const VIDEO_EXTENSIONS: &[&str] = &[
  "asf", "avi", "gif", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ts", "wmv", "webm",
];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入源不存在: {}", .0.display())]
  SourceNotFound(PathBuf),
  #[error("无法读取输入源 {}: {source}", path.display())]
  SourceUnreadable {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("不支持的输入格式: {}", .0.display())]
  UnsupportedFormat(PathBuf),
  #[error("未启用视频解码支持，无法读取: {}", .0.display())]
  VideoUnsupported(PathBuf),
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
}

/// 媒体文件种类，由扩展名决定（不区分大小写）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MediaKind {
  Image,
  Video,
}

impl MediaKind {
  pub fn of(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Video)
    } else {
      None
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaFile {
  path: PathBuf,
  kind: MediaKind,
}

enum MediaFrames {
  Image(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  Video(GStreamerVideoInput),
}

impl MediaFrames {
  fn open(file: MediaFile) -> Result<Self, InputError> {
    match file.kind {
      MediaKind::Image => Ok(MediaFrames::Image(ImageFileInput::new(file.path))),
      #[cfg(feature = "gstreamer_input")]
      MediaKind::Video => Ok(MediaFrames::Video(GStreamerVideoInput::open(&file.path)?)),
      #[cfg(not(feature = "gstreamer_input"))]
      MediaKind::Video => Err(InputError::VideoUnsupported(file.path)),
    }
  }

  fn next_frame(&mut self) -> Option<Result<Frame, InputError>> {
    match self {
      MediaFrames::Image(input) => input.next().map(|r| r.map_err(InputError::from)),
      #[cfg(feature = "gstreamer_input")]
      MediaFrames::Video(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

/// 输入源帧序列，只能按顺序消费一次
pub struct SourceFrames {
  pending: VecDeque<MediaFile>,
  current: Option<MediaFrames>,
}

impl SourceFrames {
  /// 解析输入源路径。路径是否存在、目录是否可读在此处立即检查，
  /// 文件内容的解码推迟到迭代时进行。
  pub fn open(source: impl AsRef<Path>) -> Result<Self, InputError> {
    let source = source.as_ref();
    if !source.exists() {
      return Err(InputError::SourceNotFound(source.to_path_buf()));
    }

    let pending = if source.is_dir() {
      let files = scan_directory(source)?;
      info!("目录 {} 中发现 {} 个媒体文件", source.display(), files.len());
      files
    } else {
      let kind =
        MediaKind::of(source).ok_or_else(|| InputError::UnsupportedFormat(source.to_path_buf()))?;
      VecDeque::from([MediaFile {
        path: source.to_path_buf(),
        kind,
      }])
    };

    Ok(SourceFrames {
      pending,
      current: None,
    })
  }

  /// 尚未打开的媒体文件数
  pub fn remaining_files(&self) -> usize {
    self.pending.len()
  }
}

fn scan_directory(dir: &Path) -> Result<VecDeque<MediaFile>, InputError> {
  let unreadable = |source| InputError::SourceUnreadable {
    path: dir.to_path_buf(),
    source,
  };

  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(unreadable)? {
    let path = entry.map_err(unreadable)?.path();
    if !path.is_file() || is_hidden(&path) {
      continue;
    }
    match MediaKind::of(&path) {
      Some(kind) => files.push(MediaFile { path, kind }),
      None => debug!("跳过不支持的文件: {}", path.display()),
    }
  }

  // 先图片后视频，各自按文件名排序
  files.sort_by(|a, b| {
    (a.kind, a.path.file_name()).cmp(&(b.kind, b.path.file_name()))
  });
  Ok(files.into())
}

/// 以 `.` 开头的文件（如 macOS 的 `._photo.jpg`）不属于输入
fn is_hidden(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|n| n.starts_with('.'))
}

impl Iterator for SourceFrames {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(current) = self.current.as_mut() {
        match current.next_frame() {
          Some(item) => return Some(item),
          None => self.current = None,
        }
      }

      let file = self.pending.pop_front()?;
      debug!("打开媒体文件: {}", file.path.display());
      match MediaFrames::open(file) {
        Ok(frames) => self.current = Some(frames),
        Err(e) => {
          warn!("打开媒体文件失败: {}", e);
          return Some(Err(e));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn write_image(dir: &Path, name: &str, width: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, 4, Rgb([200, 10, 10]))
      .save(&path)
      .unwrap();
    path
  }

  #[test]
  fn media_kind_is_case_insensitive() {
    assert_eq!(MediaKind::of(Path::new("a/B.JPG")), Some(MediaKind::Image));
    assert_eq!(MediaKind::of(Path::new("clip.Mp4")), Some(MediaKind::Video));
    assert_eq!(MediaKind::of(Path::new("notes.txt")), None);
    assert_eq!(MediaKind::of(Path::new("no_extension")), None);
  }

  #[test]
  fn missing_source_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = SourceFrames::open(dir.path().join("nope.jpg")).err().unwrap();
    assert!(matches!(err, InputError::SourceNotFound(_)));
  }

  #[test]
  fn single_file_with_unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readme.txt");
    std::fs::write(&path, "hello").unwrap();

    let err = SourceFrames::open(&path).err().unwrap();
    assert!(matches!(err, InputError::UnsupportedFormat(_)));
  }

  #[test]
  fn directory_is_scanned_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "b.png", 2);
    write_image(dir.path(), "a.png", 1);
    write_image(dir.path(), "c.png", 3);
    std::fs::write(dir.path().join("skip.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let frames = SourceFrames::open(dir.path()).unwrap();
    assert_eq!(frames.remaining_files(), 3);

    let widths: Vec<u32> = frames.map(|f| f.unwrap().width()).collect();
    assert_eq!(widths, vec![1, 2, 3]);
  }

  #[test]
  fn hidden_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "photo.jpg", 5);
    std::fs::write(dir.path().join("._photo.jpg"), b"\x00\x05\x16\x07AppleDouble").unwrap();
    std::fs::write(dir.path().join(".thumb.png"), b"junk").unwrap();

    let frames = SourceFrames::open(dir.path()).unwrap();
    assert_eq!(frames.remaining_files(), 1);
    let widths: Vec<u32> = frames.map(|f| f.unwrap().width()).collect();
    assert_eq!(widths, vec![5]);
  }

  #[test]
  fn images_come_before_videos() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mp4"), b"").unwrap();
    write_image(dir.path(), "b.png", 2);
    write_image(dir.path(), "c.png", 3);

    let files = scan_directory(dir.path()).unwrap();
    let names: Vec<_> = files
      .iter()
      .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["b.png", "c.png", "a.mp4"]);
  }

  #[test]
  fn formats_without_decoder_are_not_media() {
    assert_eq!(MediaKind::of(Path::new("raw.dng")), None);
    assert_eq!(MediaKind::of(Path::new("phone.heic")), None);
    assert_eq!(MediaKind::of(Path::new("depth.pfm")), None);
  }

  #[test]
  fn empty_directory_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "x").unwrap();

    let mut frames = SourceFrames::open(dir.path()).unwrap();
    assert!(frames.next().is_none());
  }

  #[test]
  fn corrupt_image_surfaces_as_error_item() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

    let mut frames = SourceFrames::open(dir.path()).unwrap();
    assert!(matches!(
      frames.next(),
      Some(Err(InputError::ImageFileInputError(_)))
    ));
    assert!(frames.next().is_none());
  }

  #[cfg(not(feature = "gstreamer_input"))]
  #[test]
  fn video_without_decoder_fails_when_reached() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 1);
    std::fs::write(dir.path().join("b.mp4"), b"").unwrap();

    let mut frames = SourceFrames::open(dir.path()).unwrap();
    assert!(matches!(frames.next(), Some(Ok(_))));
    assert!(matches!(
      frames.next(),
      Some(Err(InputError::VideoUnsupported(_)))
    ));
  }
}
