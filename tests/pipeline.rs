// 该文件是 Tance （探测） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use std::{cell::Cell, fmt, path::Path};

use image::{GenericImageView, Rgb, RgbImage};

use tance::{
  config::{ConfigError, InferenceConfig},
  frame::Frame,
  model::{DetectItem, DetectResult, Model, ModelError},
  pipeline::{self, PipelineError},
};

#[derive(Debug)]
struct Exhausted;

impl fmt::Display for Exhausted {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "exhausted")
  }
}

impl std::error::Error for Exhausted {}

/// 每帧返回一个居中的框；设置了 `fail_at` 时第 `fail_at` 次调用（从 0 开始）失败
#[derive(Default)]
struct StubModel {
  calls: Cell<usize>,
  fail_at: Option<usize>,
}

impl StubModel {
  fn failing_at(k: usize) -> Self {
    Self {
      calls: Cell::new(0),
      fail_at: Some(k),
    }
  }
}

impl Model for StubModel {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Exhausted;

  fn infer(&self, _input: &Frame) -> Result<DetectResult, Exhausted> {
    let call = self.calls.get();
    self.calls.set(call + 1);
    if self.fail_at == Some(call) {
      return Err(Exhausted);
    }
    Ok(DetectResult::new(vec![DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: [0.25, 0.25, 0.75, 0.75],
    }]))
  }
}

fn write_image(path: &Path, width: u32, height: u32) {
  RgbImage::from_pixel(width, height, Rgb([40, 80, 120]))
    .save(path)
    .unwrap();
}

fn listing(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

#[test]
fn single_image_writes_result_zero() {
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("photo.png");
  write_image(&source, 64, 48);
  let out = dir.path().join("inference_results");

  let config = InferenceConfig::new(&source).with_output_dir(&out);
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();

  assert_eq!(listing(&out), vec!["result_0.jpg"]);
  let saved = image::open(out.join("result_0.jpg")).unwrap();
  assert_eq!(saved.dimensions(), (64, 48));
}

#[test]
fn directory_results_follow_name_order() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  std::fs::create_dir(&images).unwrap();
  write_image(&images.join("c.png"), 30, 10);
  write_image(&images.join("a.png"), 10, 10);
  write_image(&images.join("b.bmp"), 20, 10);
  std::fs::write(images.join("notes.txt"), "skip me").unwrap();
  let out = dir.path().join("out");

  let config = InferenceConfig::new(&images).with_output_dir(&out);
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();

  assert_eq!(
    listing(&out),
    vec!["result_0.jpg", "result_1.jpg", "result_2.jpg"]
  );
  for (i, width) in [10, 20, 30].into_iter().enumerate() {
    let saved = image::open(out.join(format!("result_{}.jpg", i))).unwrap();
    assert_eq!(saved.width(), width);
  }
}

#[test]
fn empty_directory_succeeds_with_output_created() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("empty");
  std::fs::create_dir(&images).unwrap();
  let out = dir.path().join("nested").join("out");

  let config = InferenceConfig::new(&images).with_output_dir(&out);
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();

  assert!(out.is_dir());
  assert!(listing(&out).is_empty());
}

#[test]
fn rerun_overwrites_and_keeps_other_files() {
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("photo.png");
  write_image(&source, 16, 16);
  let out = dir.path().join("out");
  std::fs::create_dir(&out).unwrap();
  std::fs::write(out.join("result_0.png"), "stale").unwrap();
  std::fs::write(out.join("keep.txt"), "mine").unwrap();

  let config = InferenceConfig::new(&source)
    .with_output_dir(&out)
    .with_file_ext(".png");
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();

  assert_eq!(listing(&out), vec!["keep.txt", "result_0.png"]);
  assert_eq!(
    image::open(out.join("result_0.png")).unwrap().dimensions(),
    (16, 16)
  );
}

#[test]
fn inference_failure_keeps_written_prefix() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  std::fs::create_dir(&images).unwrap();
  for name in ["0.png", "1.png", "2.png", "3.png"] {
    write_image(&images.join(name), 8, 8);
  }
  let out = dir.path().join("out");

  let config = InferenceConfig::new(&images).with_output_dir(&out);
  let err = pipeline::run_with_model(StubModel::failing_at(2), &config, None).unwrap_err();

  assert!(matches!(err, PipelineError::Source(_)));
  assert_eq!(err.stage(), "source");
  assert_eq!(listing(&out), vec!["result_0.jpg", "result_1.jpg"]);
}

#[test]
fn undecodable_image_stops_the_run() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  std::fs::create_dir(&images).unwrap();
  write_image(&images.join("a.png"), 8, 8);
  std::fs::write(images.join("b.png"), b"not an image").unwrap();
  write_image(&images.join("c.png"), 8, 8);
  let out = dir.path().join("out");

  let config = InferenceConfig::new(&images).with_output_dir(&out);
  let err = pipeline::run_with_model(StubModel::default(), &config, None).unwrap_err();

  assert!(matches!(err, PipelineError::Source(_)));
  assert_eq!(err.to_string().matches("输入源错误").count(), 1);
  assert!(err.to_string().contains("b.png"));
  assert_eq!(listing(&out), vec!["result_0.jpg"]);
}

#[test]
fn hidden_sidecar_files_do_not_abort_the_run() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  std::fs::create_dir(&images).unwrap();
  write_image(&images.join("photo.jpg"), 12, 8);
  std::fs::write(images.join("._photo.jpg"), b"\x00\x05\x16\x07AppleDouble").unwrap();
  let out = dir.path().join("out");

  let config = InferenceConfig::new(&images).with_output_dir(&out);
  pipeline::run_with_model(StubModel::default(), &config, None).unwrap();

  assert_eq!(listing(&out), vec!["result_0.jpg"]);
}

#[test]
fn missing_source_writes_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let out = dir.path().join("out");

  let config = InferenceConfig::new(dir.path().join("missing.jpg")).with_output_dir(&out);
  let err = pipeline::run_with_model(StubModel::default(), &config, None).unwrap_err();

  assert!(matches!(err, PipelineError::Source(_)));
  assert!(!out.exists());
}

#[test]
fn missing_weights_is_configuration_error() {
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("photo.png");
  write_image(&source, 8, 8);
  let out = dir.path().join("out");

  let config = InferenceConfig::new(&source)
    .with_weights(dir.path().join("missing.rknn").to_string_lossy())
    .with_output_dir(&out);
  let err = pipeline::run(&config, None).unwrap_err();

  assert!(matches!(
    err,
    PipelineError::Configuration(ConfigError::Model(ModelError::WeightsNotFound(_)))
  ));
  assert_eq!(err.stage(), "model-load");
  assert!(!out.exists());
}

#[test]
fn output_directory_blocked_by_file() {
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("photo.png");
  write_image(&source, 8, 8);
  let out = dir.path().join("out");
  std::fs::write(&out, "occupied").unwrap();

  let config = InferenceConfig::new(&source).with_output_dir(&out);
  let err = pipeline::run_with_model(StubModel::default(), &config, None).unwrap_err();

  assert!(matches!(err, PipelineError::Output(_)));
  assert_eq!(err.stage(), "artifact-write");
}
