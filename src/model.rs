// 该文件是 Tance （探测） 项目的一部分。
// src/model.rs - 模型
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

use std::{
  borrow::Cow,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, frame::Frame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 类别名称表，每行一个名称，行号即类别编号
#[derive(Debug, Clone, Default)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(Self::parse(&content))
  }

  pub fn parse(content: &str) -> Self {
    Self {
      names: content.lines().map(|l| l.trim().to_string()).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 没有名称（或名称为空行）时回退为类别编号
  pub fn name(&self, class_id: u32) -> Cow<'_, str> {
    match self.names.get(class_id as usize) {
      Some(name) if !name.is_empty() => Cow::Borrowed(name),
      _ => Cow::Owned(class_id.to_string()),
    }
  }
}

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("权重文件不存在: {}", .0.display())]
  WeightsNotFound(PathBuf),
  #[error("无法识别的模型类型: {0}")]
  UnknownBackend(String),
  #[error("模型后端 {0} 未编译进当前程序")]
  BackendUnavailable(String),
  #[error("权重描述无效: {0}")]
  InvalidWeights(String),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
}

/// 权重描述：`scheme:///path[?classes=N]` 形式的 URL，或者按扩展名推断后端的普通路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightsLocation {
  pub scheme: String,
  pub path: PathBuf,
  /// 类别数，未指定时由后端从输出推断
  pub classes: Option<usize>,
}

const RKNN_EXTENSION: &str = "rknn";
const YOLO26_SCHEME: &str = "yolo26";

impl WeightsLocation {
  pub fn parse(weights: &str) -> Result<Self, ModelError> {
    if let Ok(url) = Url::parse(weights)
      && url.scheme().len() > 1
      && url.scheme() != "file"
    {
      return Self::from_url(&url);
    }

    let path = match Url::parse(weights) {
      Ok(url) if url.scheme() == "file" => PathBuf::from(url.path()),
      _ => PathBuf::from(weights),
    };
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();
    let scheme = match ext.as_str() {
      RKNN_EXTENSION => YOLO26_SCHEME,
      _ => return Err(ModelError::UnknownBackend(weights.to_string())),
    };

    Ok(WeightsLocation {
      scheme: scheme.to_string(),
      path,
      classes: None,
    })
  }

  pub fn from_url(url: &Url) -> Result<Self, ModelError> {
    let mut classes = None;
    for (k, v) in url.query_pairs() {
      if k == "classes" {
        let n = v
          .parse::<usize>()
          .ok()
          .filter(|&n| n > 0)
          .ok_or_else(|| ModelError::InvalidWeights(format!("类别数无效: {}", v)))?;
        classes = Some(n);
      }
    }

    Ok(WeightsLocation {
      scheme: url.scheme().to_string(),
      path: PathBuf::from(url.path()),
      classes,
    })
  }
}

/// 按权重描述选择的模型后端
pub enum ModelWrapper {
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl ModelWrapper {
  /// 加载模型。权重文件必须存在，之后才会按类型交给具体后端。
  pub fn load(weights: &str) -> Result<Self, ModelError> {
    let location = WeightsLocation::parse(weights)?;
    if !location.path.is_file() {
      error!("权重文件不存在: {}", location.path.display());
      return Err(ModelError::WeightsNotFound(location.path));
    }

    info!(
      "加载 {} 模型: {}",
      location.scheme,
      location.path.display()
    );
    Self::from_location(&location)
  }

  pub fn from_location(location: &WeightsLocation) -> Result<Self, ModelError> {
    #[cfg(feature = "model_yolo26")]
    {
      use crate::FromUrlWithScheme;

      if location.scheme == Yolo26Builder::SCHEME {
        let mut builder = Yolo26Builder::new(&location.path);
        if let Some(classes) = location.classes {
          builder = builder.class_num(classes);
        }
        let model = builder.build()?;
        return Ok(ModelWrapper::Yolo26(model));
      }
    }

    match location.scheme.as_str() {
      YOLO26_SCHEME => Err(ModelError::BackendUnavailable(YOLO26_SCHEME.to_string())),
      other => Err(ModelError::UnknownBackend(other.to_string())),
    }
  }
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_location(&WeightsLocation::from_url(url)?)
  }
}

impl Model for ModelWrapper {
  type Input = Frame;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match *self {
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_fall_back_to_class_id() {
    let labels = Labels::parse("probe\n\n tip \n");
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.name(0), "probe");
    assert_eq!(labels.name(1), "1");
    assert_eq!(labels.name(2), "tip");
    assert_eq!(labels.name(42), "42");
  }

  #[test]
  fn plain_rknn_path_selects_yolo26() {
    let location = WeightsLocation::parse("runs/detect/probe_train/weights/best.rknn").unwrap();
    assert_eq!(location.scheme, "yolo26");
    assert_eq!(
      location.path,
      PathBuf::from("runs/detect/probe_train/weights/best.rknn")
    );
  }

  #[test]
  fn url_scheme_is_kept() {
    let location = WeightsLocation::parse("yolo26:///opt/models/best.bin").unwrap();
    assert_eq!(location.scheme, "yolo26");
    assert_eq!(location.path, PathBuf::from("/opt/models/best.bin"));
  }

  #[test]
  fn class_count_query_is_kept() {
    let location = WeightsLocation::parse("yolo26:///opt/models/best.rknn?classes=1").unwrap();
    assert_eq!(location.path, PathBuf::from("/opt/models/best.rknn"));
    assert_eq!(location.classes, Some(1));

    let plain = WeightsLocation::parse("runs/detect/probe_train/weights/best.rknn").unwrap();
    assert_eq!(plain.classes, None);

    assert!(matches!(
      WeightsLocation::parse("yolo26:///opt/models/best.rknn?classes=zero"),
      Err(ModelError::InvalidWeights(_))
    ));
  }

  #[test]
  fn unknown_weight_format_is_rejected() {
    assert!(matches!(
      WeightsLocation::parse("best.pt"),
      Err(ModelError::UnknownBackend(_))
    ));
  }

  #[test]
  fn missing_weights_fail_before_backend_selection() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("best.rknn");
    let err = ModelWrapper::load(weights.to_str().unwrap()).err().unwrap();
    assert!(matches!(err, ModelError::WeightsNotFound(_)));
  }

  #[test]
  fn unknown_url_scheme_is_rejected() {
    let url = Url::parse("onnx:///opt/models/best.onnx").unwrap();
    assert!(matches!(
      ModelWrapper::from_url(&url),
      Err(ModelError::UnknownBackend(scheme)) if scheme == "onnx"
    ));
  }

  #[cfg(not(feature = "model_yolo26"))]
  #[test]
  fn yolo26_without_backend_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("best.rknn");
    std::fs::write(&weights, b"rknn").unwrap();

    let err = ModelWrapper::load(weights.to_str().unwrap()).err().unwrap();
    assert!(matches!(err, ModelError::BackendUnavailable(_)));
  }
}
