// 该文件是 Tance （探测） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 模型
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

use std::path::{Path, PathBuf};

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, Frame, RgbNhwcFrame},
  model::{DetectItem, DetectResult, Model},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_W: u32 = 640;
const YOLO26_INPUT_H: u32 = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_OBJECT_THRESH: f32 = 0.5;

type Yolo26Input = RgbNhwcFrame<YOLO26_INPUT_W, YOLO26_INPUT_H>;

pub struct Yolo26 {
  context: Context,
  class_num: Option<usize>,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出形状错误: {0}")]
  OutputShape(String),
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: PathBuf,
  class_num: Option<usize>,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = Yolo26Builder::new(url.path());
    for (k, v) in url.query_pairs() {
      if k == "classes" {
        let class_num = v
          .parse::<usize>()
          .ok()
          .filter(|&n| n > 0)
          .ok_or_else(|| Yolo26Error::ModelPathError(format!("类别数无效: {}", v)))?;
        builder = builder.class_num(class_num);
      }
    }
    Ok(builder)
  }
}

impl Yolo26Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Yolo26Builder {
      model_path: model_path.as_ref().to_path_buf(),
      class_num: None,
    }
  }

  /// 指定类别数；不指定时按分类张量大小推断
  pub fn class_num(mut self, class_num: usize) -> Self {
    self.class_num = Some(class_num);
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path.display());
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(Yolo26Error::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    for (what, expected, actual) in [
      ("输入", YOLO26_NUM_INPUTS, num_inputs),
      ("输出", YOLO26_NUM_OUTPUTS, num_outputs),
    ] {
      if expected != actual {
        let msg = format!("预期模型{}数量为 {}, 实际为 {}", what, expected, actual);
        error!("{}", msg);
        return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
      }
    }

    info!("模型加载完成");
    Ok(Yolo26 {
      context,
      class_num: self.class_num,
    })
  }
}

/// 根据张量大小区分回归和分类输出，返回 (reg, cls, 类别数)。
/// 回归张量固定为 4 个通道；分类张量的通道数即类别数。
fn split_reg_cls<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  spatial: usize,
  class_num: Option<usize>,
  head_idx: usize,
) -> Result<(&'a [f32], &'a [f32], usize), Yolo26Error> {
  let reg_len = 4 * spatial;
  let (reg, cls) = if tensor1.len() == reg_len {
    (tensor1, tensor2)
  } else if tensor2.len() == reg_len {
    debug!("检测头 {}: 输出顺序交换", head_idx);
    (tensor2, tensor1)
  } else {
    return Err(Yolo26Error::OutputShape(format!(
      "检测头 {}: 找不到回归输出 (张量1: {}, 张量2: {}, 期望: {})",
      head_idx,
      tensor1.len(),
      tensor2.len(),
      reg_len
    )));
  };

  if spatial == 0 || cls.is_empty() || cls.len() % spatial != 0 {
    return Err(Yolo26Error::OutputShape(format!(
      "检测头 {}: 分类输出大小 {} 不是特征图大小 {} 的整数倍",
      head_idx,
      cls.len(),
      spatial
    )));
  }

  let inferred = cls.len() / spatial;
  match class_num {
    Some(expected) if expected != inferred => Err(Yolo26Error::OutputShape(format!(
      "检测头 {}: 期望 {} 个类别，模型输出 {} 个",
      head_idx, expected, inferred
    ))),
    _ => Ok((reg, cls, inferred)),
  }
}

/// 解码一个检测头，bbox 归一化到 [0, 1]
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (map_h, map_w): (usize, usize),
  stride: f32,
  class_num: usize,
  items: &mut Vec<DetectItem>,
) {
  let spatial = map_h * map_w;
  let (input_w, input_h) = (YOLO26_INPUT_W as f32, YOLO26_INPUT_H as f32);

  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (max_logit, class_id) = (0..class_num)
        .map(|c| (cls[c * spatial + idx], c as u32))
        .fold((f32::MIN, 0), |best, cur| if cur.0 > best.0 { cur } else { best });
      let score = sigmoid(max_logit);
      if score <= YOLO26_OBJECT_THRESH {
        continue;
      }

      let grid_x = (w as f32) + 0.5;
      let grid_y = (h as f32) + 0.5;

      let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
      let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
      let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
      let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

      items.push(DetectItem {
        class_id,
        score,
        bbox: [
          xmin / input_w,
          ymin / input_h,
          xmax / input_w,
          ymax / input_h,
        ],
      });
    }
  }
}

fn head_output(
  output: &rknpu::Output,
  head_idx: usize,
  idx: usize,
) -> Result<&[f32], Yolo26Error> {
  output.get_f32(idx).map_err(|e| {
    Yolo26Error::OutputShape(format!(
      "获取检测头 {} 的第 {} 个输出失败: {}",
      head_idx, idx, e
    ))
  })
}

impl Yolo26 {
  fn postprocess(&self, output: rknpu::Output) -> Result<DetectResult, Yolo26Error> {
    let mut items = Vec::new();

    for (head_idx, (&map_size, stride)) in YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      // RKNN 输出顺序不固定，按张量大小区分回归和分类
      let tensor1 = head_output(&output, head_idx, head_idx * 2)?;
      let tensor2 = head_output(&output, head_idx, head_idx * 2 + 1)?;

      let (reg, cls, class_num) = split_reg_cls(
        tensor1,
        tensor2,
        map_size.0 * map_size.1,
        self.class_num,
        head_idx,
      )?;

      decode_head(reg, cls, map_size, stride, class_num, &mut items);
    }

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::new(items))
  }
}

impl Model for Yolo26 {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Yolo26Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let frame = Yolo26Input::from(input);

    debug!("设置模型输入");
    self.context.set_input(
      0,
      frame.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    self.postprocess(output)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn swapped_outputs_are_matched_by_size() {
    let reg = vec![0.0; 4 * 6];
    let cls = vec![0.0; 2 * 6];
    let (r, c, n) = split_reg_cls(&cls, &reg, 6, None, 0).unwrap();
    assert_eq!((r.len(), c.len(), n), (24, 12, 2));
  }

  #[test]
  fn class_count_is_inferred_from_single_class_head() {
    let reg = vec![0.0; 4 * 6];
    let cls = vec![0.0; 6];
    let (_, _, n) = split_reg_cls(&reg, &cls, 6, None, 0).unwrap();
    assert_eq!(n, 1);
  }

  #[test]
  fn mismatched_outputs_are_errors() {
    let reg = vec![0.0; 4 * 6];
    let cls = vec![0.0; 6];
    assert!(matches!(
      split_reg_cls(&reg, &cls, 6, Some(80), 0),
      Err(Yolo26Error::OutputShape(_))
    ));
    assert!(matches!(
      split_reg_cls(&cls, &cls, 6, None, 0),
      Err(Yolo26Error::OutputShape(_))
    ));
    assert!(matches!(
      split_reg_cls(&reg, &vec![0.0; 7], 6, None, 0),
      Err(Yolo26Error::OutputShape(_))
    ));
  }

  #[test]
  fn url_query_sets_class_count() {
    let url = Url::parse("yolo26:///opt/models/best.rknn?classes=1").unwrap();
    let builder = Yolo26Builder::from_url(&url).unwrap();
    assert_eq!(builder.class_num, Some(1));
    assert_eq!(builder.model_path, PathBuf::from("/opt/models/best.rknn"));

    let bad = Url::parse("yolo26:///opt/models/best.rknn?classes=0").unwrap();
    assert!(Yolo26Builder::from_url(&bad).is_err());
  }

  #[test]
  fn decode_keeps_confident_cells_only() {
    // 1x1 特征图，两类
    let reg = [0.5, 0.5, 0.5, 0.5];
    let cls = [-4.0, 3.0];
    let mut items = Vec::new();
    decode_head(&reg, &cls, (1, 1), 32.0, 2, &mut items);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
    assert_eq!(items[0].bbox, [0.0, 0.0, 32.0 / 640.0, 32.0 / 640.0]);

    let mut none = Vec::new();
    decode_head(&reg, &[-4.0, -3.0], (1, 1), 32.0, 2, &mut none);
    assert!(none.is_empty());
  }

  #[test]
  fn sigmoid_is_centered() {
    assert!((sigmoid(0.0) - 0.5).abs() < f32::EPSILON);
  }
}
