// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/model/linear.rs - 线性 softmax 分类头
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

//! 随应用打包的轻量分类模型。
//!
//! 模型文件为 JSON：
//!
//! ```json
//! {
//!   "labels": ["benign", "malignant"],
//!   "input_size": 224,
//!   "grid": 2,
//!   "weights": [[...12 个值...], [...12 个值...]],
//!   "bias": [0.0, 0.0]
//! }
//! ```
//!
//! 特征为归一化输入按 `grid x grid` 网格做平均池化后的结果（通道优先，
//! 共 `3 * grid * grid` 个），logits 为 `W·f + b`，再经 softmax 得到概率。

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNchwFrame, NormalizedInput, RGB_CHANNELS},
  model::{InferenceError, Model, ModelHandle, ModelLoadError, ModelLoader},
  url_path,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelSpec {
  pub labels: Vec<String>,
  pub input_size: u32,
  pub grid: u32,
  pub weights: Vec<Vec<f32>>,
  pub bias: Vec<f32>,
}

#[derive(Debug)]
pub struct LinearModel {
  labels: Vec<String>,
  input_size: u32,
  grid: u32,
  weights: Vec<Vec<f32>>,
  bias: Vec<f32>,
}

impl LinearModel {
  pub fn from_spec(spec: LinearModelSpec) -> Result<Self, ModelLoadError> {
    let LinearModelSpec {
      labels,
      input_size,
      grid,
      weights,
      bias,
    } = spec;

    if labels.is_empty() {
      return Err(ModelLoadError::invalid("模型没有任何标签"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
      return Err(ModelLoadError::invalid(format!("标签重复: {}", dup)));
    }
    if input_size == 0 {
      return Err(ModelLoadError::invalid("输入尺寸必须大于 0"));
    }
    if grid == 0 || grid > input_size {
      return Err(ModelLoadError::invalid(format!(
        "池化网格 {} 无效, 输入尺寸为 {}",
        grid, input_size
      )));
    }
    if weights.len() != labels.len() {
      return Err(ModelLoadError::invalid(format!(
        "预期权重行数为 {}, 实际为 {}",
        labels.len(),
        weights.len()
      )));
    }
    if bias.len() != labels.len() {
      return Err(ModelLoadError::invalid(format!(
        "预期偏置数量为 {}, 实际为 {}",
        labels.len(),
        bias.len()
      )));
    }

    let features = RGB_CHANNELS * (grid as usize) * (grid as usize);
    if let Some((row, w)) = weights.iter().enumerate().find(|(_, w)| w.len() != features) {
      return Err(ModelLoadError::invalid(format!(
        "第 {} 行权重长度为 {}, 预期为 {}",
        row,
        w.len(),
        features
      )));
    }
    if weights.iter().flatten().chain(bias.iter()).any(|v| !v.is_finite()) {
      return Err(ModelLoadError::invalid("模型参数包含非有限值"));
    }

    Ok(Self {
      labels,
      input_size,
      grid,
      weights,
      bias,
    })
  }

  pub fn grid(&self) -> u32 {
    self.grid
  }

  /// 按网格对每个通道做平均池化
  fn features(&self, input: &NormalizedInput) -> Vec<f32> {
    let size = input.width();
    let grid = self.grid as usize;
    let mut features = Vec::with_capacity(RGB_CHANNELS * grid * grid);

    for c in 0..input.channels() {
      let plane = input.plane(c);
      for gy in 0..grid {
        let (y0, y1) = (gy * size / grid, (gy + 1) * size / grid);
        for gx in 0..grid {
          let (x0, x1) = (gx * size / grid, (gx + 1) * size / grid);
          let mut sum = 0.0f32;
          for y in y0..y1 {
            sum += plane[y * size + x0..y * size + x1].iter().sum::<f32>();
          }
          features.push(sum / ((y1 - y0) * (x1 - x0)) as f32);
        }
      }
    }

    features
  }
}

impl Model for LinearModel {
  fn labels(&self) -> &[String] {
    &self.labels
  }

  fn input_size(&self) -> u32 {
    self.input_size
  }

  fn infer(&self, input: &NormalizedInput) -> Result<Vec<f32>, InferenceError> {
    if input.size() != self.input_size {
      return Err(InferenceError::InputShape {
        expected: self.input_size,
        actual: input.size(),
      });
    }
    if input.as_nchw().iter().any(|v| !v.is_finite()) {
      return Err(InferenceError::Backend(String::from("输入包含非有限值")));
    }

    let features = self.features(input);
    let logits: Vec<f32> = self
      .weights
      .iter()
      .zip(self.bias.iter())
      .map(|(row, b)| row.iter().zip(features.iter()).map(|(w, f)| w * f).sum::<f32>() + b)
      .collect();
    debug!("logits: {:?}", logits);

    Ok(softmax(&logits))
  }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.iter().map(|e| e / sum).collect()
}

/// 从文件加载 [`LinearModel`]，每次 `load` 都重新读取文件
#[derive(Debug, Clone)]
pub struct LinearModelBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for LinearModelBuilder {
  const SCHEME: &'static str = "linear";
}

impl FromUrl for LinearModelBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(LinearModelBuilder {
      model_path: url_path(url),
    })
  }
}

impl LinearModelBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
    }
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn build(&self) -> Result<LinearModel, ModelLoadError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!("模型文件大小: {:.2} KB", model_data.len() as f64 / 1024.0);

    let spec: LinearModelSpec = serde_json::from_slice(&model_data)?;
    LinearModel::from_spec(spec)
  }
}

impl ModelLoader for LinearModelBuilder {
  fn load(&self) -> Result<ModelHandle, ModelLoadError> {
    Ok(ModelHandle::new(self.build()?))
  }

  fn describe(&self) -> String {
    self.model_path.display().to_string()
  }
}
