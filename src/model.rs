// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/model.rs - 分类模型
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

use std::{fmt, ops::Deref, sync::Arc};

use serde::Serialize;
use thiserror::Error;

use crate::frame::NormalizedInput;

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型格式错误: {0}")]
  Format(#[from] serde_json::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl ModelLoadError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ModelLoadError::Invalid(msg.into())
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum InferenceError {
  #[error("输入尺寸不匹配: 期望 {expected}x{expected}, 实际 {actual}x{actual}")]
  InputShape { expected: u32, actual: u32 },
  #[error("模型输出数量 {outputs} 与标签数量 {labels} 不一致")]
  OutputMismatch { outputs: usize, labels: usize },
  #[error("模型输出包含非有限值")]
  NonFinite,
  #[error("推理失败: {0}")]
  Backend(String),
}

/// 分类模型
///
/// `infer` 返回与 `labels` 一一对应的概率。实现必须可跨线程共享，
/// 加载完成后只读。
pub trait Model: Send + Sync {
  fn labels(&self) -> &[String];
  fn input_size(&self) -> u32;
  fn infer(&self, input: &NormalizedInput) -> Result<Vec<f32>, InferenceError>;
}

/// 已加载模型的共享句柄
#[derive(Clone)]
pub struct ModelHandle(Arc<dyn Model>);

impl ModelHandle {
  pub fn new<M: Model + 'static>(model: M) -> Self {
    Self(Arc::new(model))
  }

  /// 两个句柄是否指向同一个模型实例
  pub fn same_instance(&self, other: &ModelHandle) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl Deref for ModelHandle {
  type Target = dyn Model;

  fn deref(&self) -> &Self::Target {
    self.0.as_ref()
  }
}

impl fmt::Debug for ModelHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModelHandle")
      .field("labels", &self.0.labels())
      .field("input_size", &self.0.input_size())
      .finish()
  }
}

/// 模型加载器，每次调用都重新加载
pub trait ModelLoader: Send + Sync {
  fn load(&self) -> Result<ModelHandle, ModelLoadError>;

  fn describe(&self) -> String {
    String::from("<model>")
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLabel {
  pub label: String,
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
  Ranked(RankedLabel),
  NoDetection,
}

/// 取最高概率的标签（并列时取靠前者），置信度严格大于阈值才算检出
pub fn rank(
  labels: &[String],
  probabilities: &[f32],
  threshold: f32,
) -> Result<Inference, InferenceError> {
  if probabilities.len() != labels.len() {
    return Err(InferenceError::OutputMismatch {
      outputs: probabilities.len(),
      labels: labels.len(),
    });
  }
  if probabilities.iter().any(|p| !p.is_finite()) {
    return Err(InferenceError::NonFinite);
  }

  let best = probabilities
    .iter()
    .enumerate()
    .fold(None, |best: Option<(usize, f32)>, (idx, &p)| match best {
      Some((_, best_p)) if best_p >= p => best,
      _ => Some((idx, p)),
    });

  Ok(match best {
    Some((idx, p)) if p > threshold => Inference::Ranked(RankedLabel {
      label: labels[idx].clone(),
      confidence: p.clamp(0.0, 1.0),
    }),
    _ => Inference::NoDetection,
  })
}

mod engine;
mod linear;
pub use self::engine::{ClassifierEngine, EngineConfig, EngineConfigError};
pub use self::linear::{LinearModel, LinearModelBuilder, LinearModelSpec};

#[cfg(test)]
mod tests {
  use super::*;

  fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn rank_picks_highest_above_threshold() {
    let result = rank(&labels(&["benign", "malignant"]), &[0.8, 0.2], 0.5).unwrap();
    assert_eq!(
      result,
      Inference::Ranked(RankedLabel {
        label: "benign".into(),
        confidence: 0.8
      })
    );
  }

  #[test]
  fn rank_threshold_is_strict() {
    let result = rank(&labels(&["a", "b"]), &[0.5, 0.5], 0.5).unwrap();
    assert_eq!(result, Inference::NoDetection);
  }

  #[test]
  fn rank_ties_keep_first_label() {
    let result = rank(&labels(&["a", "b", "c"]), &[0.1, 0.45, 0.45], 0.0).unwrap();
    assert!(matches!(result, Inference::Ranked(RankedLabel { ref label, .. }) if label == "b"));
  }

  #[test]
  fn rank_empty_output_is_no_detection() {
    assert_eq!(rank(&[], &[], 0.0).unwrap(), Inference::NoDetection);
  }

  #[test]
  fn rank_rejects_malformed_output() {
    assert_eq!(
      rank(&labels(&["a"]), &[0.5, 0.5], 0.0).unwrap_err(),
      InferenceError::OutputMismatch {
        outputs: 2,
        labels: 1
      }
    );
    assert_eq!(
      rank(&labels(&["a", "b"]), &[f32::NAN, 0.5], 0.0).unwrap_err(),
      InferenceError::NonFinite
    );
  }
}
