// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/model/engine.rs - 分类引擎（模型缓存与推理）
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

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  frame::NormalizedInput,
  model::{Inference, InferenceError, ModelHandle, ModelLoadError, ModelLoader, rank},
};

const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, PartialEq)]
pub enum EngineConfigError {
  #[error("检出阈值必须位于 [0, 1) 区间, 实际为 {0}")]
  Threshold(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// 检出阈值，最高置信度必须严格大于该值
  pub threshold: f32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_DETECTION_THRESHOLD,
    }
  }
}

/// 分类引擎
///
/// 持有模型加载器与懒加载的模型句柄。首次需要时加载，之后复用；
/// 加载失败时不缓存任何东西，下一次调用会重新尝试加载。
pub struct ClassifierEngine {
  loader: Box<dyn ModelLoader>,
  threshold: f32,
  handle: Mutex<Option<ModelHandle>>,
}

impl ClassifierEngine {
  pub fn new<L: ModelLoader + 'static>(
    loader: L,
    config: EngineConfig,
  ) -> Result<Self, EngineConfigError> {
    let threshold = config.threshold;
    if !(0.0..1.0).contains(&threshold) {
      return Err(EngineConfigError::Threshold(threshold));
    }

    Ok(Self {
      loader: Box::new(loader),
      threshold,
      handle: Mutex::new(None),
    })
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 获取模型句柄，必要时加载
  pub fn load_model(&self) -> Result<ModelHandle, ModelLoadError> {
    // 加载期间持锁，保证同一时刻最多只有一次加载
    let mut cached = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = cached.as_ref() {
      debug!("复用已加载的模型");
      return Ok(handle.clone());
    }

    info!("加载模型: {}", self.loader.describe());
    match self.loader.load() {
      Ok(handle) => {
        info!(
          "模型加载完成, 输入尺寸 {}, 标签数量 {}",
          handle.input_size(),
          handle.labels().len()
        );
        *cached = Some(handle.clone());
        Ok(handle)
      }
      Err(e) => {
        error!("模型加载失败: {}", e);
        Err(e)
      }
    }
  }

  pub fn is_loaded(&self) -> bool {
    self
      .handle
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  /// 丢弃缓存的模型，下一次 `load_model` 会重新加载
  pub fn invalidate(&self) {
    let mut cached = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
    if cached.take().is_some() {
      info!("已丢弃缓存的模型");
    }
  }

  pub fn infer(
    &self,
    handle: &ModelHandle,
    input: &NormalizedInput,
  ) -> Result<Inference, InferenceError> {
    debug!("执行模型推理");
    let probabilities = handle.infer(input)?;
    debug!("模型推理结果：{:?}", probabilities);
    rank(handle.labels(), &probabilities, self.threshold)
  }
}
