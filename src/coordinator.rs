// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/coordinator.rs - 分类协调器
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
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc,
    mpsc::{Receiver, Sender, channel},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::RawImage,
  input::ImageSource,
  model::{ClassifierEngine, Inference, InferenceError, ModelLoadError},
  normalize::{DecodeError, Normalizer},
};

mod slot;
use self::slot::ResultSlot;
pub use self::slot::{ClassificationState, FailureReason, Published, RequestToken};

const WORKER_NAME: &str = "pijian-classifier";

#[derive(Error, Debug)]
pub enum CoordinatorError {
  #[error("无法启动分类线程: {0}")]
  Spawn(#[from] std::io::Error),
}

/// 单次分类中任一阶段的失败
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("模型不可用: {0}")]
  ModelLoad(#[from] ModelLoadError),
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
}

impl PipelineError {
  pub fn reason(&self) -> FailureReason {
    match self {
      PipelineError::Decode(_) => FailureReason::ImageUnreadable,
      PipelineError::ModelLoad(_) => FailureReason::ClassifierUnavailable,
      PipelineError::Inference(_) => FailureReason::ClassificationFailed,
    }
  }
}

struct Job {
  token: RequestToken,
  image: RawImage,
}

struct Shared {
  slot: ResultSlot,
  normalizer: Normalizer,
  engine: ClassifierEngine,
}

impl Shared {
  /// 解码、取模型、按模型输入尺寸缩放、推理，作为一个整体执行
  fn classify(&self, image: RawImage) -> Result<Inference, PipelineError> {
    let image = self.normalizer.decode(image)?;
    let handle = self.engine.load_model()?;
    let size = handle.input_size();
    if size == 0 {
      return Err(InferenceError::Backend(String::from("模型输入尺寸为 0")).into());
    }
    let input = self.normalizer.scale(&image, size);
    Ok(self.engine.infer(&handle, &input)?)
  }

  fn run(&self, job: Job) {
    let Job { token, image } = job;
    if !self.slot.is_current(token) {
      debug!("请求 {} 在开始前已被取代, 跳过", token);
      return;
    }

    let start = Instant::now();
    let state = match catch_unwind(AssertUnwindSafe(|| self.classify(image))) {
      Ok(Ok(inference)) => ClassificationState::from(inference),
      Ok(Err(e)) => {
        warn!("请求 {} 分类失败: {}", token, e);
        ClassificationState::failed(e.reason())
      }
      Err(_) => {
        error!("请求 {} 分类过程中发生 panic", token);
        ClassificationState::failed(FailureReason::ClassificationFailed)
      }
    };
    debug!("请求 {} 处理耗时: {:?}", token, start.elapsed());

    let summary = state.to_string();
    if self.slot.complete(token, state) {
      info!("请求 {} 已发布: {}", token, summary);
    } else {
      debug!("请求 {} 已过期, 丢弃结果", token);
    }
  }
}

/// 分类协调器
///
/// 每次 `submit` 都签发新的令牌并立即发布 `Loading`，实际工作交给后台线程。
/// 只有令牌仍为最新的结果才会被发布，旧请求的结果一律丢弃。
pub struct Coordinator {
  shared: Arc<Shared>,
  jobs: Option<Sender<Job>>,
  worker: Option<JoinHandle<()>>,
}

impl Coordinator {
  pub fn new(normalizer: Normalizer, engine: ClassifierEngine) -> Result<Self, CoordinatorError> {
    let shared = Arc::new(Shared {
      slot: ResultSlot::new(),
      normalizer,
      engine,
    });
    let (tx, rx) = channel();
    let worker = {
      let shared = shared.clone();
      thread::Builder::new()
        .name(WORKER_NAME.to_string())
        .spawn(move || worker_loop(shared, rx))?
    };

    Ok(Self {
      shared,
      jobs: Some(tx),
      worker: Some(worker),
    })
  }

  /// 接受一张新图像，返回其令牌；不等待分类完成
  pub fn submit(&self, image: RawImage) -> RequestToken {
    let token = self.shared.slot.begin(ClassificationState::Loading);
    info!("接受新图像 {} ({} 字节)", token, image.byte_len());

    let sent = match self.jobs.as_ref() {
      Some(jobs) => jobs.send(Job { token, image }).is_ok(),
      None => false,
    };
    if !sent {
      error!("分类线程已退出, 请求 {} 无法处理", token);
      self.shared.slot.complete(
        token,
        ClassificationState::failed(FailureReason::ClassificationFailed),
      );
    }
    token
  }

  /// 从图像源取一张图像并提交；用户取消时什么也不做
  pub fn acquire_and_submit(&self, source: &mut dyn ImageSource) -> Option<RequestToken> {
    match source.acquire() {
      Ok(image) => Some(self.submit(image)),
      Err(cancelled) => {
        debug!("{}", cancelled);
        None
      }
    }
  }

  pub fn state(&self) -> Published {
    self.shared.slot.snapshot()
  }

  pub fn subscribe(&self) -> Receiver<Published> {
    self.shared.slot.subscribe()
  }

  pub fn wait_for(&self, token: RequestToken, timeout: Option<Duration>) -> Option<Published> {
    self.shared.slot.wait_for(token, timeout)
  }

  /// 使进行中的请求过期并回到 `Idle`
  pub fn reset(&self) {
    let token = self.shared.slot.begin(ClassificationState::Idle);
    debug!("协调器已重置 ({})", token);
  }

  pub fn engine(&self) -> &ClassifierEngine {
    &self.shared.engine
  }
}

impl Drop for Coordinator {
  fn drop(&mut self) {
    // 先关闭队列，线程处理完剩余任务后退出
    self.jobs.take();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      error!("分类线程异常退出");
    }
  }
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<Job>) {
  debug!("分类线程启动");
  for job in jobs {
    shared.run(job);
  }
  debug!("分类线程退出");
}
