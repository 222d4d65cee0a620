// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/task.rs - 分类任务驱动
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

use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  coordinator::{ClassificationState, Coordinator, RequestToken},
  input::ImageSource,
  output::Report,
};

pub trait Task<S, O>: Sized {
  type Error;
  fn run_task(self, source: S, coordinator: &Coordinator, output: O) -> Result<(), Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
  pub success: usize,
  pub no_detection: usize,
  pub failed: usize,
}

impl Tally {
  fn record(&mut self, state: &ClassificationState) {
    match state {
      ClassificationState::Success { .. } => self.success += 1,
      ClassificationState::NoDetection => self.no_detection += 1,
      ClassificationState::Failed { .. } => self.failed += 1,
      ClassificationState::Idle | ClassificationState::Loading => {}
    }
  }

  pub fn total(&self) -> usize {
    self.success + self.no_detection + self.failed
  }
}

/// 报告 `Loading`，等待最终结果并报告
fn follow<O>(
  coordinator: &Coordinator,
  token: RequestToken,
  output: &mut O,
) -> anyhow::Result<Option<ClassificationState>>
where
  O: Report,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let loading = coordinator.state();
  if loading.token == token && loading.state == ClassificationState::Loading {
    output.report(&loading)?;
  }

  let Some(published) = coordinator.wait_for(token, None) else {
    warn!("请求 {} 已被新的请求取代", token);
    return Ok(None);
  };
  output.report(&published)?;
  Ok(Some(published.state))
}

pub struct OneShotTask;

impl<S, O> Task<S, O> for OneShotTask
where
  S: ImageSource,
  O: Report,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut source: S,
    coordinator: &Coordinator,
    mut output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let Some(token) = coordinator.acquire_and_submit(&mut source) else {
      info!("未选择图像, 任务结束");
      return Ok(());
    };

    let now = std::time::Instant::now();
    follow(coordinator, token, &mut output)?;
    info!("分类完成，耗时: {:.2?}", now.elapsed());
    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  image_limit: Option<usize>,
}

impl ContinuousTask {
  pub fn with_image_limit(mut self, image_limit: Option<usize>) -> Self {
    self.image_limit = image_limit;
    self
  }

  /// 逐张获取、提交、等待并报告，直到图像源结束、达到数量上限或 `stop` 返回 true
  pub fn drive<S, O>(
    &self,
    source: &mut S,
    coordinator: &Coordinator,
    output: &mut O,
    mut stop: impl FnMut() -> bool,
  ) -> anyhow::Result<Tally>
  where
    S: ImageSource,
    O: Report,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut tally = Tally::default();
    let mut image_index = 0;
    while let Some(token) = coordinator.acquire_and_submit(source) {
      image_index += 1;
      info!("处理第 {} 张图像", image_index);
      let now = std::time::Instant::now();
      if let Some(state) = follow(coordinator, token, output)? {
        tally.record(&state);
      }
      info!("分类完成，耗时: {:.2?}", now.elapsed());

      if self.image_limit.is_some_and(|n| image_index >= n) {
        info!("达到指定图像数 {}, 退出任务循环", image_index);
        break;
      }
      if stop() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }
    Ok(tally)
  }
}

impl<S, O> Task<S, O> for ContinuousTask
where
  S: ImageSource,
  O: Report,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut source: S,
    coordinator: &Coordinator,
    mut output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理器")?;

    let tally = self.drive(&mut source, coordinator, &mut output, || rx.try_recv().is_ok())?;
    info!(
      "任务完成，共 {} 张: 检出 {}, 未检出 {}, 失败 {}",
      tally.total(),
      tally.success,
      tally.no_detection,
      tally.failed
    );
    Ok(())
  }
}
