// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pijian::{
  FromUrl,
  coordinator::Coordinator,
  input::InputWrapper,
  model::{ClassifierEngine, EngineConfig, LinearModelBuilder},
  normalize::{NormalizeConfig, Normalizer},
  output::{JsonReport, OutputWrapper, TextReport},
  task::{ContinuousTask, OneShotTask, Task},
};

use args::{Args, Format};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("检出阈值: {}", args.threshold);

  let loader = LinearModelBuilder::from_url(&args.model).context("无法解析模型地址")?;
  let engine = ClassifierEngine::new(
    loader,
    EngineConfig {
      threshold: args.threshold,
    },
  )?;
  let normalizer = Normalizer::new(NormalizeConfig::default())?;
  let coordinator = Coordinator::new(normalizer, engine)?;

  let input = InputWrapper::from_url(&args.input).context("无法打开输入来源")?;
  let output = match args.format {
    Format::Text => OutputWrapper::Text(TextReport::stdout()),
    Format::Json => OutputWrapper::Json(JsonReport::stdout()),
  };

  if input.is_single_shot() {
    OneShotTask.run_task(input, &coordinator, output)?;
  } else {
    let image_limit = (args.max_images > 0).then_some(args.max_images);
    ContinuousTask::default()
      .with_image_limit(image_limit)
      .run_task(input, &coordinator, output)?;
  }

  Ok(())
}
