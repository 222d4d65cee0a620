// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/bin/picker_demo.rs - 交互式选择器演示
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
  io::{self, BufRead, Write},
  thread,
  time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use pijian::{
  FromUrl,
  coordinator::Coordinator,
  frame::RawImage,
  input::picker,
  model::{ClassifierEngine, EngineConfig, LinearModelBuilder},
  normalize::{NormalizeConfig, Normalizer},
  output::{Report, TextReport},
};

/// 从标准输入逐行选择图像：输入路径即选中，空行即取消。
/// 提交后不等待结果，连续选择时旧请求的结果会被丢弃。
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件，例如 linear:///opt/pijian/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 检出阈值
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("模型文件路径: {}", args.model);

  let loader = LinearModelBuilder::from_url(&args.model).context("无法解析模型地址")?;
  let engine = ClassifierEngine::new(
    loader,
    EngineConfig {
      threshold: args.threshold,
    },
  )?;
  let normalizer = Normalizer::new(NormalizeConfig::default())?;
  let coordinator = Coordinator::new(normalizer, engine)?;

  // 界面一侧：把每次发布打印出来
  let updates = coordinator.subscribe();
  let printer = thread::spawn(move || {
    let mut report = TextReport::stdout();
    for published in updates {
      if let Err(e) = report.report(&published) {
        warn!("输出失败: {}", e);
      }
    }
  });

  let mut last = None;
  let stdin = io::stdin();
  prompt()?;
  for line in stdin.lock().lines() {
    let line = line.context("读取标准输入失败")?;
    let (handle, mut source) = picker();

    let path = line.trim();
    if path.is_empty() {
      handle.cancelled();
    } else {
      match std::fs::read(path) {
        Ok(data) => handle.picked(RawImage::Encoded(data)),
        Err(e) => {
          warn!("无法读取 {}: {}", path, e);
          handle.cancelled();
        }
      }
    }

    match coordinator.acquire_and_submit(&mut source) {
      Some(token) => last = Some(token),
      None => info!("已取消, 当前状态: {}", coordinator.state().state),
    }
    prompt()?;
  }

  if let Some(token) = last {
    coordinator.wait_for(token, Some(Duration::from_secs(30)));
  }
  drop(coordinator);
  if printer.join().is_err() {
    warn!("输出线程异常退出");
  }

  Ok(())
}

fn prompt() -> Result<()> {
  let mut stdout = io::stdout();
  write!(stdout, "图像路径 (空行取消, Ctrl-D 退出)> ")?;
  stdout.flush()?;
  Ok(())
}
