// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/output.rs - 分类结果输出
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

use std::io::{self, Stdout, Write};

use thiserror::Error;
use tracing::{info, warn};

use crate::coordinator::{ClassificationState, Published};

pub trait Report {
  type Error;
  fn report(&mut self, published: &Published) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  Io(#[from] io::Error),
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 人类可读的单行输出
pub struct TextReport<W: Write> {
  out: W,
}

impl TextReport<Stdout> {
  pub fn stdout() -> Self {
    Self::new(io::stdout())
  }
}

impl<W: Write> TextReport<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }
}

impl<W: Write> Report for TextReport<W> {
  type Error = ReportError;

  fn report(&mut self, published: &Published) -> Result<(), Self::Error> {
    match &published.state {
      ClassificationState::Failed { reason } => warn!("{}: {}", published.token, reason),
      state => info!("{}: {}", published.token, state),
    }
    writeln!(
      self.out,
      "[{}] {} {}",
      published.at.format("%Y-%m-%d %H:%M:%S%.3f"),
      published.token,
      published.state
    )?;
    Ok(())
  }
}

/// 每次发布输出一行 JSON
pub struct JsonReport<W: Write> {
  out: W,
}

impl JsonReport<Stdout> {
  pub fn stdout() -> Self {
    Self::new(io::stdout())
  }
}

impl<W: Write> JsonReport<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }
}

impl<W: Write> Report for JsonReport<W> {
  type Error = ReportError;

  fn report(&mut self, published: &Published) -> Result<(), Self::Error> {
    serde_json::to_writer(&mut self.out, published)?;
    self.out.write_all(b"\n")?;
    self.out.flush()?;
    Ok(())
  }
}

pub enum OutputWrapper {
  Text(TextReport<Stdout>),
  Json(JsonReport<Stdout>),
}

impl Report for OutputWrapper {
  type Error = ReportError;

  fn report(&mut self, published: &Published) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Text(output) => output.report(published),
      OutputWrapper::Json(output) => output.report(published),
    }
  }
}
