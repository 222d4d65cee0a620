// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/input/image_file.rs - 单张图像文件输入
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawImage,
  input::{Cancelled, ImageSource},
  url_path,
};

#[derive(Error, Debug)]
pub enum ImageFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 单张图像文件
///
/// 构造时读入文件内容但不解码，解码留给归一化阶段。
/// 第一次 `acquire` 交出图像，之后总是 `Cancelled`。
pub struct ImageFileSource {
  path: PathBuf,
  data: Option<Vec<u8>>,
}

impl FromUrlWithScheme for ImageFileSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileSource {
  type Error = ImageFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::open(url_path(url))
  }
}

impl ImageFileSource {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileError> {
    let path = path.as_ref().to_path_buf();
    let data = std::fs::read(&path)?;
    debug!("读取图像文件: {} ({} 字节)", path.display(), data.len());

    Ok(Self {
      path,
      data: Some(data),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl ImageSource for ImageFileSource {
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    self.data.take().map(RawImage::Encoded).ok_or(Cancelled)
  }
}
