// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/input/library.rs - 图库输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawImage,
  input::{Cancelled, ImageSource},
  url_path,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum LibraryError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("不是目录: {0}")]
  NotADirectory(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按扩展名判断是否为图片文件（不区分大小写）
pub fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

/// 图库：目录下的图片按路径顺序逐张交付
pub struct LibrarySource {
  root: PathBuf,
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for LibrarySource {
  const SCHEME: &'static str = "library";
}

impl FromUrl for LibrarySource {
  type Error = LibraryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LibraryError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url_path(url))
  }
}

impl LibrarySource {
  pub fn open(root: impl AsRef<Path>) -> Result<Self, LibraryError> {
    let root = root.as_ref().to_path_buf();
    if !root.is_dir() {
      return Err(LibraryError::NotADirectory(root));
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(&root)? {
      let path = entry?.path();
      if path.is_file() && is_image_path(&path) {
        images.push(path);
      }
    }
    images.sort();
    info!("图库 {} 中共有 {} 张图片", root.display(), images.len());

    Ok(Self {
      root,
      pending: images.into(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl ImageSource for LibrarySource {
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    while let Some(path) = self.pending.pop_front() {
      match std::fs::read(&path) {
        Ok(data) => {
          info!("从图库选取: {}", path.display());
          return Ok(RawImage::Encoded(data));
        }
        Err(e) => warn!("跳过无法读取的图片 {}: {}", path.display(), e),
      }
    }
    Err(Cancelled)
  }
}
