// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/lib.rs - 库主文件
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

use std::path::PathBuf;

pub mod coordinator;
pub mod frame;
pub mod input;
pub mod model;
pub mod normalize;
pub mod output;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将 URL 转为本地路径
///
/// `scheme:///abs/path` 得到绝对路径，`scheme://dir/file` 得到相对路径 `dir/file`。
/// 路径中的百分号编码会被解码。
pub fn url_path(url: &url::Url) -> PathBuf {
  let path = match url.host_str() {
    Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
    _ => url.path().to_string(),
  };
  match urlencoding::decode(&path) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(path),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_handles_absolute_relative_and_encoded() {
    let abs = url::Url::parse("image:///tmp/lesion.jpg").unwrap();
    assert_eq!(url_path(&abs), PathBuf::from("/tmp/lesion.jpg"));

    let rel = url::Url::parse("library://photos/2026").unwrap();
    assert_eq!(url_path(&rel), PathBuf::from("photos/2026"));

    let encoded = url::Url::parse("image:///tmp/my%20lesion.png").unwrap();
    assert_eq!(url_path(&encoded), PathBuf::from("/tmp/my lesion.png"));
  }
}
