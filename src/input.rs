// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/input.rs - 图像输入源
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::RawImage};

/// 用户放弃了本次选择（或源已经没有更多图像）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("图像获取已取消")]
pub struct Cancelled;

/// 图像源
///
/// 摄像头与图库在这个接口后面可以互换。`Cancelled` 不是错误，
/// 调用方应当把它当作什么都没发生。
pub trait ImageSource {
  fn acquire(&mut self) -> Result<RawImage, Cancelled>;
}

impl<S: ImageSource + ?Sized> ImageSource for Box<S> {
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    (**self).acquire()
  }
}

mod image_file;
mod library;
mod picker;
pub use self::image_file::{ImageFileError, ImageFileSource};
pub use self::library::{LibraryError, LibrarySource, is_image_path};
pub use self::picker::{PickerEvent, PickerHandle, PickerSource, picker};

#[cfg(feature = "v4l2_camera")]
mod v4l2_camera;
#[cfg(feature = "v4l2_camera")]
pub use self::v4l2_camera::{CameraError, CameraSource};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileError(#[from] ImageFileError),
  #[error("图库输入错误: {0}")]
  LibraryError(#[from] LibraryError),
  #[cfg(feature = "v4l2_camera")]
  #[error("摄像头输入错误: {0}")]
  CameraError(#[from] CameraError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ImageFile(ImageFileSource),
  Library(LibrarySource),
  #[cfg(feature = "v4l2_camera")]
  Camera(CameraSource),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileSource::SCHEME => Ok(InputWrapper::ImageFile(ImageFileSource::from_url(url)?)),
      LibrarySource::SCHEME => Ok(InputWrapper::Library(LibrarySource::from_url(url)?)),
      #[cfg(feature = "v4l2_camera")]
      CameraSource::SCHEME => Ok(InputWrapper::Camera(CameraSource::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  /// 是否只会产生一张图像
  pub fn is_single_shot(&self) -> bool {
    matches!(self, InputWrapper::ImageFile(_))
  }
}

impl ImageSource for InputWrapper {
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    match self {
      InputWrapper::ImageFile(input) => input.acquire(),
      InputWrapper::Library(input) => input.acquire(),
      #[cfg(feature = "v4l2_camera")]
      InputWrapper::Camera(input) => input.acquire(),
    }
  }
}
