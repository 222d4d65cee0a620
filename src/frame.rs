// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/frame.rs - 原始图像与模型输入定义
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

pub const RGB_CHANNELS: usize = 3;

/// 位图像素排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
  Rgb8,
  Rgba8,
  Luma8,
}

impl PixelLayout {
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelLayout::Rgb8 => 3,
      PixelLayout::Rgba8 => 4,
      PixelLayout::Luma8 => 1,
    }
  }
}

/// 图像源交付的原始图像
///
/// 图库/文件给出的是编码后的字节（JPEG、PNG 等），摄像头给出的是未压缩位图。
/// 二者都要经过 [`crate::normalize::Normalizer`] 才能送入模型，这里不做任何校验。
#[derive(Debug, Clone, PartialEq)]
pub enum RawImage {
  Encoded(Vec<u8>),
  Bitmap {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
  },
}

impl RawImage {
  pub fn encoded(data: impl Into<Vec<u8>>) -> Self {
    RawImage::Encoded(data.into())
  }

  pub fn rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
    RawImage::Bitmap {
      width,
      height,
      layout: PixelLayout::Rgb8,
      pixels,
    }
  }

  /// 数据大小（字节），仅用于日志
  pub fn byte_len(&self) -> usize {
    match self {
      RawImage::Encoded(data) => data.len(),
      RawImage::Bitmap { pixels, .. } => pixels.len(),
    }
  }
}

pub trait AsNchwFrame {
  fn as_nchw(&self) -> &[f32];
}

/// 归一化后的模型输入，NCHW（平面 RGB）排列，尺寸为 size x size
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
  size: u32,
  data: Box<[f32]>,
}

impl NormalizedInput {
  /// 由 NCHW 数据构造；长度必须为 3 * size * size
  pub fn from_nchw(size: u32, data: Vec<f32>) -> Option<Self> {
    if data.len() != RGB_CHANNELS * size as usize * size as usize {
      return None;
    }
    Some(Self {
      size,
      data: data.into_boxed_slice(),
    })
  }

  pub(crate) fn from_parts(size: u32, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), RGB_CHANNELS * size as usize * size as usize);
    Self {
      size,
      data: data.into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    self.size as usize
  }

  pub fn width(&self) -> usize {
    self.size as usize
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 单个通道平面
  pub fn plane(&self, channel: usize) -> &[f32] {
    let plane_size = self.width() * self.height();
    &self.data[channel * plane_size..(channel + 1) * plane_size]
  }
}

impl AsNchwFrame for NormalizedInput {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}
