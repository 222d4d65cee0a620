// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/normalize.rs - 图像归一化（中心裁剪与缩放）
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

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{NormalizedInput, PixelLayout, RGB_CHANNELS, RawImage};

const DEFAULT_INPUT_SIZE: u32 = 224;
const RESIZE_FILTER: FilterType = FilterType::Triangle;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("图像尺寸无效: {width}x{height}")]
  ZeroDimensions { width: u32, height: u32 },
  #[error("位图数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  BufferSize { expected: usize, actual: usize },
}

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeConfigError {
  #[error("输入尺寸必须大于 0")]
  ZeroSize,
  #[error("通道 {channel} 的均值无效: {value}")]
  InvalidMean { channel: usize, value: f32 },
  #[error("通道 {channel} 的标准差必须为正数, 实际为 {value}")]
  InvalidStd { channel: usize, value: f32 },
}

/// 归一化参数
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
  /// `normalize` 使用的边长（正方形）；分类流程以模型声明的输入尺寸为准
  pub size: u32,
  /// 每通道均值，作用于 [0, 1] 范围的像素值
  pub mean: [f32; 3],
  /// 每通道标准差
  pub std: [f32; 3],
}

impl Default for NormalizeConfig {
  fn default() -> Self {
    Self {
      size: DEFAULT_INPUT_SIZE,
      mean: [0.0; 3],
      std: [1.0; 3],
    }
  }
}

impl NormalizeConfig {
  pub fn with_size(mut self, size: u32) -> Self {
    self.size = size;
    self
  }
}

/// 图像归一化器
///
/// 无内部可变状态，可在任意线程调用。同一输入总是得到同一输出。
#[derive(Debug, Clone)]
pub struct Normalizer {
  size: u32,
  // value = pixel * alpha + beta，即 (pixel / 255 - mean) / std
  alpha: [f32; 3],
  beta: [f32; 3],
}

impl Normalizer {
  pub fn new(config: NormalizeConfig) -> Result<Self, NormalizeConfigError> {
    if config.size == 0 {
      return Err(NormalizeConfigError::ZeroSize);
    }

    let mut alpha = [0.0; 3];
    let mut beta = [0.0; 3];
    for c in 0..RGB_CHANNELS {
      let (mean, std) = (config.mean[c], config.std[c]);
      if !mean.is_finite() {
        return Err(NormalizeConfigError::InvalidMean {
          channel: c,
          value: mean,
        });
      }
      if !std.is_finite() || std <= 0.0 {
        return Err(NormalizeConfigError::InvalidStd {
          channel: c,
          value: std,
        });
      }
      alpha[c] = 1.0 / (255.0 * std);
      beta[c] = -mean / std;
    }

    Ok(Self {
      size: config.size,
      alpha,
      beta,
    })
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  /// 按配置的尺寸归一化
  pub fn normalize(&self, raw: RawImage) -> Result<NormalizedInput, DecodeError> {
    let image = self.decode(raw)?;
    Ok(self.scale(&image, self.size))
  }

  /// 解码为 RGB 图像，不裁剪也不缩放
  pub fn decode(&self, raw: RawImage) -> Result<RgbImage, DecodeError> {
    let image = decode(raw)?.to_rgb8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(DecodeError::ZeroDimensions { width, height });
    }
    Ok(image)
  }

  /// 中心裁剪并缩放到 `size x size`，输出 NCHW
  pub fn scale(&self, image: &RgbImage, size: u32) -> NormalizedInput {
    let (width, height) = image.dimensions();
    let (x, y, side) = center_square(width, height);
    debug!(
      "中心裁剪: 原图 {}x{}, 裁剪区域 ({}, {}) 边长 {}, 缩放至 {}",
      width, height, x, y, side, size
    );
    let cropped = image::imageops::crop_imm(image, x, y, side, side).to_image();
    let resized = image::imageops::resize(&cropped, size, size, RESIZE_FILTER);

    self.to_nchw(&resized, size)
  }

  fn to_nchw(&self, image: &RgbImage, size: u32) -> NormalizedInput {
    let side = size as usize;
    let plane_size = side * side;
    let mut data = vec![0.0f32; RGB_CHANNELS * plane_size];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * side + (x as usize);
      for c in 0..RGB_CHANNELS {
        data[c * plane_size + idx] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
      }
    }

    NormalizedInput::from_parts(size, data)
  }
}

/// 计算居中的最大正方形区域，返回 (x, y, 边长)
pub fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
  let side = width.min(height);
  ((width - side) / 2, (height - side) / 2, side)
}

fn decode(raw: RawImage) -> Result<DynamicImage, DecodeError> {
  match raw {
    RawImage::Encoded(data) => Ok(image::load_from_memory(&data)?),
    RawImage::Bitmap {
      width,
      height,
      layout,
      pixels,
    } => {
      if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions { width, height });
      }

      let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(layout.bytes_per_pixel()))
        .unwrap_or(usize::MAX);
      let actual = pixels.len();
      let mismatch = DecodeError::BufferSize { expected, actual };
      if expected != actual {
        return Err(mismatch);
      }

      let image = match layout {
        PixelLayout::Rgb8 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        PixelLayout::Rgba8 => {
          RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
        }
        PixelLayout::Luma8 => {
          GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
      };
      image.ok_or(mismatch)
    }
  }
}
