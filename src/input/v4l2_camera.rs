// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/input/v4l2_camera.rs - V4L2 摄像头输入
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

use std::pin::Pin;

use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawImage,
  input::{Cancelled, ImageSource},
  url_path,
};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// V4L2 摄像头，每次 `acquire` 拍摄一帧
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box<Device>> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct CameraSource {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for CameraSource {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for CameraSource {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(&url_path(url).to_string_lossy())
  }
}

impl CameraSource {
  pub fn open(device_path: &str) -> Result<Self, CameraError> {
    info!("打开摄像头: {}", device_path);
    let device = Box::pin(Device::with_path(device_path)?);

    let mut format = device.format()?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    info!("摄像头格式: {}x{} {}", format.width, format.height, format.fourcc);

    let mut source = Self {
      device,
      stream: None,
      width: format.width,
      height: format.height,
    };

    let device_ref: &Device = &source.device;
    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动；stream 与 device 存放在同一结构体中，
    // Drop 时先取出 stream 再释放 device
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)?
    };

    source.stream = Some(stream);
    Ok(source)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = (width * height) as usize;
    let yuyv = &yuyv[..yuyv.len().min(pixels * 2)];
    let mut rgb = Vec::with_capacity(pixels * 3);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for CameraSource {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl ImageSource for CameraSource {
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    let stream = self.stream.as_mut().ok_or(Cancelled)?;

    match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb = Self::yuyv_to_rgb(buffer, self.width, self.height);
        Ok(RawImage::rgb8(self.width, self.height, rgb))
      }
      Err(e) => {
        error!("无法捕获帧: {}", e);
        Err(Cancelled)
      }
    }
  }
}
