// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/input/picker.rs - 单次图像选择器
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

use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use tracing::debug;

use crate::{
  frame::RawImage,
  input::{Cancelled, ImageSource},
};

/// 选择器的完成事件
#[derive(Debug)]
pub enum PickerEvent {
  Picked(RawImage),
  Cancelled,
}

/// 创建一对单次选择器
///
/// `PickerHandle` 交给界面一侧（相机或相册回调），`PickerSource` 交给分类流程。
/// 句柄被消耗或丢弃后，选择即告结束。
pub fn picker() -> (PickerHandle, PickerSource) {
  let (tx, rx) = sync_channel(1);
  (PickerHandle { tx }, PickerSource { rx: Some(rx) })
}

pub struct PickerHandle {
  tx: SyncSender<PickerEvent>,
}

impl PickerHandle {
  pub fn picked(self, image: RawImage) {
    self.complete(PickerEvent::Picked(image));
  }

  pub fn cancelled(self) {
    self.complete(PickerEvent::Cancelled);
  }

  fn complete(self, event: PickerEvent) {
    // 对端已经放弃等待时没有人关心结果
    if self.tx.send(event).is_err() {
      debug!("选择器已被丢弃, 忽略完成事件");
    }
  }
}

pub struct PickerSource {
  rx: Option<Receiver<PickerEvent>>,
}

impl ImageSource for PickerSource {
  /// 阻塞直到界面一侧给出结果
  fn acquire(&mut self) -> Result<RawImage, Cancelled> {
    let rx = self.rx.take().ok_or(Cancelled)?;
    match rx.recv() {
      Ok(PickerEvent::Picked(image)) => Ok(image),
      Ok(PickerEvent::Cancelled) | Err(_) => Err(Cancelled),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;

  #[test]
  fn picked_image_is_delivered_once() {
    let (handle, mut source) = picker();
    let ui = thread::spawn(move || handle.picked(RawImage::encoded(vec![1, 2, 3])));
    assert_eq!(source.acquire(), Ok(RawImage::encoded(vec![1, 2, 3])));
    assert_eq!(source.acquire(), Err(Cancelled));
    ui.join().unwrap();
  }

  #[test]
  fn cancel_and_dropped_handle_are_cancelled() {
    let (handle, mut source) = picker();
    handle.cancelled();
    assert_eq!(source.acquire(), Err(Cancelled));

    let (handle, mut source) = picker();
    drop(handle);
    assert_eq!(source.acquire(), Err(Cancelled));
  }

  #[test]
  fn completing_after_source_dropped_is_harmless() {
    let (handle, source) = picker();
    drop(source);
    handle.picked(RawImage::encoded(vec![0]));
  }
}
