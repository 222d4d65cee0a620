// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  /// 人类可读文本
  Text,
  /// 每行一个 JSON 对象
  Json,
}

/// Pijian 皮肤病变图像分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件，例如 linear:///opt/pijian/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/lesion.jpg
  /// - 图库目录: library:///path/to/photos
  /// - V4L2 摄像头: v4l2:///dev/video0（需要 v4l2_camera 特性）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 检出阈值 [0.0, 1.0)，最高置信度必须严格大于该值
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 输出格式
  #[arg(long, value_enum, default_value = "text")]
  pub format: Format,

  /// 最大处理图像数（仅对图库/摄像头有效，0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_images: usize,
}
