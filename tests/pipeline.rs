// 该文件是 Pijian （皮鉴） 项目的一部分。
// tests/pipeline.rs - 端到端分类流程测试
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
  io::Cursor,
  path::{Path, PathBuf},
  time::Duration,
};

use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use pijian::{
  coordinator::{ClassificationState, Coordinator, FailureReason, Published},
  frame::RawImage,
  input::{LibrarySource, picker},
  model::{ClassifierEngine, EngineConfig, LinearModelBuilder, LinearModelSpec},
  normalize::{NormalizeConfig, Normalizer},
  output::JsonReport,
  task::ContinuousTask,
};

const SIZE: u32 = 8;
const WAIT: Option<Duration> = Some(Duration::from_secs(10));

/// 蓝色偏向 benign，红色偏向 malignant
fn color_spec() -> LinearModelSpec {
  LinearModelSpec {
    labels: vec!["benign".into(), "malignant".into()],
    input_size: SIZE,
    grid: 1,
    weights: vec![vec![-4.0, 0.0, 4.0], vec![4.0, 0.0, -4.0]],
    bias: vec![0.0, 0.0],
  }
}

fn flat_spec() -> LinearModelSpec {
  LinearModelSpec {
    weights: vec![vec![0.0; 3], vec![0.0; 3]],
    ..color_spec()
  }
}

fn write_model(dir: &Path, spec: &LinearModelSpec) -> PathBuf {
  let path = dir.join("model.json");
  std::fs::write(&path, serde_json::to_vec(spec).unwrap()).unwrap();
  path
}

fn png(color: [u8; 3], width: u32, height: u32) -> Vec<u8> {
  let image = RgbImage::from_pixel(width, height, Rgb(color));
  let mut buf = Cursor::new(Vec::new());
  image.write_to(&mut buf, ImageFormat::Png).unwrap();
  buf.into_inner()
}

fn blue() -> RawImage {
  RawImage::encoded(png([0, 0, 255], 32, 24))
}

fn red() -> RawImage {
  RawImage::encoded(png([255, 0, 0], 24, 32))
}

fn coordinator(model_path: &Path) -> Coordinator {
  let engine = ClassifierEngine::new(LinearModelBuilder::new(model_path), EngineConfig::default()).unwrap();
  let normalizer = Normalizer::new(NormalizeConfig::default().with_size(SIZE)).unwrap();
  Coordinator::new(normalizer, engine).unwrap()
}

fn setup(spec: &LinearModelSpec) -> (TempDir, Coordinator) {
  let dir = tempfile::tempdir().unwrap();
  let path = write_model(dir.path(), spec);
  let coordinator = coordinator(&path);
  (dir, coordinator)
}

fn label_of(published: &Published) -> Option<(&str, f32)> {
  match &published.state {
    ClassificationState::Success { label, confidence } => Some((label.as_str(), *confidence)),
    _ => None,
  }
}

#[test]
fn valid_photo_goes_loading_then_success() {
  let (_dir, coordinator) = setup(&color_spec());
  let updates = coordinator.subscribe();

  let token = coordinator.submit(blue());
  let published = coordinator.wait_for(token, WAIT).unwrap();
  let (label, confidence) = label_of(&published).unwrap();
  assert_eq!(label, "benign");
  assert!(confidence > 0.99 && confidence <= 1.0);

  let states: Vec<_> = updates.try_iter().map(|p| p.state).collect();
  assert_eq!(states[0], ClassificationState::Loading);
  assert_eq!(states.len(), 2);
}

#[test]
fn input_is_scaled_to_the_model_size() {
  let spec = LinearModelSpec {
    input_size: 64,
    ..color_spec()
  };
  let dir = tempfile::tempdir().unwrap();
  let path = write_model(dir.path(), &spec);
  let engine = ClassifierEngine::new(LinearModelBuilder::new(&path), EngineConfig::default()).unwrap();
  let normalizer = Normalizer::new(NormalizeConfig::default()).unwrap();
  assert_ne!(normalizer.size(), spec.input_size);
  let coordinator = Coordinator::new(normalizer, engine).unwrap();

  let token = coordinator.submit(RawImage::encoded(png([0, 0, 255], 32, 32)));
  let published = coordinator.wait_for(token, WAIT).unwrap();
  let (label, confidence) = label_of(&published).unwrap();
  assert_eq!(label, "benign");
  assert!(confidence > 0.99 && confidence <= 1.0);
}

#[test]
fn corrupt_image_reports_unreadable() {
  let (_dir, coordinator) = setup(&color_spec());
  let token = coordinator.submit(RawImage::encoded(vec![0xFF, 0xD8, 0x00, 0x13, 0x37]));
  assert_eq!(
    coordinator.wait_for(token, WAIT).unwrap().state,
    ClassificationState::failed(FailureReason::ImageUnreadable)
  );
  assert_eq!(
    coordinator.state().state.to_string(),
    "image could not be processed"
  );
}

#[test]
fn missing_model_then_recovered() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("model.json");
  let coordinator = coordinator(&path);

  let first = coordinator.submit(blue());
  assert_eq!(
    coordinator.wait_for(first, WAIT).unwrap().state,
    ClassificationState::failed(FailureReason::ClassifierUnavailable)
  );
  assert!(!coordinator.engine().is_loaded());

  write_model(dir.path(), &color_spec());
  let second = coordinator.submit(blue());
  let published = coordinator.wait_for(second, WAIT).unwrap();
  assert_eq!(label_of(&published).map(|(l, _)| l), Some("benign"));
  assert!(coordinator.engine().is_loaded());
}

#[test]
fn quick_resubmission_only_publishes_latest() {
  let (_dir, coordinator) = setup(&color_spec());
  let updates = coordinator.subscribe();

  let first = coordinator.submit(blue());
  let second = coordinator.submit(red());
  let published = coordinator.wait_for(second, WAIT).unwrap();
  assert_eq!(label_of(&published).map(|(l, _)| l), Some("malignant"));
  assert_eq!(coordinator.state().token, second);

  // 第二次提交之后不应再出现第一个请求的任何发布
  let log: Vec<Published> = updates.try_iter().collect();
  let second_loading = log
    .iter()
    .position(|p| p.token == second)
    .unwrap();
  assert_eq!(log[second_loading].state, ClassificationState::Loading);
  assert!(log[second_loading..].iter().all(|p| p.token != first));
}

#[test]
fn flat_probabilities_are_no_detection() {
  let (_dir, coordinator) = setup(&flat_spec());
  let token = coordinator.submit(blue());
  assert_eq!(
    coordinator.wait_for(token, WAIT).unwrap().state,
    ClassificationState::NoDetection
  );
}

#[test]
fn same_image_same_result() {
  let (_dir, coordinator) = setup(&color_spec());
  let a = coordinator.submit(red());
  let a = coordinator.wait_for(a, WAIT).unwrap();
  let b = coordinator.submit(red());
  let b = coordinator.wait_for(b, WAIT).unwrap();
  assert_eq!(a.state, b.state);
}

#[test]
fn failure_does_not_poison_later_requests() {
  let (_dir, coordinator) = setup(&color_spec());
  let bad = coordinator.submit(RawImage::encoded(b"not an image".to_vec()));
  coordinator.wait_for(bad, WAIT).unwrap();

  let good = coordinator.submit(blue());
  let published = coordinator.wait_for(good, WAIT).unwrap();
  assert_eq!(label_of(&published).map(|(l, _)| l), Some("benign"));
}

#[test]
fn raw_camera_bitmap_is_classified() {
  let (_dir, coordinator) = setup(&color_spec());
  let pixels = [0u8, 0, 255].repeat(20 * 10);
  let token = coordinator.submit(RawImage::rgb8(20, 10, pixels));
  let published = coordinator.wait_for(token, WAIT).unwrap();
  assert_eq!(label_of(&published).map(|(l, _)| l), Some("benign"));
}

#[test]
fn picker_cancel_leaves_state_untouched() {
  let (_dir, coordinator) = setup(&color_spec());
  let token = coordinator.submit(blue());
  let done = coordinator.wait_for(token, WAIT).unwrap();

  let (handle, mut source) = picker();
  handle.cancelled();
  assert_eq!(coordinator.acquire_and_submit(&mut source), None);
  assert_eq!(coordinator.state(), done);

  let (handle, mut source) = picker();
  handle.picked(red());
  let token = coordinator.acquire_and_submit(&mut source).unwrap();
  let published = coordinator.wait_for(token, WAIT).unwrap();
  assert_eq!(label_of(&published).map(|(l, _)| l), Some("malignant"));
}

#[test]
fn reset_returns_to_idle() {
  let (_dir, coordinator) = setup(&color_spec());
  let token = coordinator.submit(blue());
  coordinator.wait_for(token, WAIT);
  coordinator.reset();
  assert_eq!(coordinator.state().state, ClassificationState::Idle);
}

#[test]
fn library_run_reports_every_image() {
  let (dir, coordinator) = setup(&color_spec());
  let photos = dir.path().join("photos");
  std::fs::create_dir(&photos).unwrap();
  std::fs::write(photos.join("1.png"), png([0, 0, 255], 16, 16)).unwrap();
  std::fs::write(photos.join("2.jpg"), b"truncated").unwrap();
  std::fs::write(photos.join("3.png"), png([255, 0, 0], 16, 16)).unwrap();

  let mut source = LibrarySource::open(&photos).unwrap();
  let mut output = JsonReport::new(Vec::new());
  let tally = ContinuousTask::default()
    .drive(&mut source, &coordinator, &mut output, || false)
    .unwrap();
  assert_eq!(tally.success, 2);
  assert_eq!(tally.failed, 1);
  assert_eq!(tally.total(), 3);

  let lines: Vec<serde_json::Value> = String::from_utf8(output.into_inner())
    .unwrap()
    .lines()
    .map(|l| serde_json::from_str(l).unwrap())
    .collect();
  let terminal: Vec<&str> = lines
    .iter()
    .map(|v| v["state"].as_str().unwrap())
    .filter(|s| *s != "loading")
    .collect();
  assert_eq!(terminal, vec!["success", "failed", "success"]);
}

#[test]
fn library_run_respects_image_limit() {
  let (dir, coordinator) = setup(&color_spec());
  let photos = dir.path().join("photos");
  std::fs::create_dir(&photos).unwrap();
  for name in ["a.png", "b.png", "c.png"] {
    std::fs::write(photos.join(name), png([0, 0, 255], 8, 8)).unwrap();
  }

  let mut source = LibrarySource::open(&photos).unwrap();
  let mut output = JsonReport::new(Vec::new());
  let tally = ContinuousTask::default()
    .with_image_limit(Some(2))
    .drive(&mut source, &coordinator, &mut output, || false)
    .unwrap();
  assert_eq!(tally.total(), 2);
  assert_eq!(source.remaining(), 1);
}
