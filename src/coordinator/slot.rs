// 该文件是 Pijian （皮鉴） 项目的一部分。
// src/coordinator/slot.rs - 可观察的分类结果槽
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
  fmt,
  sync::{
    Condvar, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
    mpsc::{Receiver, Sender, channel},
  },
  time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::model::{Inference, RankedLabel};

/// 一次“接受图像”事件的标识，单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

impl RequestToken {
  pub(crate) const fn new(value: u64) -> Self {
    Self(value)
  }

  pub fn value(&self) -> u64 {
    self.0
  }
}

impl fmt::Display for RequestToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// 失败原因，对外展示为固定的提示文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
  ImageUnreadable,
  ClassifierUnavailable,
  ClassificationFailed,
}

impl FailureReason {
  pub fn message(&self) -> &'static str {
    match self {
      FailureReason::ImageUnreadable => "image could not be processed",
      FailureReason::ClassifierUnavailable => "classifier unavailable",
      FailureReason::ClassificationFailed => "classification failed",
    }
  }
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.message())
  }
}

impl Serialize for FailureReason {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.message())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClassificationState {
  Idle,
  Loading,
  Success { label: String, confidence: f32 },
  NoDetection,
  Failed { reason: FailureReason },
}

impl ClassificationState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ClassificationState::Success { .. }
        | ClassificationState::NoDetection
        | ClassificationState::Failed { .. }
    )
  }

  pub fn failed(reason: FailureReason) -> Self {
    ClassificationState::Failed { reason }
  }
}

impl From<Inference> for ClassificationState {
  fn from(inference: Inference) -> Self {
    match inference {
      Inference::Ranked(RankedLabel { label, confidence }) => {
        ClassificationState::Success { label, confidence }
      }
      Inference::NoDetection => ClassificationState::NoDetection,
    }
  }
}

impl fmt::Display for ClassificationState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ClassificationState::Idle => write!(f, "No image yet"),
      ClassificationState::Loading => write!(f, "Classifying…"),
      ClassificationState::Success { label, confidence } => {
        write!(f, "{} ({:.1}%)", label, confidence * 100.0)
      }
      ClassificationState::NoDetection => write!(f, "no result detected"),
      ClassificationState::Failed { reason } => write!(f, "{}", reason),
    }
  }
}

/// 一次发布：哪个请求、什么状态、何时发布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
  pub token: RequestToken,
  #[serde(flatten)]
  pub state: ClassificationState,
  pub at: DateTime<Utc>,
}

struct SlotInner {
  current: Published,
  subscribers: Vec<Sender<Published>>,
}

/// 结果槽
///
/// 活动令牌与当前状态只在持有 `inner` 锁时修改，发布前在锁内比较令牌，
/// 因此过期请求的结果永远不会覆盖较新的状态，两次发布也不会交错。
pub(crate) struct ResultSlot {
  active: AtomicU64,
  inner: Mutex<SlotInner>,
  changed: Condvar,
}

impl ResultSlot {
  pub(crate) fn new() -> Self {
    Self {
      active: AtomicU64::new(0),
      inner: Mutex::new(SlotInner {
        current: Published {
          token: RequestToken::new(0),
          state: ClassificationState::Idle,
          at: Utc::now(),
        },
        subscribers: Vec::new(),
      }),
      changed: Condvar::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, SlotInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) fn is_current(&self, token: RequestToken) -> bool {
    self.active.load(Ordering::SeqCst) == token.0
  }

  /// 签发新令牌并立即发布 `state`，之前的令牌全部过期
  pub(crate) fn begin(&self, state: ClassificationState) -> RequestToken {
    let mut inner = self.lock();
    let token = RequestToken::new(self.active.fetch_add(1, Ordering::SeqCst) + 1);
    self.publish(&mut inner, token, state);
    token
  }

  /// 仅当 `token` 仍是活动令牌时发布，返回是否发布
  pub(crate) fn complete(&self, token: RequestToken, state: ClassificationState) -> bool {
    let mut inner = self.lock();
    if !self.is_current(token) {
      return false;
    }
    self.publish(&mut inner, token, state);
    true
  }

  fn publish(&self, inner: &mut SlotInner, token: RequestToken, state: ClassificationState) {
    let published = Published {
      token,
      state,
      at: Utc::now(),
    };
    inner
      .subscribers
      .retain(|tx| tx.send(published.clone()).is_ok());
    inner.current = published;
    self.changed.notify_all();
  }

  pub(crate) fn snapshot(&self) -> Published {
    self.lock().current.clone()
  }

  pub(crate) fn subscribe(&self) -> Receiver<Published> {
    let (tx, rx) = channel();
    self.lock().subscribers.push(tx);
    rx
  }

  /// 等待 `token` 的最终状态；请求被取代或超时返回 `None`
  pub(crate) fn wait_for(&self, token: RequestToken, timeout: Option<Duration>) -> Option<Published> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut inner = self.lock();
    loop {
      if inner.current.token == token && inner.current.state.is_terminal() {
        return Some(inner.current.clone());
      }
      if !self.is_current(token) {
        return None;
      }

      inner = match deadline {
        None => self
          .changed
          .wait(inner)
          .unwrap_or_else(PoisonError::into_inner),
        Some(deadline) => {
          let now = Instant::now();
          if now >= deadline {
            return None;
          }
          self
            .changed
            .wait_timeout(inner, deadline - now)
            .unwrap_or_else(PoisonError::into_inner)
            .0
        }
      };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn success(label: &str) -> ClassificationState {
    ClassificationState::Success {
      label: label.into(),
      confidence: 0.75,
    }
  }

  #[test]
  fn starts_idle_with_no_active_request() {
    let slot = ResultSlot::new();
    let published = slot.snapshot();
    assert_eq!(published.state, ClassificationState::Idle);
    assert_eq!(published.token.value(), 0);
  }

  #[test]
  fn tokens_increase_and_supersede() {
    let slot = ResultSlot::new();
    let t1 = slot.begin(ClassificationState::Loading);
    let t2 = slot.begin(ClassificationState::Loading);
    assert!(t2 > t1);
    assert!(!slot.is_current(t1));
    assert!(slot.is_current(t2));
  }

  #[test]
  fn stale_completion_never_overwrites_newer_result() {
    let slot = ResultSlot::new();
    let t1 = slot.begin(ClassificationState::Loading);
    let t2 = slot.begin(ClassificationState::Loading);

    // 较新的请求先完成，旧请求后到
    assert!(slot.complete(t2, success("second")));
    assert!(!slot.complete(t1, success("first")));
    assert_eq!(slot.snapshot().state, success("second"));
    assert_eq!(slot.snapshot().token, t2);
  }

  #[test]
  fn stale_completion_is_dropped_before_newer_finishes() {
    let slot = ResultSlot::new();
    let t1 = slot.begin(ClassificationState::Loading);
    let t2 = slot.begin(ClassificationState::Loading);

    assert!(!slot.complete(t1, success("first")));
    assert_eq!(slot.snapshot().state, ClassificationState::Loading);
    assert!(slot.complete(t2, ClassificationState::NoDetection));
    assert_eq!(slot.snapshot().state, ClassificationState::NoDetection);
  }

  #[test]
  fn subscribers_see_every_publication_in_order() {
    let slot = ResultSlot::new();
    let rx = slot.subscribe();
    let t1 = slot.begin(ClassificationState::Loading);
    slot.complete(t1, success("benign"));

    let seen: Vec<_> = rx.try_iter().map(|p| p.state).collect();
    assert_eq!(seen, vec![ClassificationState::Loading, success("benign")]);
  }

  #[test]
  fn dropped_subscribers_are_pruned() {
    let slot = ResultSlot::new();
    drop(slot.subscribe());
    slot.begin(ClassificationState::Loading);
    assert!(slot.lock().subscribers.is_empty());
  }

  #[test]
  fn wait_for_returns_terminal_or_none() {
    let slot = ResultSlot::new();
    let t1 = slot.begin(ClassificationState::Loading);
    assert_eq!(slot.wait_for(t1, Some(Duration::from_millis(10))), None);

    slot.complete(t1, ClassificationState::failed(FailureReason::ClassifierUnavailable));
    let published = slot.wait_for(t1, None).unwrap();
    assert_eq!(
      published.state,
      ClassificationState::failed(FailureReason::ClassifierUnavailable)
    );

    let t2 = slot.begin(ClassificationState::Loading);
    assert_eq!(slot.wait_for(t1, None), None);
    assert!(slot.is_current(t2));
  }

  #[test]
  fn state_serializes_with_tag_and_message() {
    let json = serde_json::to_value(ClassificationState::failed(FailureReason::ImageUnreadable)).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"state": "failed", "reason": "image could not be processed"})
    );

    let json = serde_json::to_value(ClassificationState::NoDetection).unwrap();
    assert_eq!(json, serde_json::json!({"state": "no_detection"}));
  }

  #[test]
  fn display_matches_user_facing_text() {
    assert_eq!(success("benign").to_string(), "benign (75.0%)");
    assert_eq!(ClassificationState::Loading.to_string(), "Classifying…");
    assert_eq!(ClassificationState::NoDetection.to_string(), "no result detected");
    assert_eq!(ClassificationState::Idle.to_string(), "No image yet");
    assert_eq!(
      ClassificationState::failed(FailureReason::ClassificationFailed).to_string(),
      "classification failed"
    );
  }
}
