// 该文件是 FireGuard （火卫） 项目的一部分。
// src/output/notify.rs - 火警系统通知
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
  process::Command,
  time::{Duration, Instant},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const FIRE_CHANNEL_ID: &str = "fire-alerts";
pub const FIRE_CHANNEL_NAME: &str = "Fire Alerts";
pub const FIRE_ALERT_TITLE: &str = "Fire detected!";
pub const FIRE_ALERT_BODY: &str = "Fire detected on camera. Please check.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Importance {
  Low,
  Default,
  High,
}

impl Importance {
  /// notify-send 的紧急程度
  fn urgency(self) -> &'static str {
    match self {
      Importance::Low => "low",
      Importance::Default => "normal",
      Importance::High => "critical",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationChannel {
  pub id: String,
  pub name: String,
  pub importance: Importance,
}

impl NotificationChannel {
  pub fn fire_alerts() -> Self {
    Self {
      id: FIRE_CHANNEL_ID.to_string(),
      name: FIRE_CHANNEL_NAME.to_string(),
      importance: Importance::High,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireAlert {
  pub title: String,
  pub body: String,
  pub confidence: Option<f32>,
}

impl FireAlert {
  pub fn new(confidence: Option<f32>) -> Self {
    Self {
      title: FIRE_ALERT_TITLE.to_string(),
      body: FIRE_ALERT_BODY.to_string(),
      confidence,
    }
  }
}

#[derive(Error, Debug)]
pub enum NotifyError {
  #[error("通知渠道尚未创建")]
  ChannelMissing,
  #[error("通知命令启动失败: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("通知命令退出码 {0:?}")]
  CommandFailed(Option<i32>),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub trait Notifier {
  /// 创建通知渠道，重复调用不会重复创建
  fn create_channel(&mut self, channel: &NotificationChannel) -> Result<(), NotifyError>;

  fn notify(&mut self, alert: &FireAlert) -> Result<(), NotifyError>;
}

/// 以 warn 级日志发出通知
#[derive(Debug, Default)]
pub struct LogNotifier {
  channel: Option<NotificationChannel>,
}

impl FromUrlWithScheme for LogNotifier {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogNotifier {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(NotifyError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::default())
  }
}

impl Notifier for LogNotifier {
  fn create_channel(&mut self, channel: &NotificationChannel) -> Result<(), NotifyError> {
    if self.channel.is_none() {
      info!("创建通知渠道: {} ({})", channel.name, channel.id);
      self.channel = Some(channel.clone());
    }
    Ok(())
  }

  fn notify(&mut self, alert: &FireAlert) -> Result<(), NotifyError> {
    let channel = self.channel.as_ref().ok_or(NotifyError::ChannelMissing)?;
    warn!(
      "[{}] {} {} (置信度: {:?})",
      channel.id, alert.title, alert.body, alert.confidence
    );
    Ok(())
  }
}

/// 调用外部程序发送桌面通知
///
/// `command:///usr/bin/notify-send`，标题与正文作为最后两个参数传入。
/// 程序为 notify-send 时额外传入渠道名与紧急程度。
#[derive(Debug)]
pub struct CommandNotifier {
  program: String,
  channel: Option<NotificationChannel>,
}

impl FromUrlWithScheme for CommandNotifier {
  const SCHEME: &'static str = "command";
}

impl FromUrl for CommandNotifier {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(NotifyError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(crate::url_path(url).to_string_lossy()))
  }
}

impl CommandNotifier {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      channel: None,
    }
  }

  /// 程序是否为 notify-send，只有它认识渠道名与紧急程度参数
  fn is_notify_send(&self) -> bool {
    std::path::Path::new(&self.program)
      .file_name()
      .is_some_and(|name| name == "notify-send")
  }

  fn command(&self, channel: &NotificationChannel, alert: &FireAlert) -> Command {
    let mut command = Command::new(&self.program);
    if self.is_notify_send() {
      command
        .arg("--app-name")
        .arg(&channel.name)
        .arg("--urgency")
        .arg(channel.importance.urgency());
    }
    command.arg(&alert.title).arg(&alert.body);
    command
  }
}

impl Notifier for CommandNotifier {
  fn create_channel(&mut self, channel: &NotificationChannel) -> Result<(), NotifyError> {
    if self.channel.is_none() {
      debug!("通知命令 {} 使用渠道 {}", self.program, channel.id);
      self.channel = Some(channel.clone());
    }
    Ok(())
  }

  fn notify(&mut self, alert: &FireAlert) -> Result<(), NotifyError> {
    let channel = self.channel.as_ref().ok_or(NotifyError::ChannelMissing)?;
    let status = self.command(channel, alert).status()?;
    if !status.success() {
      return Err(NotifyError::CommandFailed(status.code()));
    }
    info!("已发送通知: {}", alert.title);
    Ok(())
  }
}

pub enum NotifierWrapper {
  Log(LogNotifier),
  Command(CommandNotifier),
}

impl FromUrl for NotifierWrapper {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogNotifier::SCHEME => Ok(NotifierWrapper::Log(LogNotifier::from_url(url)?)),
      CommandNotifier::SCHEME => Ok(NotifierWrapper::Command(CommandNotifier::from_url(url)?)),
      other => Err(NotifyError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Notifier for NotifierWrapper {
  fn create_channel(&mut self, channel: &NotificationChannel) -> Result<(), NotifyError> {
    match self {
      NotifierWrapper::Log(n) => n.create_channel(channel),
      NotifierWrapper::Command(n) => n.create_channel(channel),
    }
  }

  fn notify(&mut self, alert: &FireAlert) -> Result<(), NotifyError> {
    match self {
      NotifierWrapper::Log(n) => n.notify(alert),
      NotifierWrapper::Command(n) => n.notify(alert),
    }
  }
}

/// 只在火焰判定由否转是时放行一次告警
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
  cooldown: Duration,
  armed_fire: bool,
  last_alert: Option<Instant>,
}

impl AlertGate {
  pub fn new(cooldown: Duration) -> Self {
    Self {
      cooldown,
      ..Default::default()
    }
  }

  /// 记录本周期的火焰判定，返回是否应发出告警
  pub fn observe(&mut self, flame: bool, now: Instant) -> bool {
    if !flame {
      self.armed_fire = false;
      return false;
    }
    if self.armed_fire {
      return false;
    }
    if let Some(last) = self.last_alert
      && now.duration_since(last) < self.cooldown
    {
      return false;
    }
    self.armed_fire = true;
    self.last_alert = Some(now);
    true
  }
}
