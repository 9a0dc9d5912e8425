//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod can;
pub mod control;
pub mod led;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use motorboard::BoardStatus;

// タスク関数を再エクスポート
pub use can::can_task;
pub use control::control_task;
pub use led::{heartbeat_task, LedIndicator};

/// 制御タスク → CANタスクへのステータス受け渡し（最新値のみ保持）
pub static STATUS_SIGNAL: Signal<CriticalSectionRawMutex, BoardStatus> = Signal::new();
