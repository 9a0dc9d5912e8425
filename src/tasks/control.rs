//! 制御周期タスク
//!
//! 高優先度の割り込みエグゼキュータ上で一定周期ごとに制御ティックを実行します。
//! CANタスクより優先度が高いため、受信処理中でもティックは遅れない。

use embassy_time::{Duration, Ticker};
use motorboard::{on_tick, SharedBoard};

use super::STATUS_SIGNAL;
use crate::encoder_tim::EncoderTim;
use crate::fmt::*;
use crate::motor_driver::MotorDriver;

/// 制御タスク
///
/// エンコーダーとモータードライバーはこのタスクだけが所有する。
#[embassy_executor::task]
pub async fn control_task(
    board: &'static SharedBoard,
    mut encoder: EncoderTim,
    mut motor: MotorDriver,
) {
    let period_ms = board.lock(|board| board.borrow().config().tick_period_ms);
    info!("Control task started ({} ms period)", period_ms);

    let mut ticker = Ticker::every(Duration::from_millis(period_ms as u64));

    loop {
        ticker.next().await;

        // クリティカルセクション内でティック本体を実行
        let report = on_tick(board, &mut encoder, &mut motor);

        // ステータス送信タイミングならCANタスクへ通知
        if let Some(status) = report.status {
            STATUS_SIGNAL.signal(status);
        }
    }
}
