//! LED制御
//!
//! - LED1 (PC13): ステータス（ゲイン受信、PID有効）
//! - LED2 (PC14): フォルト（PID無効）
//! - LED3 (PC15): 動作確認用ハートビート

use embassy_stm32::gpio::Output;
use embassy_time::{block_for, Duration, Timer};
use motorboard::{Led, StatusIndicator};

use crate::fmt::*;

/// コマンド受信時のLED点滅
///
/// CANタスクが所有する。点滅はビジーウェイトで、終わるまで戻らない。
pub struct LedIndicator {
    status: Output<'static>,
    fault: Output<'static>,
}

impl LedIndicator {
    pub fn new(status: Output<'static>, fault: Output<'static>) -> Self {
        Self { status, fault }
    }
}

impl StatusIndicator for LedIndicator {
    fn blink(&mut self, led: Led, duration_ms: u32) {
        let output = match led {
            Led::Status => &mut self.status,
            Led::Fault => &mut self.fault,
        };

        output.set_high();
        block_for(Duration::from_millis(duration_ms as u64));
        output.set_low();
    }
}

/// ハートビートタスク
///
/// 500msごとにLED3を反転させます。
#[embassy_executor::task]
pub async fn heartbeat_task(mut led: Output<'static>) {
    info!("Heartbeat task started");

    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
