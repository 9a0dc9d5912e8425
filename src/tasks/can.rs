//! CAN通信タスク
//!
//! コマンドフレームの受信処理と、定期ステータスの送信を行います。

use embassy_futures::select::{select, Either};
use embassy_stm32::can;
use embedded_can::{Id, StandardId};
use motorboard::{on_frame, publish_status, Channel, CommandBus, CommandIds, SharedBoard};

use super::{LedIndicator, STATUS_SIGNAL};
use crate::fmt::*;

/// FDCANをコマンドバスとして見せるアダプタ
///
/// 受信フレームはフィルタ設定に従ってチャネルに振り分け、1フレームずつ処理する。
/// 送信は1フレーム分のバッファに積み、タスク側で非同期に書き出す。
pub struct CanBus {
    ids: CommandIds,
    inbox: Option<(Channel, can::frame::Frame)>,
    outbox: Option<can::frame::Frame>,
}

impl CanBus {
    pub fn new(ids: CommandIds) -> Self {
        Self {
            ids,
            inbox: None,
            outbox: None,
        }
    }

    /// 受信フレームを対応するチャネルに格納
    fn deliver(&mut self, frame: can::frame::Frame) {
        let raw_id = match *frame.header().id() {
            Id::Standard(id) => id.as_raw(),
            Id::Extended(id) => {
                debug!("Ignored extended CAN ID: 0x{:08X}", id.as_raw());
                return;
            }
        };

        let channel = if self.ids.speed.matches(raw_id) {
            Channel::Speed
        } else if self.ids.gain.matches(raw_id) {
            Channel::Gain
        } else if self.ids.config.matches(raw_id) {
            Channel::Config
        } else {
            debug!("Unknown CAN ID: 0x{:03X}", raw_id);
            return;
        };

        self.inbox = Some((channel, frame));
    }

    fn take_outbox(&mut self) -> Option<can::frame::Frame> {
        self.outbox.take()
    }
}

impl CommandBus for CanBus {
    type Frame = can::frame::Frame;

    fn try_receive(&mut self, channel: Channel) -> Option<Self::Frame> {
        match self.inbox {
            Some((pending, _)) if pending == channel => self.inbox.take().map(|(_, frame)| frame),
            _ => None,
        }
    }

    fn send(&mut self, id: StandardId, data: &[u8]) -> bool {
        if self.outbox.is_some() {
            return false;
        }
        match <can::frame::Frame as embedded_can::Frame>::new(id, data) {
            Some(frame) => {
                self.outbox = Some(frame);
                true
            }
            None => false,
        }
    }

    /// FIFO0の受信完了はドライバが読み出し時に通知済み。残っている同チャネルのフレームを破棄する。
    fn rearm(&mut self, channel: Channel) {
        if matches!(self.inbox, Some((pending, _)) if pending == channel) {
            self.inbox = None;
        }
    }
}

/// CAN通信タスク - コマンド処理とステータス送信
#[embassy_executor::task]
pub async fn can_task(board: &'static SharedBoard, can: can::Can<'static>, mut leds: LedIndicator) {
    let (mut tx, mut rx, _properties) = can.split();

    let ids = board.lock(|board| board.borrow().config().ids);
    let mut bus = CanBus::new(ids);

    info!("CAN task started");

    loop {
        // CANフレーム受信とステータス送信要求を並行して待つ
        match select(rx.read(), STATUS_SIGNAL.wait()).await {
            Either::First(Ok(envelope)) => {
                bus.deliver(envelope.frame);
                while let Some(frame) = bus.poll() {
                    on_frame(board, &mut bus, frame, &mut leds);
                }
            }
            Either::First(Err(_e)) => {
                debug!("CAN RX error: {:?}", _e);
            }
            Either::Second(status) => {
                if !publish_status(&mut bus, &ids, &status) {
                    debug!("Status frame dropped");
                }
            }
        }

        if let Some(frame) = bus.take_outbox() {
            let _ = tx.write(&frame).await;
        }
    }
}
