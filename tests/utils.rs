#![allow(dead_code)]
use std::collections::VecDeque;

use embedded_can::{Frame, Id, StandardId};
use motorboard::{
    config::can_ids, protocol, BoardConfig, Channel, CommandBus, Direction, FeedbackSource, Led,
    MotorActuator, RxFrame, SharedBoard, StatusIndicator,
};

#[derive(Debug, Clone)]
pub struct SimFrame {
    id: Id,
    len: usize,
    data: [u8; 8],
}

impl SimFrame {
    pub fn standard(id: u16, data: &[u8]) -> Self {
        <Self as Frame>::new(StandardId::new(id).unwrap(), data).unwrap()
    }
}

impl Frame for SimFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            len: data.len(),
            data: buf,
        })
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Encoder that always reports the same movement
pub struct SimEncoder {
    pub ticks: i16,
}

impl FeedbackSource for SimEncoder {
    fn read_signed_ticks(&mut self) -> i16 {
        self.ticks
    }

    fn reset(&mut self) {}
}

/// H-bridge that checks every duty write is bracketed by lock/unlock
#[derive(Default)]
pub struct SimMotor {
    locked: bool,
    pub last: Option<(Direction, u16)>,
    pub writes: usize,
}

impl MotorActuator for SimMotor {
    fn set_duty_cycle(&mut self, direction: Direction, magnitude: u16) {
        assert!(self.locked, "duty written outside lock/unlock");
        self.last = Some((direction, magnitude));
        self.writes += 1;
    }

    fn stop(&mut self) {
        self.last = None;
    }

    fn brake(&mut self) {
        self.last = Some((Direction::Clockwise, 0));
    }

    fn lock(&mut self) {
        assert!(!self.locked, "nested lock");
        self.locked = true;
    }

    fn unlock(&mut self) {
        assert!(self.locked, "unlock without lock");
        self.locked = false;
    }
}

#[derive(Default)]
pub struct SimBus {
    pub pending: VecDeque<RxFrame<SimFrame>>,
    pub rearmed: Vec<Channel>,
    pub sent: Vec<(u16, Vec<u8>)>,
}

impl SimBus {
    pub fn push(&mut self, channel: Channel, frame: SimFrame) {
        self.pending.push_back(RxFrame { channel, frame });
    }
}

impl CommandBus for SimBus {
    type Frame = SimFrame;

    fn try_receive(&mut self, channel: Channel) -> Option<SimFrame> {
        let index = self.pending.iter().position(|rx| rx.channel == channel)?;
        self.pending.remove(index).map(|rx| rx.frame)
    }

    fn send(&mut self, id: StandardId, data: &[u8]) -> bool {
        self.sent.push((id.as_raw(), data.to_vec()));
        true
    }

    fn rearm(&mut self, channel: Channel) {
        self.rearmed.push(channel);
    }
}

#[derive(Default)]
pub struct SimLeds {
    pub blinks: Vec<(Led, u32)>,
}

impl StatusIndicator for SimLeds {
    fn blink(&mut self, led: Led, duration_ms: u32) {
        self.blinks.push((led, duration_ms));
    }
}

pub fn new_board(config: BoardConfig) -> &'static SharedBoard {
    Box::leak(Box::new(motorboard::state::shared(config)))
}

pub fn speed_frame(mrad_s: u16, reverse: bool) -> RxFrame<SimFrame> {
    let data = protocol::encode_speed_command(&protocol::SpeedCommand {
        magnitude: mrad_s,
        reverse,
    });
    RxFrame {
        channel: Channel::Speed,
        frame: SimFrame::standard(can_ids::SPEED_CMD, &data),
    }
}

pub fn config_frame(pid_enabled: bool) -> RxFrame<SimFrame> {
    RxFrame {
        channel: Channel::Config,
        frame: SimFrame::standard(can_ids::CONFIG_CMD, &[pid_enabled as u8]),
    }
}

pub fn gain_frame(which: u8, value: f32) -> RxFrame<SimFrame> {
    let v = value.to_be_bytes();
    RxFrame {
        channel: Channel::Gain,
        frame: SimFrame::standard(can_ids::PID_GAIN, &[which, v[0], v[1], v[2], v[3]]),
    }
}
