//! Recording stand-ins for the board peripherals, used by the unit tests

use std::collections::VecDeque;

use embedded_can::{ExtendedId, Frame, Id, StandardId};

use crate::traits::{
    Channel, CommandBus, Direction, FeedbackSource, Led, MotorActuator, StatusIndicator,
};

/// Minimal classic CAN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFrame {
    id: Id,
    remote: bool,
    dlc: usize,
    data: [u8; 8],
}

impl TestFrame {
    pub fn data(id: u16, data: &[u8]) -> Self {
        let id = StandardId::new(id).expect("standard id out of range");
        <Self as Frame>::new(id, data).expect("payload longer than 8 bytes")
    }

    pub fn extended(id: u32, data: &[u8]) -> Self {
        let id = ExtendedId::new(id).expect("extended id out of range");
        <Self as Frame>::new(id, data).expect("payload longer than 8 bytes")
    }

    pub fn remote(id: u16, dlc: usize) -> Self {
        let id = StandardId::new(id).expect("standard id out of range");
        <Self as Frame>::new_remote(id, dlc).expect("dlc larger than 8")
    }
}

impl Frame for TestFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            remote: false,
            dlc: data.len(),
            data: buf,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(Self {
            id: id.into(),
            remote: true,
            dlc,
            data: [0; 8],
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.dlc]
        }
    }
}

/// Encoder returning a scripted sequence of readings, then zeros
#[derive(Debug, Default)]
pub struct MockFeedback {
    readings: VecDeque<i16>,
    constant: Option<i16>,
    pub reads: usize,
    pub resets: usize,
}

impl MockFeedback {
    pub fn constant(ticks: i16) -> Self {
        Self {
            constant: Some(ticks),
            ..Default::default()
        }
    }

    pub fn sequence(readings: Vec<i16>) -> Self {
        Self {
            readings: readings.into(),
            ..Default::default()
        }
    }
}

impl FeedbackSource for MockFeedback {
    fn read_signed_ticks(&mut self) -> i16 {
        self.reads += 1;
        match self.constant {
            Some(ticks) => ticks,
            None => self.readings.pop_front().unwrap_or(0),
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    SetDuty(Direction, u16),
    Stop,
    Brake,
    Lock,
    Unlock,
}

/// H-bridge recording every call
#[derive(Debug, Default)]
pub struct MockMotor {
    pub events: Vec<MotorEvent>,
}

impl MockMotor {
    pub fn last_duty(&self) -> Option<(Direction, u16)> {
        self.events.iter().rev().find_map(|event| match *event {
            MotorEvent::SetDuty(direction, magnitude) => Some((direction, magnitude)),
            _ => None,
        })
    }
}

impl MotorActuator for MockMotor {
    fn set_duty_cycle(&mut self, direction: Direction, magnitude: u16) {
        self.events.push(MotorEvent::SetDuty(direction, magnitude));
    }

    fn stop(&mut self) {
        self.events.push(MotorEvent::Stop);
    }

    fn brake(&mut self) {
        self.events.push(MotorEvent::Brake);
    }

    fn lock(&mut self) {
        self.events.push(MotorEvent::Lock);
    }

    fn unlock(&mut self) {
        self.events.push(MotorEvent::Unlock);
    }
}

/// CAN controller with one queue per channel
#[derive(Debug, Default)]
pub struct MockBus {
    pub pending: [VecDeque<TestFrame>; 3],
    pub rearmed: Vec<Channel>,
    pub sent: Vec<(u16, Vec<u8>)>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: Channel, frame: TestFrame) {
        self.pending[channel as usize].push_back(frame);
    }
}

impl CommandBus for MockBus {
    type Frame = TestFrame;

    fn try_receive(&mut self, channel: Channel) -> Option<TestFrame> {
        self.pending[channel as usize].pop_front()
    }

    fn send(&mut self, id: StandardId, data: &[u8]) -> bool {
        self.sent.push((id.as_raw(), data.to_vec()));
        true
    }

    fn rearm(&mut self, channel: Channel) {
        self.rearmed.push(channel);
    }
}

#[derive(Debug, Default)]
pub struct MockIndicator {
    pub blinks: Vec<(Led, u32)>,
}

impl StatusIndicator for MockIndicator {
    fn blink(&mut self, led: Led, duration_ms: u32) {
        self.blinks.push((led, duration_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_poll_order() {
        let mut bus = MockBus::new();
        bus.push(Channel::Config, TestFrame::data(0x36, &[1]));
        bus.push(Channel::Speed, TestFrame::data(0x35, &[0, 0, 1]));

        assert_eq!(bus.poll().map(|rx| rx.channel), Some(Channel::Speed));
        assert_eq!(bus.poll().map(|rx| rx.channel), Some(Channel::Config));
        assert!(bus.poll().is_none());
    }

    #[test]
    fn test_apply_brackets_set_duty() {
        let mut motor = MockMotor::default();
        motor.apply(Direction::Clockwise, 100);
        assert_eq!(
            motor.events,
            vec![
                MotorEvent::Lock,
                MotorEvent::SetDuty(Direction::Clockwise, 100),
                MotorEvent::Unlock
            ]
        );
    }

    #[test]
    fn test_power_up_sequence() {
        let mut indicator = MockIndicator::default();
        indicator.power_up_sequence();

        assert_eq!(indicator.blinks.len(), 10);
        assert_eq!(indicator.blinks[0], (Led::Status, 50));
        assert_eq!(indicator.blinks[1], (Led::Fault, 50));
        assert_eq!(indicator.blinks[9], (Led::Fault, 50));
    }
}
