//! Interfaces to the board peripherals the control core drives.
//!
//! The core never touches registers; the firmware implements these traits for the real encoder,
//! H-bridge, CAN controller and LEDs, and the tests implement them with recording mocks.

use embedded_can::StandardId;

/// Rotation sense handed to the H-bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

/// Receive mailbox, one per command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Speed,
    Gain,
    Config,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Speed, Channel::Gain, Channel::Config];
}

/// Status LEDs on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Led {
    /// Yellow
    Status,
    /// Red
    Fault,
}

/// A frame as delivered by a receive channel
#[derive(Debug, Clone)]
pub struct RxFrame<F> {
    pub channel: Channel,
    pub frame: F,
}

/// Incremental wheel encoder
pub trait FeedbackSource {
    /// Counts accumulated since the last [`reset`](Self::reset)
    fn read_signed_ticks(&mut self) -> i16;

    fn reset(&mut self);
}

/// H-bridge driving the DC motor.
///
/// The driver latches new settings only between [`lock`](Self::lock) and
/// [`unlock`](Self::unlock); a direction change and its duty must land in the same PWM period.
pub trait MotorActuator {
    /// Set direction and duty, `magnitude` in `0..=max_duty`
    fn set_duty_cycle(&mut self, direction: Direction, magnitude: u16);

    /// Open all switches (coast)
    fn stop(&mut self);

    /// Close both low-side switches
    fn brake(&mut self);

    fn lock(&mut self);

    fn unlock(&mut self);

    /// Set direction and duty as one atomic update
    fn apply(&mut self, direction: Direction, magnitude: u16) {
        self.lock();
        self.set_duty_cycle(direction, magnitude);
        self.unlock();
    }
}

/// CAN controller with one filtered receive mailbox per [`Channel`]
pub trait CommandBus {
    type Frame: embedded_can::Frame;

    /// Pending frame on `channel`, if any
    fn try_receive(&mut self, channel: Channel) -> Option<Self::Frame>;

    /// Queue a data frame, returns `false` if no transmit mailbox was free
    fn send(&mut self, id: StandardId, data: &[u8]) -> bool;

    /// Clear the pending flag of `channel` and make it ready for the next frame
    fn rearm(&mut self, channel: Channel);

    /// Next pending frame on any channel, in channel priority order
    fn poll(&mut self) -> Option<RxFrame<Self::Frame>> {
        Channel::ALL.iter().find_map(|&channel| {
            self.try_receive(channel)
                .map(|frame| RxFrame { channel, frame })
        })
    }
}

/// Blinks per LED in the power-up sequence
pub const POWER_UP_BLINKS: usize = 5;

/// On time of each power-up blink [ms]
pub const POWER_UP_BLINK_MS: u32 = 50;

/// Status LEDs. `blink` may busy-wait for the duration; callers treat it as fire-and-forget.
pub trait StatusIndicator {
    fn blink(&mut self, led: Led, duration_ms: u32);

    /// "Alive" sequence shown once before the handlers start
    fn power_up_sequence(&mut self) {
        for _ in 0..POWER_UP_BLINKS {
            self.blink(Led::Status, POWER_UP_BLINK_MS);
            self.blink(Led::Fault, POWER_UP_BLINK_MS);
        }
    }
}
