// CAN command protocol of the motor board
//
// Inbound (host -> board), identifiers from `BoardConfig::ids`:
//   speed   3 bytes  {direction, speed_hi, speed_lo}           unsigned mrad/s, direction != 0 = reverse
//           4 bytes  {a_hi, a_lo, b_hi, b_lo}                   signed mrad/s, A = right, B = left motor
//   gain    5 bytes  {which (1=P, 2=I, 3=D, other = none), f32 big-endian}
//   config  1 byte   {bit0 = PID enable}
//
// Outbound (board -> host):
//   status  6 bytes  {measured i16 BE, target i16 BE, flags, watchdog}

use core::f32::consts::PI;

use embedded_can::{Frame, Id};
use snafu::Snafu;

use crate::config::{BoardConfig, MotorSide, SpeedLayout};
use crate::pid::GainTerm;
use crate::traits::Channel;

/// Payload length of a gain command
pub const GAIN_PAYLOAD_LEN: usize = 5;

/// Payload length of a configuration command
pub const CONFIG_PAYLOAD_LEN: usize = 1;

/// Payload length of the status frame
pub const STATUS_PAYLOAD_LEN: usize = 6;

/// Configuration word bit enabling the PID loop
pub const CONFIG_PID_ENABLE: u8 = 0x01;

/// Status flag bits
pub const STATUS_FLAG_RUNNING: u8 = 0x01;
pub const STATUS_FLAG_PID_ENABLED: u8 = 0x02;

/// Requested wheel speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedCommand {
    /// Speed magnitude [mrad/s]
    pub magnitude: u16,
    /// Drive backwards
    pub reverse: bool,
}

impl SpeedCommand {
    /// Convert to encoder ticks per control period.
    ///
    /// `ticks = round(mrad/s * steps_per_rev * period_s / (2π * 1000))`, negated for reverse. A zero
    /// magnitude is always 0 ticks whatever the direction. Out-of-range results saturate.
    pub fn to_ticks(&self, steps_per_rev: u16, tick_period_ms: u32) -> i16 {
        if self.magnitude == 0 {
            return 0;
        }

        let steps_per_period = steps_per_rev as f32 * tick_period_ms as f32 / 1000.0;
        let ticks = libm::roundf(self.magnitude as f32 * steps_per_period / (2.0 * PI * 1000.0));
        let ticks = ticks as i16;

        if self.reverse {
            -ticks
        } else {
            ticks
        }
    }
}

/// New regulator gain
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GainCommand {
    /// `None` for an unknown selector: no gain changes but the regulator is still reset
    pub term: Option<GainTerm>,
    pub value: f32,
}

/// Configuration word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigCommand {
    pub pid_enabled: bool,
}

/// A validated inbound frame
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Speed(SpeedCommand),
    Gain(GainCommand),
    Config(ConfigCommand),
}

/// Reason a frame was discarded. Never reported on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    #[snafu(display("Identifier 0x{id:03X} does not match the channel filter"))]
    UnexpectedId { id: u16 },

    #[snafu(display("Extended identifier 0x{id:08X} on a standard-id channel"))]
    ExtendedId { id: u32 },

    #[snafu(display("Remote frame on a data channel"))]
    RemoteFrame,

    #[snafu(display("Invalid data length {actual}, expected {expected}"))]
    WrongLength { expected: usize, actual: usize },

    #[snafu(display("Gain value is not finite"))]
    NonFiniteGain,
}

/// Validate `frame` against the filter and payload layout of `channel` and decode it.
pub fn decode<F: Frame>(
    channel: Channel,
    frame: &F,
    config: &BoardConfig,
) -> Result<Command, DecodeError> {
    let raw_id = match frame.id() {
        Id::Standard(id) => id.as_raw(),
        Id::Extended(id) => return ExtendedIdSnafu { id: id.as_raw() }.fail(),
    };

    let filter = match channel {
        Channel::Speed => config.ids.speed,
        Channel::Gain => config.ids.gain,
        Channel::Config => config.ids.config,
    };
    if !filter.matches(raw_id) {
        return UnexpectedIdSnafu { id: raw_id }.fail();
    }
    if frame.is_remote_frame() {
        return RemoteFrameSnafu.fail();
    }

    let data = frame.data();
    match channel {
        Channel::Speed => {
            parse_speed_command(data, config.speed_layout, config.side).map(Command::Speed)
        }
        Channel::Gain => parse_gain_command(data).map(Command::Gain),
        Channel::Config => parse_config_command(data).map(Command::Config),
    }
}

fn expect_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() != expected {
        return WrongLengthSnafu {
            expected,
            actual: data.len(),
        }
        .fail();
    }
    Ok(())
}

/// Parse a speed payload
///
/// # Arguments
/// * `data` - CAN frame data
/// * `layout` - Payload layout configured for this board
/// * `side` - Selects this board's half of a two-motor payload
pub fn parse_speed_command(
    data: &[u8],
    layout: SpeedLayout,
    side: MotorSide,
) -> Result<SpeedCommand, DecodeError> {
    expect_len(data, layout.payload_len())?;

    let command = match layout {
        SpeedLayout::Legacy => SpeedCommand {
            magnitude: u16::from_be_bytes([data[1], data[2]]),
            reverse: data[0] != 0,
        },
        SpeedLayout::TwoMotor => {
            let offset = match side {
                MotorSide::Right => 0,
                MotorSide::Left => 2,
            };
            let speed = i16::from_be_bytes([data[offset], data[offset + 1]]);
            SpeedCommand {
                magnitude: speed.unsigned_abs(),
                reverse: speed < 0,
            }
        }
    };

    Ok(command)
}

/// Parse a gain payload (selector byte followed by a big-endian f32)
pub fn parse_gain_command(data: &[u8]) -> Result<GainCommand, DecodeError> {
    expect_len(data, GAIN_PAYLOAD_LEN)?;

    let term = match data[0] {
        1 => Some(GainTerm::Proportional),
        2 => Some(GainTerm::Integral),
        3 => Some(GainTerm::Derivative),
        _ => None,
    };

    let value = f32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if !value.is_finite() {
        return NonFiniteGainSnafu.fail();
    }

    Ok(GainCommand { term, value })
}

/// Parse a configuration word
pub fn parse_config_command(data: &[u8]) -> Result<ConfigCommand, DecodeError> {
    expect_len(data, CONFIG_PAYLOAD_LEN)?;

    Ok(ConfigCommand {
        pid_enabled: data[0] & CONFIG_PID_ENABLE != 0,
    })
}

/// Encode a speed command in the legacy 3-byte layout
pub fn encode_speed_command(command: &SpeedCommand) -> [u8; 3] {
    let [hi, lo] = command.magnitude.to_be_bytes();
    [command.reverse as u8, hi, lo]
}

/// Encode signed speeds for both wheels in the 4-byte layout
pub fn encode_two_motor_speed(right_mrad_s: i16, left_mrad_s: i16) -> [u8; 4] {
    let [a_hi, a_lo] = right_mrad_s.to_be_bytes();
    let [b_hi, b_lo] = left_mrad_s.to_be_bytes();
    [a_hi, a_lo, b_hi, b_lo]
}

/// Encode a gain command
pub fn encode_gain_command(command: &GainCommand) -> [u8; GAIN_PAYLOAD_LEN] {
    let which = match command.term {
        Some(GainTerm::Proportional) => 1,
        Some(GainTerm::Integral) => 2,
        Some(GainTerm::Derivative) => 3,
        None => 0,
    };
    let value = command.value.to_be_bytes();
    [which, value[0], value[1], value[2], value[3]]
}

/// Board status published on the status identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardStatus {
    pub measured_ticks: i16,
    pub target_ticks: i16,
    pub running: bool,
    pub pid_enabled: bool,
    /// Ticks since the last accepted speed command, capped at 255 on the wire
    pub watchdog_count: u8,
}

/// Encode board status into CAN data
pub fn encode_status(status: &BoardStatus) -> [u8; STATUS_PAYLOAD_LEN] {
    let mut data = [0u8; STATUS_PAYLOAD_LEN];

    data[0..2].copy_from_slice(&status.measured_ticks.to_be_bytes());
    data[2..4].copy_from_slice(&status.target_ticks.to_be_bytes());

    let mut flags = 0u8;
    if status.running {
        flags |= STATUS_FLAG_RUNNING;
    }
    if status.pid_enabled {
        flags |= STATUS_FLAG_PID_ENABLED;
    }
    data[4] = flags;
    data[5] = status.watchdog_count;

    data
}

/// Decode board status from CAN data
///
/// # Returns
/// * `None` if data length is incorrect
pub fn decode_status(data: &[u8]) -> Option<BoardStatus> {
    if data.len() != STATUS_PAYLOAD_LEN {
        return None;
    }

    Some(BoardStatus {
        measured_ticks: i16::from_be_bytes([data[0], data[1]]),
        target_ticks: i16::from_be_bytes([data[2], data[3]]),
        running: data[4] & STATUS_FLAG_RUNNING != 0,
        pid_enabled: data[4] & STATUS_FLAG_PID_ENABLED != 0,
        watchdog_count: data[5],
    })
}
