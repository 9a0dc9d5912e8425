//! Control core of a CAN-commanded DC motor board
//!
//! One board drives one geared DC motor with a quadrature encoder through an H-bridge. A host on
//! the CAN bus sends wheel speeds, PID gains and a configuration word; every control tick the board
//! measures the encoder, decides whether it is safe to drive, and commands a PWM duty.
//!
//! The core is hardware independent: peripherals are reached through the traits in [`traits`],
//! shared state through [`SharedBoard`]. The `g4-motorboard` binary (feature `firmware`) binds it
//! to the STM32G431 board.

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod config;
pub mod control;
pub mod pid;
pub mod protocol;
pub mod state;
pub mod traits;

#[cfg(test)]
mod mock;

pub use config::{BoardConfig, CommandFilter, CommandIds, ConfigError, MotorSide, SpeedLayout};
pub use control::{SafetyDecision, TickReport};
pub use pid::{GainTerm, PidRegulator};
pub use protocol::{BoardStatus, Command, DecodeError};
pub use state::{on_frame, on_tick, publish_status, Board, ControlState, SharedBoard};
pub use traits::{
    Channel, CommandBus, Direction, FeedbackSource, Led, MotorActuator, RxFrame, StatusIndicator,
};
