// Safety/scheduling state machine, one step per control tick

use crate::fmt::*;
use crate::protocol::BoardStatus;
use crate::state::Board;
use crate::traits::{Direction, FeedbackSource, MotorActuator};

/// Outcome of the per-tick safety evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyDecision {
    /// Regulator reset, zero duty
    Stop,
    /// Drive the motor towards the target
    Run,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    pub decision: SafetyDecision,
    /// Encoder ticks of the last period, side sign applied
    pub measured_ticks: i16,
    /// Signed duty handed to the motor, `-max_duty..=max_duty`
    pub duty: i32,
    /// Status snapshot when a status frame is due
    pub status: Option<BoardStatus>,
}

impl Board {
    /// Run one control period
    ///
    /// Reads and clears the encoder, updates the stall counter, decides STOP/RUN against the
    /// counters as they stood before this tick, then commands the motor.
    pub fn tick(
        &mut self,
        feedback: &mut impl FeedbackSource,
        motor: &mut impl MotorActuator,
    ) -> TickReport {
        let raw = feedback.read_signed_ticks();
        feedback.reset();

        let measured = raw.saturating_mul(self.config.side.sign());
        self.last_measured = measured;

        if measured == 0 {
            self.state.flat_count = self.state.flat_count.saturating_add(1);
        } else {
            self.state.flat_count = 0;
        }

        let decision = self.evaluate();
        let duty = match decision {
            SafetyDecision::Stop => {
                self.pid.reset();
                self.state.command_ticks = 0;
                // Any later speed command is then a new target
                self.state.target_ticks = 0;
                motor.apply(self.direction(0), 0);
                0
            }
            SafetyDecision::Run => {
                self.state.watchdog_count = self.state.watchdog_count.saturating_add(1);

                let command = if self.state.pid_enabled {
                    let correction = self.pid.update(self.state.target_ticks, measured);
                    self.state.command_ticks.saturating_add(correction)
                } else {
                    self.state.command_ticks
                };

                let duty = self.duty(command);
                motor.apply(self.direction(duty), duty.unsigned_abs() as u16);
                duty
            }
        };

        if decision != self.last_decision {
            info!(
                "{:?} -> {:?} (watchdog {}, flat {})",
                self.last_decision, decision, self.state.watchdog_count, self.state.flat_count
            );
            self.last_decision = decision;
        }

        trace!(
            "tick: measured {} target {} duty {}",
            measured,
            self.state.target_ticks,
            duty
        );

        TickReport {
            decision,
            measured_ticks: measured,
            duty,
            status: self.status_due(),
        }
    }

    fn evaluate(&self) -> SafetyDecision {
        let state = &self.state;

        if state.watchdog_count > self.config.watchdog_limit
            || state.target_ticks == 0
            || state.flat_count > self.config.flat_limit
        {
            SafetyDecision::Stop
        } else {
            SafetyDecision::Run
        }
    }

    /// Ticks per period to signed PWM counts
    fn duty(&self, command_ticks: i16) -> i32 {
        let max = self.config.max_duty as i32;
        let duty = (self.config.side.sign() as i32)
            .saturating_mul(self.config.duty_gain)
            .saturating_mul(command_ticks as i32);
        duty.clamp(-max, max)
    }

    fn direction(&self, duty: i32) -> Direction {
        let clockwise = if self.state.rotation_default {
            duty < 0
        } else {
            duty > 0
        };

        if clockwise {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        }
    }

    fn status_due(&mut self) -> Option<BoardStatus> {
        if self.config.ids.status.is_none() || self.config.status_period_ticks == 0 {
            return None;
        }

        self.status_ticks += 1;
        if self.status_ticks < self.config.status_period_ticks {
            return None;
        }
        self.status_ticks = 0;
        Some(self.status())
    }
}
