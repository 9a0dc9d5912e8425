//! Shared board state and the two handler entry points
//!
//! The tick handler and the bus handler both mutate the same [`Board`]. It lives in a
//! [`SharedBoard`], a critical-section mutex, and each handler takes the lock exactly once for its
//! whole body, so neither can observe the other half way through an update.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{BoardConfig, CommandIds};
use crate::control::{SafetyDecision, TickReport};
use crate::fmt::*;
use crate::pid::PidRegulator;
use crate::protocol::{decode, encode_status, BoardStatus, Command};
use crate::traits::{CommandBus, FeedbackSource, Led, MotorActuator, RxFrame, StatusIndicator};

/// Gain accepted
const GAIN_BLINK_MS: u32 = 10;

/// PID enabled / disabled
const CONFIG_BLINK_MS: u32 = 50;

/// Mutable control variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlState {
    /// Desired ticks per period
    pub target_ticks: i16,
    /// Feed-forward baseline, synchronised to the target on every new speed command
    pub command_ticks: i16,
    /// RUN ticks since the last accepted speed command
    pub watchdog_count: u32,
    /// Consecutive ticks without encoder movement
    pub flat_count: u16,
    pub pid_enabled: bool,
    pub rotation_default: bool,
}

impl ControlState {
    pub const fn new(rotation_default: bool, pid_enabled: bool) -> Self {
        Self {
            target_ticks: 0,
            command_ticks: 0,
            watchdog_count: 0,
            flat_count: 0,
            pid_enabled,
            rotation_default,
        }
    }
}

/// LED feedback requested by an accepted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorCue {
    pub led: Led,
    pub duration_ms: u32,
}

/// Everything the two handlers share
pub struct Board {
    pub(crate) config: BoardConfig,
    pub(crate) state: ControlState,
    pub(crate) pid: PidRegulator,
    pub(crate) last_measured: i16,
    pub(crate) last_decision: SafetyDecision,
    /// Ticks since the last status frame
    pub(crate) status_ticks: u16,
}

impl Board {
    /// Board at power-up: target 0, hence STOP until the first speed command. The PID starts in
    /// the state given by `config.pid_enabled`.
    pub const fn new(config: BoardConfig) -> Self {
        Self {
            config,
            state: ControlState::new(config.rotation_default, config.pid_enabled),
            pid: PidRegulator::new(config.kp, config.ki, config.kd),
            last_measured: 0,
            last_decision: SafetyDecision::Stop,
            status_ticks: 0,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn pid(&self) -> &PidRegulator {
        &self.pid
    }

    /// Decision taken by the most recent tick
    pub fn last_decision(&self) -> SafetyDecision {
        self.last_decision
    }

    /// Apply a decoded command
    ///
    /// # Returns
    /// LED cue to show once the critical section has been left
    pub fn apply_command(&mut self, command: &Command) -> Option<IndicatorCue> {
        match *command {
            Command::Speed(speed) => {
                let ticks = speed.to_ticks(self.config.steps_per_rev, self.config.tick_period_ms);
                self.state.watchdog_count = 0;

                if ticks != self.state.target_ticks {
                    // New target: restart the loop from the feed-forward value
                    self.state.target_ticks = ticks;
                    self.state.command_ticks = ticks;
                    self.state.flat_count = 0;
                    self.pid.reset();
                    debug!("Target {} ticks ({} mrad/s)", ticks, speed.magnitude);
                }
                None
            }
            Command::Gain(gain) => {
                self.pid.reset();
                let term = match gain.term {
                    Some(term) => term,
                    None => {
                        debug!("Unknown gain selector, regulator reset only");
                        return None;
                    }
                };
                self.pid.set_gain(term, gain.value);
                info!("Gain {:?} = {}", term, gain.value);
                Some(IndicatorCue {
                    led: Led::Status,
                    duration_ms: GAIN_BLINK_MS,
                })
            }
            Command::Config(config) => {
                self.state.pid_enabled = config.pid_enabled;
                self.pid.reset();
                info!("PID enabled: {}", config.pid_enabled);
                let led = if config.pid_enabled {
                    Led::Status
                } else {
                    Led::Fault
                };
                Some(IndicatorCue {
                    led,
                    duration_ms: CONFIG_BLINK_MS,
                })
            }
        }
    }

    /// Snapshot for the status frame
    pub fn status(&self) -> BoardStatus {
        BoardStatus {
            measured_ticks: self.last_measured,
            target_ticks: self.state.target_ticks,
            running: self.last_decision == SafetyDecision::Run,
            pid_enabled: self.state.pid_enabled,
            watchdog_count: self.state.watchdog_count.min(u8::MAX as u32) as u8,
        }
    }
}

/// Board shared between the tick and the bus handler
pub type SharedBoard = Mutex<CriticalSectionRawMutex, RefCell<Board>>;

/// Wrap a board for sharing, usable in a `static`
pub const fn shared(config: BoardConfig) -> SharedBoard {
    Mutex::new(RefCell::new(Board::new(config)))
}

/// Tick handler body
pub fn on_tick(
    board: &SharedBoard,
    feedback: &mut impl FeedbackSource,
    motor: &mut impl MotorActuator,
) -> TickReport {
    board.lock(|board| board.borrow_mut().tick(feedback, motor))
}

/// Bus handler body: decode, apply, re-arm the channel
///
/// Invalid frames are dropped silently; the channel is re-armed either way.
pub fn on_frame<B: CommandBus>(
    board: &SharedBoard,
    bus: &mut B,
    rx: RxFrame<B::Frame>,
    indicator: &mut impl StatusIndicator,
) -> Option<Command> {
    let RxFrame { channel, frame } = rx;

    let (command, cue) = board.lock(|board| {
        let mut board = board.borrow_mut();
        let result = match decode(channel, &frame, &board.config) {
            Ok(command) => {
                let cue = board.apply_command(&command);
                (Some(command), cue)
            }
            Err(e) => {
                debug!("Discarded frame on {:?}: {}", channel, e);
                (None, None)
            }
        };
        bus.rearm(channel);
        result
    });

    if let Some(cue) = cue {
        indicator.blink(cue.led, cue.duration_ms);
    }

    command
}

/// Send a status frame if the board has a status identifier
///
/// # Returns
/// `false` if status is disabled or no transmit mailbox was free
pub fn publish_status(bus: &mut impl CommandBus, ids: &CommandIds, status: &BoardStatus) -> bool {
    match ids.status_id() {
        Some(id) => bus.send(id, &encode_status(status)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{can_ids, DEFAULT_STEPS_PER_REV};
    use crate::mock::{MockBus, MockIndicator, TestFrame};
    use crate::pid::GainTerm;
    use crate::protocol::{
        encode_gain_command, GainCommand, SpeedCommand, STATUS_FLAG_PID_ENABLED,
    };
    use crate::traits::Channel;

    fn speed(magnitude: u16, reverse: bool) -> Command {
        Command::Speed(SpeedCommand { magnitude, reverse })
    }

    #[test]
    fn test_new_target_resyncs() {
        let mut board = Board::new(BoardConfig::DEFAULT);
        board.state.flat_count = 40;
        board.state.watchdog_count = 60;
        board.pid.update(10, 0);

        assert_eq!(board.apply_command(&speed(3141, false)), None);

        let state = board.state();
        assert_eq!(state.target_ticks, 10);
        assert_eq!(state.command_ticks, 10);
        assert_eq!(state.watchdog_count, 0);
        assert_eq!(state.flat_count, 0);
        assert_eq!(board.pid().correction(), 0.0);
    }

    #[test]
    fn test_same_target_only_feeds_watchdog() {
        let mut board = Board::new(BoardConfig::DEFAULT);
        board.apply_command(&speed(3141, false));
        board.state.command_ticks = 7;
        board.state.flat_count = 12;
        board.state.watchdog_count = 80;
        board.pid.update(10, 4);
        let correction = board.pid().correction();

        board.apply_command(&speed(3141, false));

        let state = board.state();
        assert_eq!(state.watchdog_count, 0);
        assert_eq!(state.command_ticks, 7);
        assert_eq!(state.flat_count, 12);
        assert_eq!(board.pid().correction(), correction);
    }

    #[test]
    fn test_zero_speed_sets_zero_target() {
        let mut board = Board::new(BoardConfig::DEFAULT);
        board.apply_command(&speed(3141, true));
        assert_eq!(board.state().target_ticks, -10);

        board.apply_command(&speed(0, true));
        assert_eq!(board.state().target_ticks, 0);
        assert_eq!(board.state().command_ticks, 0);
    }

    #[test]
    fn test_gain_then_reset() {
        let mut board = Board::new(BoardConfig::DEFAULT);
        board.pid.update(10, 0);

        let cue = board.apply_command(&Command::Gain(GainCommand {
            term: Some(GainTerm::Integral),
            value: 0.01,
        }));

        assert_eq!(board.pid().ki(), 0.01);
        assert_eq!(board.pid().integral(), 0.0);
        assert_eq!(
            cue,
            Some(IndicatorCue {
                led: Led::Status,
                duration_ms: 10
            })
        );
    }

    #[test]
    fn test_config_toggles_pid() {
        let mut board = Board::new(BoardConfig::DEFAULT);

        let cue = board.apply_command(&Command::Config(crate::protocol::ConfigCommand {
            pid_enabled: true,
        }));
        assert!(board.state().pid_enabled);
        assert_eq!(cue.map(|c| c.led), Some(Led::Status));

        let cue = board.apply_command(&Command::Config(crate::protocol::ConfigCommand {
            pid_enabled: false,
        }));
        assert!(!board.state().pid_enabled);
        assert_eq!(cue.map(|c| c.led), Some(Led::Fault));
    }

    #[test]
    fn test_on_frame_rearms_on_invalid_frame() {
        let board = shared(BoardConfig::DEFAULT);
        let mut bus = MockBus::new();
        let mut indicator = MockIndicator::default();

        // Gain frame one byte short
        let rx = RxFrame {
            channel: Channel::Gain,
            frame: TestFrame::data(can_ids::PID_GAIN, &[1, 0, 0, 0]),
        };
        assert_eq!(on_frame(&board, &mut bus, rx, &mut indicator), None);

        assert_eq!(bus.rearmed, vec![Channel::Gain]);
        assert!(indicator.blinks.is_empty());
        board.lock(|b| assert_eq!(b.borrow().pid().kp(), crate::config::DEFAULT_KP));
    }

    #[test]
    fn test_unknown_gain_selector_resets_regulator() {
        let mut board = Board::new(BoardConfig::DEFAULT.with_gains(1.0, 0.0, 0.0));
        board.apply_command(&speed(3141, false));
        board.pid.update(10, 4);
        assert_eq!(board.pid().correction(), 6.0);

        let cue = board.apply_command(&Command::Gain(GainCommand {
            term: None,
            value: 0.5,
        }));

        assert_eq!(cue, None);
        assert_eq!(board.pid().correction(), 0.0);
        assert_eq!(board.pid().kp(), 1.0);
        assert_eq!(board.pid().ki(), 0.0);
        assert_eq!(board.pid().kd(), 0.0);
    }

    #[test]
    fn test_on_frame_applies_gain_and_blinks() {
        let board = shared(BoardConfig::DEFAULT);
        let mut bus = MockBus::new();
        let mut indicator = MockIndicator::default();

        let data = encode_gain_command(&GainCommand {
            term: Some(GainTerm::Proportional),
            value: 0.5,
        });
        let rx = RxFrame {
            channel: Channel::Gain,
            frame: TestFrame::data(can_ids::PID_GAIN, &data),
        };
        assert!(matches!(
            on_frame(&board, &mut bus, rx, &mut indicator),
            Some(Command::Gain(_))
        ));

        assert_eq!(bus.rearmed, vec![Channel::Gain]);
        assert_eq!(indicator.blinks, vec![(Led::Status, 10)]);
        board.lock(|b| assert_eq!(b.borrow().pid().kp(), 0.5));
    }

    #[test]
    fn test_speed_uses_configured_steps() {
        let mut config = BoardConfig::DEFAULT;
        config.steps_per_rev = DEFAULT_STEPS_PER_REV * 2;
        let mut board = Board::new(config);

        board.apply_command(&speed(3141, false));
        assert_eq!(board.state().target_ticks, 19);
    }

    #[test]
    fn test_publish_status() {
        let mut bus = MockBus::new();
        let board = Board::new(BoardConfig::DEFAULT);

        assert!(publish_status(&mut bus, &CommandIds::DEFAULT, &board.status()));
        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].0, can_ids::STATUS);
        // Stopped, PID on from power-up
        assert_eq!(bus.sent[0].1, vec![0, 0, 0, 0, STATUS_FLAG_PID_ENABLED, 0]);

        let mut silent = CommandIds::DEFAULT;
        silent.status = None;
        assert!(!publish_status(&mut bus, &silent, &board.status()));
        assert_eq!(bus.sent.len(), 1);
    }
}
