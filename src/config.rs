//! Board configuration
//!
//! Everything that differs from one motor board to the next (which wheel it drives, which CAN
//! identifiers it answers to, loop limits and gains) is collected into [`BoardConfig`]. The
//! configuration is fixed at construction time; nothing here is mutable over the bus.

use embedded_can::StandardId;
use snafu::Snafu;

/// Control tick period [ms]
pub const DEFAULT_TICK_PERIOD_MS: u32 = 10;

/// Shortest and longest tick period the loop is tuned for [ms]
pub const MIN_TICK_PERIOD_MS: u32 = 10;
pub const MAX_TICK_PERIOD_MS: u32 = 50;

/// RUN ticks without a fresh speed command before the motor is stopped (100 x 10 ms = 1 s)
pub const DEFAULT_WATCHDOG_LIMIT: u32 = 100;

/// Consecutive zero-feedback ticks before the motor is considered stalled or blocked
pub const DEFAULT_FLAT_LIMIT: u16 = 100;

/// Encoder counts per wheel revolution (quadrature x4)
pub const DEFAULT_STEPS_PER_REV: u16 = 1920;

/// Default regulator gains
pub const DEFAULT_KP: f32 = 0.1;
pub const DEFAULT_KI: f32 = 0.0;
pub const DEFAULT_KD: f32 = 0.0;

/// Ticks/period → PWM counts, measured on the bench
pub const DEFAULT_DUTY_GAIN: i32 = 35;

/// PWM counter top, i.e. 100% duty
pub const DEFAULT_MAX_DUTY: u16 = 2048;

/// Status frame every N ticks (10 x 10 ms = 100 ms)
pub const DEFAULT_STATUS_PERIOD_TICKS: u16 = 10;

/// Default command identifiers
pub mod can_ids {
    /// Speed command (3 bytes legacy / 4 bytes two-motor)
    pub const SPEED_CMD: u16 = 0x35;

    /// Configuration word (1 byte, bit0 = PID enable)
    pub const CONFIG_CMD: u16 = 0x36;

    /// PID gain (which: u8, value: f32 big-endian, 5 bytes)
    pub const PID_GAIN: u16 = 0x37;

    /// Board status (6 bytes, outbound)
    pub const STATUS: u16 = 0x38;

    /// All eleven identifier bits significant
    pub const EXACT_MASK: u16 = 0x7FF;
}

/// PWM settings (firmware only)
pub mod pwm {
    /// H-bridge switching frequency [Hz]
    pub const DEFAULT_FREQUENCY_HZ: u32 = 20_000;

    /// Dead time between high and low side
    pub const DEFAULT_DEAD_TIME: u16 = 8;
}

/// CAN settings (firmware only)
pub mod can {
    /// Bitrate (500kbps)
    pub const DEFAULT_BITRATE: u32 = 500_000;
}

/// Which wheel the board drives. Left-hand motors are mounted mirrored, so both the encoder
/// reading and the duty command are negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorSide {
    Right,
    Left,
}

impl MotorSide {
    /// +1 for the right motor, -1 for the left one
    pub const fn sign(self) -> i16 {
        match self {
            MotorSide::Right => 1,
            MotorSide::Left => -1,
        }
    }
}

/// Payload layout expected on the speed channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpeedLayout {
    /// `{direction, speed_hi, speed_lo}`, one board per identifier
    Legacy,
    /// `{a_hi, a_lo, b_hi, b_lo}`, signed speeds for both wheels; A is the right motor
    TwoMotor,
}

impl SpeedLayout {
    /// Exact payload length for this layout
    pub const fn payload_len(self) -> usize {
        match self {
            SpeedLayout::Legacy => 3,
            SpeedLayout::TwoMotor => 4,
        }
    }
}

/// Identifier/mask pair selecting the frames a receive channel accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFilter {
    pub id: u16,
    pub mask: u16,
}

impl CommandFilter {
    /// Filter matching a single identifier
    pub const fn exact(id: u16) -> Self {
        Self {
            id,
            mask: can_ids::EXACT_MASK,
        }
    }

    /// Does `raw` pass this filter?
    pub const fn matches(&self, raw: u16) -> bool {
        (raw & self.mask) == (self.id & self.mask)
    }

    /// True if some identifier passes both filters
    pub const fn overlaps(&self, other: &CommandFilter) -> bool {
        let common = self.mask & other.mask & can_ids::EXACT_MASK;
        (self.id & common) == (other.id & common)
    }
}

/// Identifiers of the three command channels plus the optional status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandIds {
    pub speed: CommandFilter,
    pub gain: CommandFilter,
    pub config: CommandFilter,
    /// Outbound status identifier, `None` keeps the board silent
    pub status: Option<u16>,
}

impl CommandIds {
    pub const DEFAULT: Self = Self {
        speed: CommandFilter::exact(can_ids::SPEED_CMD),
        gain: CommandFilter::exact(can_ids::PID_GAIN),
        config: CommandFilter::exact(can_ids::CONFIG_CMD),
        status: Some(can_ids::STATUS),
    };

    /// Status identifier as a standard CAN id, if enabled and in range
    pub fn status_id(&self) -> Option<StandardId> {
        self.status.and_then(StandardId::new)
    }
}

/// Invalid board configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[snafu(display("Tick period {period_ms} ms outside 10..=50 ms"))]
    TickPeriodOutOfRange { period_ms: u32 },

    #[snafu(display("Steps per revolution must be non-zero"))]
    ZeroStepsPerRev,

    #[snafu(display("Maximum duty must be non-zero"))]
    ZeroMaxDuty,

    #[snafu(display("Command filters overlap, a frame would match two channels"))]
    OverlappingFilters,
}

/// Per-board constants handed to [`crate::Board::new`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardConfig {
    pub tick_period_ms: u32,
    pub watchdog_limit: u32,
    pub flat_limit: u16,
    pub steps_per_rev: u16,
    pub side: MotorSide,
    /// Swaps the H-bridge direction for motors wired the other way round
    pub rotation_default: bool,
    pub ids: CommandIds,
    pub speed_layout: SpeedLayout,
    /// Closed loop from power-up; the config command toggles it afterwards
    pub pid_enabled: bool,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub duty_gain: i32,
    pub max_duty: u16,
    pub status_period_ticks: u16,
}

impl BoardConfig {
    pub const DEFAULT: Self = Self {
        tick_period_ms: DEFAULT_TICK_PERIOD_MS,
        watchdog_limit: DEFAULT_WATCHDOG_LIMIT,
        flat_limit: DEFAULT_FLAT_LIMIT,
        steps_per_rev: DEFAULT_STEPS_PER_REV,
        side: MotorSide::Right,
        rotation_default: false,
        ids: CommandIds::DEFAULT,
        speed_layout: SpeedLayout::Legacy,
        pid_enabled: true,
        kp: DEFAULT_KP,
        ki: DEFAULT_KI,
        kd: DEFAULT_KD,
        duty_gain: DEFAULT_DUTY_GAIN,
        max_duty: DEFAULT_MAX_DUTY,
        status_period_ticks: DEFAULT_STATUS_PERIOD_TICKS,
    };

    pub const fn with_side(mut self, side: MotorSide) -> Self {
        self.side = side;
        self
    }

    pub const fn with_rotation_default(mut self, rotation_default: bool) -> Self {
        self.rotation_default = rotation_default;
        self
    }

    pub const fn with_speed_layout(mut self, layout: SpeedLayout) -> Self {
        self.speed_layout = layout;
        self
    }

    pub const fn with_limits(mut self, watchdog_limit: u32, flat_limit: u16) -> Self {
        self.watchdog_limit = watchdog_limit;
        self.flat_limit = flat_limit;
        self
    }

    pub const fn with_ids(mut self, ids: CommandIds) -> Self {
        self.ids = ids;
        self
    }

    pub const fn with_pid_enabled(mut self, pid_enabled: bool) -> Self {
        self.pid_enabled = pid_enabled;
        self
    }

    pub const fn with_gains(mut self, kp: f32, ki: f32, kd: f32) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    /// Check for combinations the control loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TICK_PERIOD_MS..=MAX_TICK_PERIOD_MS).contains(&self.tick_period_ms) {
            return TickPeriodOutOfRangeSnafu {
                period_ms: self.tick_period_ms,
            }
            .fail();
        }
        if self.steps_per_rev == 0 {
            return ZeroStepsPerRevSnafu.fail();
        }
        if self.max_duty == 0 {
            return ZeroMaxDutySnafu.fail();
        }

        let ids = &self.ids;
        if ids.speed.overlaps(&ids.gain)
            || ids.speed.overlaps(&ids.config)
            || ids.gain.overlaps(&ids.config)
        {
            return OverlappingFiltersSnafu.fail();
        }

        Ok(())
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
