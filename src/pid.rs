// Incremental PID regulator for the wheel speed loop

/// Regulator term addressed by a gain command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GainTerm {
    Proportional,
    Integral,
    Derivative,
}

/// PID regulator working in encoder ticks per control period.
///
/// Each call adds `kp*e + ki*Σe + kd*Δe` onto a running correction instead of recomputing the
/// output from scratch, so the correction keeps the value it has built up while the error is zero.
pub struct PidRegulator {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Derivative gain
    kd: f32,
    /// Sum of errors since the last reset
    integral: f32,
    /// Error of the previous update
    previous_error: f32,
    /// Running correction
    correction: f32,
}

impl PidRegulator {
    /// Create a new regulator
    ///
    /// # Arguments
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `kd` - Derivative gain
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            previous_error: 0.0,
            correction: 0.0,
        }
    }

    /// Update the regulator
    ///
    /// # Arguments
    /// * `target` - Desired ticks per period
    /// * `measured` - Ticks counted during the last period
    ///
    /// # Returns
    /// Correction in ticks, truncated toward zero and saturated to the `i16` range
    pub fn update(&mut self, target: i16, measured: i16) -> i16 {
        let error = target as f32 - measured as f32;

        self.integral += error;
        self.correction +=
            self.kp * error + self.ki * self.integral + self.kd * (error - self.previous_error);
        self.previous_error = error;

        self.correction as i16
    }

    /// Clear the integral, derivative history and running correction. Gains are kept.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.correction = 0.0;
    }

    pub fn set_kp(&mut self, kp: f32) {
        self.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f32) {
        self.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f32) {
        self.kd = kd;
    }

    /// Replace the gain selected by `term`
    pub fn set_gain(&mut self, term: GainTerm, value: f32) {
        match term {
            GainTerm::Proportional => self.set_kp(value),
            GainTerm::Integral => self.set_ki(value),
            GainTerm::Derivative => self.set_kd(value),
        }
    }

    pub fn kp(&self) -> f32 {
        self.kp
    }

    pub fn ki(&self) -> f32 {
        self.ki
    }

    pub fn kd(&self) -> f32 {
        self.kd
    }

    /// Sum of errors since the last reset
    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Running correction before truncation
    pub fn correction(&self) -> f32 {
        self.correction
    }
}
