//! Hブリッジモータードライバー
//!
//! TIM1の相補PWM 2チャネルでフルブリッジを構成し、DCモーターを駆動します。
//! - CH1 (PE9/PE8): A側ハーフブリッジ
//! - CH2 (PE11/PE10): B側ハーフブリッジ
//!
//! 正転はA側のみPWM、逆転はB側のみPWM。PWMしない側はDuty 0でローサイドON。

use embassy_stm32::{
    pac, peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use motorboard::{Direction, MotorActuator};

/// DCモータードライバー
pub struct MotorDriver {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    /// PWMの最大Duty値（タイマーARR）
    pwm_max: u16,
    /// 制御側のDuty上限（これがpwm_maxに対応する）
    command_max: u16,
    enabled: bool,
}

impl MotorDriver {
    /// 新しいモータードライバーを作成
    ///
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1）
    /// * `command_max` - `set_duty_cycle` に渡される最大値
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>, command_max: u16) -> Self {
        let pwm_max = pwm.get_max_duty();
        Self {
            pwm,
            pwm_max,
            command_max,
            enabled: false,
        }
    }

    /// 制御側のDutyをタイマーのカウントに換算
    fn scale(&self, magnitude: u16) -> u16 {
        let magnitude = magnitude.min(self.command_max) as u32;
        (magnitude * self.pwm_max as u32 / self.command_max.max(1) as u32) as u16
    }

    fn enable_outputs(&mut self) {
        if !self.enabled {
            self.pwm.enable(Channel::Ch1);
            self.pwm.enable(Channel::Ch2);
            self.enabled = true;
        }
    }
}

impl MotorActuator for MotorDriver {
    fn set_duty_cycle(&mut self, direction: Direction, magnitude: u16) {
        let duty = self.scale(magnitude);
        let (duty_a, duty_b) = match direction {
            Direction::Clockwise => (duty, 0),
            Direction::CounterClockwise => (0, duty),
        };

        self.pwm.set_duty(Channel::Ch1, duty_a);
        self.pwm.set_duty(Channel::Ch2, duty_b);
        self.enable_outputs();
    }

    /// 全スイッチOFF（惰性回転）
    fn stop(&mut self) {
        self.pwm.set_duty(Channel::Ch1, 0);
        self.pwm.set_duty(Channel::Ch2, 0);
        self.pwm.disable(Channel::Ch1);
        self.pwm.disable(Channel::Ch2);
        self.enabled = false;
    }

    /// 両ローサイドON（短絡ブレーキ）
    fn brake(&mut self) {
        self.pwm.set_duty(Channel::Ch1, 0);
        self.pwm.set_duty(Channel::Ch2, 0);
        self.enable_outputs();
    }

    /// UDIS=1: CCRプリロード値を次の更新イベントで転送しない
    fn lock(&mut self) {
        pac::TIM1.cr1().modify(|w| w.set_udis(true));
    }

    /// UDIS=0: 2チャネル分の新しいDutyを同じ周期で反映
    fn unlock(&mut self) {
        pac::TIM1.cr1().modify(|w| w.set_udis(false));
    }
}
