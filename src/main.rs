#![no_std]
#![no_main]

mod encoder_tim;
mod fmt;
mod hardware;
mod motor_driver;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::{
    can,
    gpio::{Level, Output, OutputType, Speed},
    interrupt,
    interrupt::{InterruptExt, Priority},
    time::Hertz,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Timer};
use motorboard::{config, state, MotorActuator, SharedBoard, StatusIndicator};

use encoder_tim::EncoderTim;
use fmt::*;
use hardware::{Irqs, BOARD_CONFIG};
use motor_driver::MotorDriver;
use tasks::{can_task, control_task, heartbeat_task, LedIndicator};

/// 制御タスクとCANタスクが共有するボード状態
static BOARD: SharedBoard = state::shared(BOARD_CONFIG);

/// 制御タスク用の高優先度エグゼキュータ
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    EXECUTOR_HIGH.on_interrupt();
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let p = embassy_stm32::init(hardware::create_clock_config());

    info!("═══════════════════════════════════════════════════");
    info!("   DC Motor Board • STM32G431VB @ 170MHz");
    info!(
        "   side={:?} tick={}ms watchdog={} flat={}",
        BOARD_CONFIG.side,
        BOARD_CONFIG.tick_period_ms,
        BOARD_CONFIG.watchdog_limit,
        BOARD_CONFIG.flat_limit
    );
    info!("═══════════════════════════════════════════════════");

    // PWM初期化（TIM1、Hブリッジ用に2チャネル）
    let mut pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        None,
        None,
        None,
        None,
        Hertz(config::pwm::DEFAULT_FREQUENCY_HZ),
        CountingMode::EdgeAlignedUp,
    );
    pwm.set_dead_time(config::pwm::DEFAULT_DEAD_TIME);

    // 起動直後は必ず停止状態
    let mut motor = MotorDriver::new(pwm, BOARD_CONFIG.max_duty);
    motor.stop();

    if let Err(e) = BOARD_CONFIG.validate() {
        error!("Invalid board configuration: {}", e);
        error!("Control tasks not started, motor stays stopped");
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }

    // LED初期化
    let led_status = Output::new(p.PC13, Level::Low, Speed::Low);
    let led_fault = Output::new(p.PC14, Level::Low, Speed::Low);
    let led_heartbeat = Output::new(p.PC15, Level::Low, Speed::Low);
    let mut leds = LedIndicator::new(led_status, led_fault);

    // 起動確認の点滅（タスク起動前）
    leds.power_up_sequence();
    spawner.spawn(heartbeat_task(led_heartbeat)).unwrap();

    // TIM4エンコーダー初期化
    let encoder = unsafe { EncoderTim::init() };

    // CAN初期化（コマンドIDのみ受信）
    let mut can_configurator = can::CanConfigurator::new(p.FDCAN1, p.PA11, p.PA12, Irqs);
    hardware::configure_can_filters(&mut can_configurator, &BOARD_CONFIG.ids);
    can_configurator.set_bitrate(config::can::DEFAULT_BITRATE);
    let can = can_configurator.start(can::OperatingMode::NormalOperationMode);

    // 制御タスクを高優先度エグゼキュータで起動（CANタスクを割り込める）
    interrupt::UART4.set_priority(Priority::P6);
    let high_spawner = EXECUTOR_HIGH.start(interrupt::UART4);
    high_spawner
        .spawn(control_task(&BOARD, encoder, motor))
        .unwrap();

    // CANタスク起動
    spawner.spawn(can_task(&BOARD, can, leds)).unwrap();

    info!("Motor board ready");

    // メインループ（将来の拡張用）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
