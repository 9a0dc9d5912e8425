//! ハードウェア初期化モジュール
//!
//! クロック設定、割り込みバインド、CANフィルタ設定を集約します。

use embassy_stm32::{
    bind_interrupts, can,
    can::filter::{
        Action, ExtendedFilter, ExtendedFilterSlot, FilterType, StandardFilter, StandardFilterSlot,
    },
    peripherals, Config,
};
use motorboard::{BoardConfig, CommandIds, MotorSide};

use crate::fmt::*;

// CANの割り込みをバインド
bind_interrupts!(pub struct Irqs {
    FDCAN1_IT0 => can::IT0InterruptHandler<peripherals::FDCAN1>;
    FDCAN1_IT1 => can::IT1InterruptHandler<peripherals::FDCAN1>;
});

/// このボードの設定
///
/// 左輪用ボードは `MotorSide::Left` に変更して書き込む
pub const BOARD_CONFIG: BoardConfig = BoardConfig::DEFAULT
    .with_side(MotorSide::Right)
    .with_rotation_default(false);

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{ClockMux, Fdcansel};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllQDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: Some(PllQDiv::DIV2), // FDCANクロック用
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;

        let mut clock_mux = ClockMux::default();
        clock_mux.fdcansel = Fdcansel::PLL1_Q;
        config.rcc.mux = clock_mux;
    }
    config
}

/// コマンド3チャネル分の受信フィルタを設定
///
/// 一致したフレームのみFIFO0へ格納し、拡張IDはすべて破棄する
pub fn configure_can_filters(configurator: &mut can::CanConfigurator<'static>, ids: &CommandIds) {
    let slots = [
        (StandardFilterSlot::_0, ids.speed),
        (StandardFilterSlot::_1, ids.gain),
        (StandardFilterSlot::_2, ids.config),
    ];

    for (slot, filter) in slots {
        configurator.properties().set_standard_filter(
            slot,
            StandardFilter {
                filter: FilterType::BitMask {
                    filter: filter.id,
                    mask: filter.mask,
                },
                action: Action::StoreInFifo0,
            },
        );
        debug!("CAN filter: id=0x{:03X} mask=0x{:03X}", filter.id, filter.mask);
    }

    configurator
        .properties()
        .set_extended_filter(ExtendedFilterSlot::_0, ExtendedFilter::reject_all());

    // フィルタに一致しないフレームは受信しない
    let config = configurator
        .config()
        .set_global_filter(can::config::GlobalFilter::reject_all());
    configurator.set_config(config);
}
