//! TIM4ベースのエンコーダーインターフェース実装
//!
//! STM32のEncoder Interface Mode（x4逓倍）で2相エンコーダーを直接カウントします。
//! 制御周期ごとにカウンタを読み取り、その場で0に戻すことで「前回からの移動量」を得ます。
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): エンコーダーA相
//! - TIM4_CH2 (PB7): エンコーダーB相
//! - カウンタ: 16bit、ARR=0xFFFF（符号付きとして読む）

use embassy_stm32::pac;
use motorboard::FeedbackSource;

/// TIM4エンコーダー
///
/// レジスタはPAC経由で直接操作する。インスタンスは制御タスクだけが所有する。
pub struct EncoderTim {
    _private: (),
}

impl EncoderTim {
    /// TIM4 Encoder Interface の初期化
    ///
    /// # Safety
    /// PACを使用した直接的なレジスタ操作を含むため、unsafe。
    /// TIM4とPB6/PB7を他で使用していないこと。
    pub unsafe fn init() -> Self {
        let rcc = pac::RCC;
        let tim4 = pac::TIM4;
        let gpiob = pac::GPIOB;

        // 1. クロック有効化
        rcc.ahb2enr().modify(|w| w.set_gpioben(true)); // GPIOB
        rcc.apb1enr1().modify(|w| w.set_tim4en(true)); // TIM4

        // 2. GPIO設定（PB6/PB7をAlternate Function AF2、プルアップ有効）
        for pin in [6, 7] {
            gpiob
                .moder()
                .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
            gpiob.afr(0).modify(|w| w.set_afr(pin, 2)); // AF2 (AFRL)
            gpiob
                .pupdr()
                .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::PULL_UP)); // オープンコレクタ出力のエンコーダー用
        }

        // 3. TIM4設定
        tim4.cr1().modify(|w| w.set_cen(false));
        tim4.psc().write_value(0);
        tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

        // 4. 入力設定: IC1 -> TI1、IC2 -> TI2、8サイクルフィルタ
        // 注: CCS=0b01は直結入力（PACの名前はTI4だがCH1ではTI1を意味する）
        tim4.ccmr_input(0).modify(|w| {
            w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4);
            w.set_ccs(1, pac::timer::vals::CcmrInputCcs::TI4);
            w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
            w.set_icf(1, pac::timer::vals::FilterValue::FCK_INT_N8);
        });

        // 極性反転なし、両チャネル有効
        tim4.ccer().modify(|w| {
            w.set_ccp(0, false);
            w.set_ccp(1, false);
            w.set_cce(0, true);
            w.set_cce(1, true);
        });

        // 5. Encoder Mode 3: TI1とTI2の両エッジでカウント（x4）
        tim4.smcr()
            .modify(|w| w.set_sms(pac::timer::vals::Sms::ENCODER_MODE_3));

        // 6. カウンタをリセットしてタイマー開始
        tim4.cnt().write_value(pac::timer::regs::CntCore(0));
        tim4.sr().write(|w| w.0 = 0);
        tim4.cr1().modify(|w| w.set_cen(true));

        Self { _private: () }
    }
}

impl FeedbackSource for EncoderTim {
    /// 前回リセットからのカウント（16bitラップを符号付きで解釈）
    fn read_signed_ticks(&mut self) -> i16 {
        pac::TIM4.cnt().read().cnt() as u16 as i16
    }

    fn reset(&mut self) {
        pac::TIM4.cnt().write_value(pac::timer::regs::CntCore(0));
    }
}
