use super::{atr::ATR, bollinger::BollingerBands, ema::EMA, macd::MACD, rsi::RSI, sma, volume::VolumeProfile, Indicator};
use crate::types::Candle;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Full indicator bundle for one symbol/timeframe, recomputed from a
/// contiguous ascending-time candle series on every call (§4.3).
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub sma20: Option<Decimal>,
    pub ema7: Option<Decimal>,
    pub ema14: Option<Decimal>,
    pub ema30: Option<Decimal>,
    pub ema52: Option<Decimal>,
    pub macd: Option<super::macd::MACDOutput>,
    pub recent_golden_cross: bool,
    pub rsi14: Option<Decimal>,
    pub bollinger: Option<super::bollinger::BollingerOutput>,
    pub volume_sma20: Option<Decimal>,
    pub volume_surge: bool,
    pub atr14: Option<Decimal>,
    pub price_anomaly: bool,
    pub technical_score: u32,
}

/// Threshold for the trailing-3 "recent golden cross" window (§4.3).
const GOLDEN_CROSS_LOOKBACK: usize = 3;

fn default_anomaly_threshold_pct() -> Decimal {
    Decimal::from(2)
}

/// Runs the full indicator stack over a candle series and derives the
/// composite `technical_score`. Candles must be in ascending time order.
/// Returns sentinel-missing fields (and `technical_score = 0`) when the
/// series is shorter than the widest indicator's window.
pub fn compute(candles: &[Candle]) -> IndicatorSnapshot {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

    let mut ema7 = EMA::new(7);
    let mut ema14 = EMA::new(14);
    let mut ema30 = EMA::new(30);
    let mut ema52 = EMA::new(52);
    let mut macd = MACD::default_params();
    let mut rsi = RSI::new(14);
    let mut bollinger = BollingerBands::default_params();
    let mut volume_profile = VolumeProfile::new(20);
    let mut atr = ATR::new();

    let mut crossovers: VecDeque<bool> = VecDeque::with_capacity(GOLDEN_CROSS_LOOKBACK);
    let mut macd_out = None;
    let mut bb_out = None;
    let mut vol_avg = None;

    for candle in candles {
        let close = candle.close;
        ema7.update(close);
        ema14.update(close);
        ema30.update(close);
        ema52.update(close);
        macd_out = macd.update(close).or(macd_out);
        rsi.update(close);
        bb_out = bollinger.update(close).or(bb_out);
        vol_avg = volume_profile.update(candle.volume).or(vol_avg);
        atr.update(candle.high, candle.low, close);

        crossovers.push_back(macd.is_bullish_crossover());
        if crossovers.len() > GOLDEN_CROSS_LOOKBACK {
            crossovers.pop_front();
        }
    }

    let recent_golden_cross = crossovers.iter().any(|&c| c);
    let sma20 = sma(&closes, 20);
    let volume_surge = candles
        .last()
        .map(|last| volume_profile.is_surge(last.volume, Decimal::new(15, 1)))
        .unwrap_or(false);
    let price_anomaly = detect_anomaly(&closes, default_anomaly_threshold_pct());

    let last_close = closes.last().copied();
    let above_sma20 = matches!((last_close, sma20), (Some(c), Some(s)) if c > s);
    let above_all_ema = last_close
        .map(|c| {
            [ema7.value(), ema14.value(), ema30.value(), ema52.value()]
                .iter()
                .all(|e| matches!(e, Some(v) if c > *v))
        })
        .unwrap_or(false);
    let rsi_in_band = matches!(rsi.value(), Some(v) if v >= Decimal::from(40) && v <= Decimal::from(70));

    let technical_score = 20 * [above_sma20, recent_golden_cross, above_all_ema, rsi_in_band, volume_surge]
        .iter()
        .filter(|&&v| v)
        .count() as u32;

    IndicatorSnapshot {
        sma20,
        ema7: ema7.value(),
        ema14: ema14.value(),
        ema30: ema30.value(),
        ema52: ema52.value(),
        macd: macd_out,
        recent_golden_cross,
        rsi14: rsi.value(),
        bollinger: bb_out,
        volume_sma20: vol_avg,
        volume_surge,
        atr14: atr.value(),
        price_anomaly,
        technical_score,
    }
}

fn detect_anomaly(closes: &[Decimal], threshold_pct: Decimal) -> bool {
    if closes.len() < 2 {
        return false;
    }
    let last = closes[closes.len() - 1];
    let prev = closes[closes.len() - 2];
    if prev.is_zero() {
        return false;
    }
    ((last / prev) - Decimal::ONE).abs() >= threshold_pct / Decimal::from(100)
}

/// Percentage delta between a ratio now and the same ratio `lookback`
/// candles ago (§4.5e: BTC/ETH price-ratio deltas feeding `beta_score`).
pub fn ratio_change_pct(ratios: &[Decimal], lookback: usize) -> Option<Decimal> {
    if ratios.len() <= lookback {
        return None;
    }
    let now = *ratios.last()?;
    let then = ratios[ratios.len() - 1 - lookback];
    if then.is_zero() {
        return None;
    }
    Some(((now / then) - Decimal::ONE) * Decimal::from(100))
}

/// `beta_score = clamp(((Δratio_BTC + Δratio_ETH)/2)·10, 0, 100)` (§4.5).
pub fn beta_score(delta_ratio_btc: Decimal, delta_ratio_eth: Decimal) -> Decimal {
    let raw = ((delta_ratio_btc + delta_ratio_eth) / Decimal::from(2)) * Decimal::from(10);
    raw.clamp(Decimal::ZERO, Decimal::from(100))
}

/// Step function by 24h quote volume plus a capped surge bonus (§4.5).
pub fn volume_score(quote_volume_24h: Decimal, volume_surge: bool) -> Decimal {
    let base = if quote_volume_24h >= Decimal::from(10_000_000) {
        Decimal::from(100)
    } else if quote_volume_24h >= Decimal::from(5_000_000) {
        Decimal::from(80)
    } else if quote_volume_24h >= Decimal::from(2_000_000) {
        Decimal::from(60)
    } else if quote_volume_24h >= Decimal::from(1_000_000) {
        Decimal::from(40)
    } else {
        Decimal::from(20)
    };
    let bonus = if volume_surge { Decimal::from(20) } else { Decimal::ZERO };
    (base + bonus).min(Decimal::from(100))
}

/// `total_score = 0.3·beta + 0.2·volume + 0.5·technical` (§4.5f).
pub fn total_score(beta: Decimal, volume: Decimal, technical: Decimal) -> Decimal {
    Decimal::new(3, 1) * beta + Decimal::new(2, 1) * volume + Decimal::new(5, 1) * technical
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn technical_score_is_multiple_of_twenty() {
        let closes: Vec<Decimal> = (0..60).map(|i| Decimal::from(100 + i)).collect();
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| crate::types::Candle {
                symbol: crate::types::Symbol::usdt("BTC"),
                timeframe: crate::types::TimeFrame::M5,
                open_time: chrono::Utc::now(),
                close_time: chrono::Utc::now(),
                open: c,
                high: c + Decimal::ONE,
                low: c - Decimal::ONE,
                close: c,
                volume: Decimal::from(1000 + i as i64),
                quote_volume: Decimal::from(100_000),
                trades: 10,
                is_closed: true,
            })
            .collect();
        let snap = compute(&candles);
        assert_eq!(snap.technical_score % 20, 0);
        assert!(snap.technical_score <= 100);
    }

    #[test]
    fn beta_score_clamps_to_0_100() {
        assert_eq!(beta_score(dec!(1000), dec!(1000)), dec!(100));
        assert_eq!(beta_score(dec!(-1000), dec!(-1000)), dec!(0));
    }

    #[test]
    fn volume_score_steps_and_caps_bonus() {
        assert_eq!(volume_score(dec!(12_000_000), false), dec!(100));
        assert_eq!(volume_score(dec!(1_500_000), true), dec!(60));
        assert_eq!(volume_score(dec!(11_000_000), true), dec!(100));
    }

    #[test]
    fn total_score_matches_weighting() {
        let t = total_score(dec!(100), dec!(100), dec!(100));
        assert_eq!(t, dec!(100));
        let t2 = total_score(dec!(0), dec!(0), dec!(100));
        assert_eq!(t2, dec!(50));
    }
}
