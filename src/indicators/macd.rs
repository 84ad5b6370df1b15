use super::{ema::EMA, Indicator};
use rust_decimal::Decimal;

/// MACD(12,26,9) composed from three `EMA` instances (§4.3). A bullish
/// crossover is `histogram` going from negative to non-negative, equivalent
/// to the MACD line crossing above the signal line.
#[derive(Debug, Clone)]
pub struct MACD {
    fast_ema: EMA,
    slow_ema: EMA,
    signal_ema: EMA,
    macd_line: Option<Decimal>,
    signal_line: Option<Decimal>,
    histogram: Option<Decimal>,
    prev_histogram: Option<Decimal>,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_ema: EMA::new(fast_period),
            slow_ema: EMA::new(slow_period),
            signal_ema: EMA::new(signal_period),
            macd_line: None,
            signal_line: None,
            histogram: None,
            prev_histogram: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(12, 26, 9)
    }

    pub fn update(&mut self, price: Decimal) -> Option<MACDOutput> {
        let fast = self.fast_ema.update(price);
        let slow = self.slow_ema.update(price);

        if let (Some(f), Some(s)) = (fast, slow) {
            let macd_line = f - s;
            self.macd_line = Some(macd_line);

            if let Some(signal) = self.signal_ema.update(macd_line) {
                self.prev_histogram = self.histogram;
                let histogram = macd_line - signal;
                self.signal_line = Some(signal);
                self.histogram = Some(histogram);

                return Some(MACDOutput {
                    macd_line,
                    signal_line: signal,
                    histogram,
                });
            }
        }

        None
    }

    pub fn macd_line(&self) -> Option<Decimal> {
        self.macd_line
    }

    pub fn signal_line(&self) -> Option<Decimal> {
        self.signal_line
    }

    pub fn histogram(&self) -> Option<Decimal> {
        self.histogram
    }

    pub fn is_bullish_crossover(&self) -> bool {
        match (self.histogram, self.prev_histogram) {
            (Some(curr), Some(prev)) => prev < Decimal::ZERO && curr >= Decimal::ZERO,
            _ => false,
        }
    }
}

impl Indicator for MACD {
    fn name(&self) -> &'static str {
        "MACD"
    }

    fn is_ready(&self) -> bool {
        self.histogram.is_some()
    }

    fn reset(&mut self) {
        self.fast_ema.reset();
        self.slow_ema.reset();
        self.signal_ema.reset();
        self.macd_line = None;
        self.signal_line = None;
        self.histogram = None;
        self.prev_histogram = None;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MACDOutput {
    pub macd_line: Decimal,
    pub signal_line: Decimal,
    pub histogram: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn detects_bullish_crossover() {
        let mut macd = MACD::new(2, 4, 2);
        let prices = [dec!(10), dec!(10), dec!(10), dec!(10), dec!(8), dec!(12), dec!(14)];
        let mut crossed = false;
        for p in prices {
            macd.update(p);
            if macd.is_bullish_crossover() {
                crossed = true;
            }
        }
        assert!(crossed);
    }
}
