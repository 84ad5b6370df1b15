use super::Indicator;
use rust_decimal::Decimal;

/// Average true range as an EMA of the true range with a fixed smoothing
/// `α = 2/15` (§4.3), seeded with the first true range rather than a
/// simple-mean warm-up, mirroring `EMA`'s seeding rule.
#[derive(Debug, Clone)]
pub struct ATR {
    multiplier: Decimal,
    prev_close: Option<Decimal>,
    value: Option<Decimal>,
}

impl ATR {
    pub fn new() -> Self {
        Self {
            multiplier: Decimal::from(2) / Decimal::from(15),
            prev_close: None,
            value: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let tr = self.true_range(high, low);
        self.prev_close = Some(close);

        self.value = Some(match self.value {
            None => tr,
            Some(prev) => (tr - prev) * self.multiplier + prev,
        });
        self.value
    }

    fn true_range(&self, high: Decimal, low: Decimal) -> Decimal {
        let hl = high - low;
        match self.prev_close {
            Some(prev_close) => {
                let hc = (high - prev_close).abs();
                let lc = (low - prev_close).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

impl Default for ATR {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator for ATR {
    fn name(&self) -> &'static str {
        "ATR"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_update_seeds_with_true_range() {
        let mut atr = ATR::new();
        let v = atr.update(dec!(110), dec!(100), dec!(105)).unwrap();
        assert_eq!(v, dec!(10));
    }

    #[test]
    fn subsequent_update_applies_two_over_fifteen_smoothing() {
        let mut atr = ATR::new();
        atr.update(dec!(110), dec!(100), dec!(105));
        let v = atr.update(dec!(115), dec!(108), dec!(112)).unwrap();
        let tr2 = dec!(115) - dec!(105); // |high-prev_close| is the widest range
        let expected = dec!(10) + (tr2 - dec!(10)) * (dec!(2) / dec!(15));
        assert_eq!(v, expected);
    }
}
