use super::Indicator;
use rust_decimal::Decimal;

/// Exponentially weighted moving average, `α = 2/(period+1)`, seeded with
/// the first observed close rather than an SMA warm-up (§4.3).
#[derive(Debug, Clone)]
pub struct EMA {
    period: usize,
    multiplier: Decimal,
    value: Option<Decimal>,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2) / Decimal::from(period as u32 + 1);
        Self {
            period,
            multiplier,
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.value = Some(match self.value {
            None => price,
            Some(prev) => (price - prev) * self.multiplier + prev,
        });
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for EMA {
    fn name(&self) -> &'static str {
        "EMA"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

pub fn calculate_ema_series(prices: &[Decimal], period: usize) -> Vec<Decimal> {
    let mut ema = EMA::new(period);
    prices.iter().filter_map(|p| ema.update(*p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn seeds_with_first_close() {
        let mut ema = EMA::new(9);
        assert_eq!(ema.update(dec!(100)), Some(dec!(100)));
    }

    #[test]
    fn applies_multiplier_on_subsequent_updates() {
        let mut ema = EMA::new(9); // multiplier = 0.2
        ema.update(dec!(100));
        let next = ema.update(dec!(110)).unwrap();
        assert_eq!(next, dec!(100) + (dec!(110) - dec!(100)) * dec!(0.2));
    }
}
