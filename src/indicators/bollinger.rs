use super::{sma, stddev, Indicator};
use rust_decimal::Decimal;

/// Bollinger Bands with a population-stddev window (§4.3: Bollinger₂₀,₂).
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: Decimal,
    prices: Vec<Decimal>,
    upper: Option<Decimal>,
    middle: Option<Decimal>,
    lower: Option<Decimal>,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: Decimal) -> Self {
        Self {
            period,
            std_dev_multiplier,
            prices: Vec::with_capacity(period),
            upper: None,
            middle: None,
            lower: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(20, Decimal::from(2))
    }

    pub fn update(&mut self, price: Decimal) -> Option<BollingerOutput> {
        self.prices.push(price);
        if self.prices.len() > self.period {
            self.prices.remove(0);
        }

        if self.prices.len() < self.period {
            return None;
        }

        let middle = sma(&self.prices, self.period)?;
        let std_dev = stddev(&self.prices, self.period)?;

        let deviation = std_dev * self.std_dev_multiplier;
        let upper = middle + deviation;
        let lower = middle - deviation;

        self.upper = Some(upper);
        self.middle = Some(middle);
        self.lower = Some(lower);

        Some(BollingerOutput { upper, middle, lower })
    }

    pub fn upper(&self) -> Option<Decimal> {
        self.upper
    }

    pub fn middle(&self) -> Option<Decimal> {
        self.middle
    }

    pub fn lower(&self) -> Option<Decimal> {
        self.lower
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &'static str {
        "BollingerBands"
    }

    fn is_ready(&self) -> bool {
        self.middle.is_some()
    }

    fn reset(&mut self) {
        self.prices.clear();
        self.upper = None;
        self.middle = None;
        self.lower = None;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BollingerOutput {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn flat_prices_give_zero_width_bands() {
        let mut bb = BollingerBands::new(5, Decimal::from(2));
        let mut out = None;
        for _ in 0..5 {
            out = bb.update(dec!(100));
        }
        let out = out.unwrap();
        assert_eq!(out.upper, dec!(100));
        assert_eq!(out.lower, dec!(100));
    }
}
