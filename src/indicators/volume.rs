use super::{sma, Indicator};
use rust_decimal::Decimal;

/// Rolling volume SMA used to detect a volume surge (§4.3:
/// `volume_surge = current_volume > 1.5 · volumeSMA20`).
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    period: usize,
    volumes: Vec<Decimal>,
    avg_volume: Option<Decimal>,
}

impl VolumeProfile {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            volumes: Vec::with_capacity(period),
            avg_volume: None,
        }
    }

    pub fn update(&mut self, volume: Decimal) -> Option<Decimal> {
        self.volumes.push(volume);
        if self.volumes.len() > self.period {
            self.volumes.remove(0);
        }

        if self.volumes.len() >= self.period {
            self.avg_volume = sma(&self.volumes, self.period);
        }

        self.avg_volume
    }

    pub fn avg_volume(&self) -> Option<Decimal> {
        self.avg_volume
    }

    pub fn relative_volume(&self, current_volume: Decimal) -> Option<Decimal> {
        self.avg_volume.map(|avg| {
            if avg.is_zero() {
                Decimal::ONE
            } else {
                current_volume / avg
            }
        })
    }

    pub fn is_surge(&self, current_volume: Decimal, threshold: Decimal) -> bool {
        self.relative_volume(current_volume)
            .map(|rv| rv > threshold)
            .unwrap_or(false)
    }
}

impl Indicator for VolumeProfile {
    fn name(&self) -> &'static str {
        "VolumeProfile"
    }

    fn is_ready(&self) -> bool {
        self.avg_volume.is_some()
    }

    fn reset(&mut self) {
        self.volumes.clear();
        self.avg_volume = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn surge_detected_above_one_point_five_times_average() {
        let mut vp = VolumeProfile::new(3);
        for v in [dec!(100), dec!(100), dec!(100)] {
            vp.update(v);
        }
        assert!(vp.is_surge(dec!(151), dec!(1.5)));
        assert!(!vp.is_surge(dec!(140), dec!(1.5)));
    }
}
