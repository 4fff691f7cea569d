use serde::{Deserialize, Serialize};

/// Simple moving average of the closes with bands `multiplier` population
/// standard deviations away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub period: usize,
    pub multiplier: f64,
}

impl Default for Bollinger {
    fn default() -> Self {
        Self { period: 20, multiplier: 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bollinger {
    pub fn compute(&self, closes: &[f64]) -> Option<BollingerBand> {
        if self.period == 0 || closes.len() < self.period {
            return None;
        }
        let window = &closes[closes.len() - self.period..];
        let n = self.period as f64;
        let middle = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / n;
        let width = variance.sqrt() * self.multiplier;
        Some(BollingerBand { upper: middle + width, middle, lower: middle - width })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_are_two_deviations_wide() {
        let bands = Bollinger { period: 8, multiplier: 2.0 };
        let band = bands.compute(&[100.0, 2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(band, BollingerBand { upper: 9.0, middle: 5.0, lower: 1.0 });
    }

    #[test]
    fn flat_closes_collapse_the_bands() {
        let band = Bollinger::default().compute(&[3.0; 20]).unwrap();
        assert_eq!(band.upper, band.lower);
        assert!(Bollinger::default().compute(&[3.0; 19]).is_none());
    }
}
