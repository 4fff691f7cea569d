/// Relative Strength Index with Wilder smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rsi {
    pub period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    /// RSI of the latest close, `None` until there are `period + 1` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        let period = self.period.max(1);
        if closes.len() < period + 1 {
            return None;
        }

        let mut changes = closes.windows(2).map(|w| w[1] - w[0]);
        let (mut gain, mut loss) = changes
            .by_ref()
            .take(period)
            .fold((0.0, 0.0), |(g, l), c| if c > 0.0 { (g + c, l) } else { (g, l - c) });
        gain /= period as f64;
        loss /= period as f64;

        let smoothing = (period - 1) as f64;
        for change in changes {
            gain = (gain * smoothing + change.max(0.0)) / period as f64;
            loss = (loss * smoothing + (-change).max(0.0)) / period as f64;
        }

        if loss == 0.0 {
            return Some(100.0);
        }
        Some(100.0 - 100.0 / (1.0 + gain / loss))
    }
}
