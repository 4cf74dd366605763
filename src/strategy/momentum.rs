use super::MomentumModel;

/// Wilder RSI over the tick window.
#[derive(Debug, Clone)]
pub struct Rsi {
    pub period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl MomentumModel for Rsi {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn momentum(&self, prices: &[f64]) -> Option<f64> {
        rsi_wilder(prices, self.period)
    }
}

/// Percent change over the last `window` ticks, scaled so a 50% move
/// saturates at 100. Falling prices read as 0.
#[derive(Debug, Clone)]
pub struct RateOfChange {
    pub window: usize,
    pub scale: f64,
}

impl RateOfChange {
    pub fn new(window: usize) -> Self {
        Self { window, scale: 2.0 }
    }
}

impl MomentumModel for RateOfChange {
    fn name(&self) -> &'static str {
        "roc"
    }

    fn momentum(&self, prices: &[f64]) -> Option<f64> {
        if self.window == 0 || prices.len() < self.window + 1 {
            return None;
        }
        let first = prices[prices.len() - 1 - self.window];
        let last = prices[prices.len() - 1];
        if first <= 0.0 {
            return None;
        }
        let roc_pct = (last - first) / first * 100.0;
        roc_pct
            .is_finite()
            .then(|| (roc_pct * self.scale).clamp(0.0, 100.0))
    }
}

// --- indicator utilities (pure, unit-testable) ---

/// Simple RSI (Wilder) over close prices.
pub fn rsi_wilder(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gain = 0.0;
    let mut loss = 0.0;

    for i in 1..=period {
        let diff = closes[i] - closes[i - 1];
        if diff >= 0.0 {
            gain += diff;
        } else {
            loss += -diff;
        }
    }

    let mut avg_gain = gain / period as f64;
    let mut avg_loss = loss / period as f64;

    for i in (period + 1)..closes.len() {
        let diff = closes[i] - closes[i - 1];
        let (g, l) = if diff >= 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + g) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + l) / period as f64;
    }

    // A flat window has no direction.
    if avg_gain == 0.0 && avg_loss == 0.0 {
        return Some(50.0);
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - (100.0 / (1.0 + rs));
    rsi.is_finite().then_some(rsi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_needs_period_plus_one() {
        assert_eq!(rsi_wilder(&[1.0, 1.1, 1.2], 3), None);
        assert_eq!(rsi_wilder(&[1.0, 1.1], 0), None);
    }

    #[test]
    fn rsi_extremes_and_flat() {
        assert_eq!(rsi_wilder(&[1.0, 1.1, 1.2, 1.3], 3), Some(100.0));
        assert_eq!(rsi_wilder(&[1.3, 1.2, 1.1, 1.0], 3), Some(0.0));
        assert_eq!(rsi_wilder(&[1.0, 1.0, 1.0, 1.0], 3), Some(50.0));
    }

    #[test]
    fn rsi_mixed_is_between() {
        let v = rsi_wilder(&[1.0, 1.2, 1.1, 1.3, 1.25], 3).unwrap();
        assert!(v > 50.0 && v < 100.0, "{v}");
    }

    #[test]
    fn roc_scales_and_clamps() {
        let m = RateOfChange::new(2);
        assert_eq!(m.momentum(&[1.0, 1.0]), None);
        let v = m.momentum(&[1.0, 1.05, 1.10]).unwrap();
        assert!((v - 20.0).abs() < 1e-9);
        assert_eq!(m.momentum(&[1.0, 1.5, 2.0]), Some(100.0));
        assert_eq!(m.momentum(&[1.0, 0.9, 0.8]), Some(0.0));
    }

    #[test]
    fn models_report_names() {
        assert_eq!(Rsi::new(5).name(), "rsi");
        assert_eq!(RateOfChange::new(5).name(), "roc");
    }
}
