use std::time::Duration;

pub const CURSOR_PERIOD: Duration = Duration::from_millis(100);

/// Cursor position (percent of the canvas) after `elapsed_ms`: a slow figure-eight around
/// the centre.
pub fn position(elapsed_ms: u64) -> (f64, f64) {
    let t = elapsed_ms as f64 / 1000.0;
    let x = 50.0 + 30.0 * (t * 0.8).sin();
    let y = 50.0 + 20.0 * (t * 1.6).sin();
    (round2(x), round2(y))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::position;

    #[test]
    fn starts_centred_and_stays_on_canvas() {
        assert_eq!(position(0), (50.0, 50.0));
        for ms in (0..120_000).step_by(37) {
            let (x, y) = position(ms);
            assert!((20.0..=80.0).contains(&x), "x={x} at {ms}");
            assert!((30.0..=70.0).contains(&y), "y={y} at {ms}");
        }
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(position(12_345), position(12_345));
        assert_ne!(position(0), position(500));
    }
}
