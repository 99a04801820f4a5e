use std::time::Instant;
use tracing::info;

/// Wall-clock timer that logs how long a command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// Volume with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed percent, e.g. `+1.25%`. Missing changes render as `—`.
pub fn fmt_change(pct: Option<f64>) -> String {
    match pct {
        Some(p) if p.is_finite() => format!("{:+.2}%", p),
        _ => "—".into(),
    }
}

pub fn fmt_price(price: Option<f64>) -> String {
    price.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "—".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(1_234_567), "1,234,567");
        assert_eq!(fmt_number(0), "0");
        assert_eq!(fmt_number(-42_000), "-42,000");
        assert_eq!(fmt_number(999), "999");
        assert_eq!(fmt_number(i64::MIN), "-9,223,372,036,854,775,808");
    }

    #[test]
    fn test_fmt_change() {
        assert_eq!(fmt_change(Some(1.254)), "+1.25%");
        assert_eq!(fmt_change(Some(-0.5)), "-0.50%");
        assert_eq!(fmt_change(Some(0.0)), "+0.00%");
        assert_eq!(fmt_change(None), "—");
        assert_eq!(fmt_change(Some(f64::NAN)), "—");
    }

    #[test]
    fn test_fmt_price() {
        assert_eq!(fmt_price(Some(189.2)), "189.20");
        assert_eq!(fmt_price(None), "—");
    }
}
