//! Number formatting utilities.

/// Format a percentage.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.0}%")
}

/// Format a cost in USD.
#[must_use]
pub fn format_cost(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

/// Format a token count with a compact suffix.
#[must_use]
pub fn format_tokens(value: u64) -> String {
    fn format_compact(value: u64, divisor: u64, suffix: &str) -> String {
        let major = value / divisor;
        let minor = (value % divisor) / (divisor / 10);
        format!("{major}.{minor}{suffix}")
    }

    if value >= 1_000_000 {
        format_compact(value, 1_000_000, "M")
    } else if value >= 1_000 {
        format_compact(value, 1_000, "K")
    } else {
        value.to_string()
    }
}

/// Mask a credential for display, keeping only the last four characters.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tokens_millions() {
        assert_eq!(format_tokens(1_500_000), "1.5M");
    }

    #[test]
    fn format_tokens_thousands() {
        assert_eq!(format_tokens(12_500), "12.5K");
    }

    #[test]
    fn format_cost_negative() {
        assert_eq!(format_cost(-3.5), "-$3.50");
        assert_eq!(format_cost(20.0), "$20.00");
    }

    #[test]
    fn mask_secret_hides_short_values() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("sk-ant-0123456789"), "****6789");
    }
}
