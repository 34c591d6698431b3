//! Currency display helpers for amounts in Stripe minor units.

/// Currencies Stripe treats as zero-decimal: the minor unit is the major unit.
/// https://stripe.com/docs/currencies#zero-decimal
const ZERO_DECIMAL: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

fn symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "usd" | "aud" | "cad" | "nzd" | "sgd" | "hkd" => Some("$"),
        "eur" => Some("€"),
        "gbp" => Some("£"),
        "jpy" => Some("¥"),
        "krw" => Some("₩"),
        "thb" => Some("฿"),
        _ => None,
    }
}

pub fn is_zero_decimal(currency: &str) -> bool {
    ZERO_DECIMAL.contains(&currency.to_ascii_lowercase().as_str())
}

/// Formats a minor-unit amount as a human-readable currency string, e.g.
/// `1050, "usd"` → `"$10.50"` and `1050, "jpy"` → `"¥1050"`. Currencies
/// without a known symbol fall back to the uppercase ISO code as a prefix.
pub fn format_minor_amount(amount_minor: i64, currency: &str) -> String {
    let currency = currency.to_ascii_lowercase();
    let sign = if amount_minor < 0 { "-" } else { "" };
    let magnitude = amount_minor.unsigned_abs();

    let number = if is_zero_decimal(&currency) {
        magnitude.to_string()
    } else {
        format!("{}.{:02}", magnitude / 100, magnitude % 100)
    };

    match symbol(&currency) {
        Some(sym) => format!("{sign}{sym}{number}"),
        None => format!("{sign}{} {number}", currency.to_ascii_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimal_currency() {
        assert_eq!(format_minor_amount(1050, "usd"), "$10.50");
        assert_eq!(format_minor_amount(9, "eur"), "€0.09");
        assert_eq!(format_minor_amount(200000, "gbp"), "£2000.00");
    }

    #[test]
    fn formats_zero_decimal_currency() {
        assert_eq!(format_minor_amount(1050, "jpy"), "¥1050");
        assert_eq!(format_minor_amount(5000, "KRW"), "₩5000");
    }

    #[test]
    fn falls_back_to_iso_code_for_unknown_symbol() {
        assert_eq!(format_minor_amount(12345, "sek"), "SEK 123.45");
    }

    #[test]
    fn formats_negative_amounts() {
        assert_eq!(format_minor_amount(-1050, "usd"), "-$10.50");
        assert_eq!(format_minor_amount(-500, "jpy"), "-¥500");
    }

    #[test]
    fn zero_decimal_lookup_is_case_insensitive() {
        assert!(is_zero_decimal("JPY"));
        assert!(!is_zero_decimal("USD"));
    }
}
