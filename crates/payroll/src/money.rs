//! Display helpers for minor-unit amounts.

/// Format an amount of minor units (cents) for humans.
///
/// Known currencies get their symbol (`$75,000.00`); anything else is suffixed
/// with the ISO code (`75,000.00 CHF`).
pub fn format_minor_units(amount: i64, currency: &str) -> String {
    let negative = amount < 0;
    let abs = amount.unsigned_abs();
    let major = abs / 100;
    let minor = abs % 100;

    let digits = major.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    match currency_symbol(currency) {
        Some(symbol) => format!("{sign}{symbol}{grouped}.{minor:02}"),
        None => format!("{sign}{grouped}.{minor:02} {currency}"),
    }
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        _ => None,
    }
}
