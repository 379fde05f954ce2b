pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// "2 cups", "1.5 tbsp", "3" for unitless amounts.
pub(crate) fn format_quantity(quantity: f64, unit: &str) -> String {
    let amount = if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        let s = format!("{quantity:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    if unit.is_empty() {
        amount
    } else {
        format!("{amount} {unit}")
    }
}

/// Date part of a stored UTC timestamp.
pub(crate) fn short_date(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}
