/// Render a KPI value with thousands separators and zero decimal places:
/// 12345.4 -> "12,345". Written into text fields on the remote store.
pub fn with_commas(value: f64) -> String {
    let rounded = value.round() as i64;
    let negative = rounded < 0;
    let digits = rounded.abs().to_string();

    let mut grouped = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}
