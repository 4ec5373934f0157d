//! Numeric token normalization shared by the parser, extractor, and patcher.

/// Keep only the ASCII digits of `raw` and read them as a decimal integer.
///
/// Separators (`12_000`) and trailing punctuation (`42),`) are dropped.
/// Input without digits yields 0; overflow saturates.
pub fn normalize(raw: &str) -> u64 {
    let mut value: u64 = 0;
    for byte in raw.bytes().filter(u8::is_ascii_digit) {
        value = value
            .saturating_mul(10)
            .saturating_add(u64::from(byte - b'0'));
    }
    value
}

/// Render `value` with `_` thousands separators, the way dispatch files write
/// weight literals.
pub fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push('_');
        }
        out.push(ch);
    }
    out
}
