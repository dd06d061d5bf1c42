//! Phone number normalization
//!
//! Numbers arrive from Twilio, Retell, callers reading digits aloud and
//! dashboard forms. Everything is stored and compared in E.164.

/// Normalize a phone number to E.164, assuming North America for bare 10-digit numbers.
/// Returns None when the input cannot be a dialable number.
pub fn normalize_phone(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    // Letters mean vanity numbers, extensions or not a number at all
    if trimmed.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    if has_plus {
        return if (8..=15).contains(&digits.len()) {
            Some(format!("+{}", digits))
        } else {
            None
        };
    }

    match digits.len() {
        10 if !digits.starts_with('0') && !digits.starts_with('1') => Some(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => None,
    }
}

pub fn is_valid_phone(input: &str) -> bool {
    normalize_phone(input).is_some()
}

/// Last four digits, for logs and spoken confirmations
pub fn last_four(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}
