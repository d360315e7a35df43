//! Phone number normalization
//!
//! Presence and active-call records report numbers the way the carrier
//! formatted them. Matching needs one spelling per number, so everything
//! dialable is turned into E.164 using the account's region; extensions and
//! unparseable input are left alone.

/// Numbers this short are extensions, not dialable numbers
const MAX_EXTENSION_LEN: usize = 6;

/// North American Numbering Plan regions (calling code 1)
const NANP_REGIONS: &[&str] = &["US", "CA", "PR", "VI", "GU", "AS", "MP"];

/// Calling codes of regions that dial domestically with a trunk `0`
const TRUNK_ZERO_REGIONS: &[(&str, &str)] = &[
    ("GB", "44"),
    ("IE", "353"),
    ("DE", "49"),
    ("AT", "43"),
    ("CH", "41"),
    ("FR", "33"),
    ("BE", "32"),
    ("NL", "31"),
    ("ES", "34"),
    ("AU", "61"),
    ("NZ", "64"),
    ("IN", "91"),
];

/// Normalize a phone number for the given region
///
/// `country_code` is an ISO 3166 alpha-2 code, `area_code` the default
/// area code applied to seven-digit NANP numbers.
///
/// ```
/// use datasync_core::calls::normalize_number;
///
/// assert_eq!(normalize_number("(650) 555-0100", "US", ""), "+16505550100");
/// assert_eq!(normalize_number("555-0100", "US", "650"), "+16505550100");
/// assert_eq!(normalize_number("020 7946 0018", "GB", ""), "+442079460018");
/// assert_eq!(normalize_number("101", "US", "650"), "101");
/// ```
pub fn normalize_number(phone_number: &str, country_code: &str, area_code: &str) -> String {
    let trimmed = phone_number.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }
    if trimmed.starts_with('+') {
        return format!("+{}", digits);
    }
    if digits.len() <= MAX_EXTENSION_LEN {
        return digits;
    }

    let region = country_code.trim().to_ascii_uppercase();
    if NANP_REGIONS.contains(&region.as_str()) {
        return normalize_nanp(digits, area_code);
    }
    match TRUNK_ZERO_REGIONS.iter().find(|(code, _)| *code == region) {
        Some((_, calling_code)) => normalize_trunk_zero(digits, calling_code),
        None => digits,
    }
}

fn normalize_nanp(digits: String, area_code: &str) -> String {
    if let Some(rest) = digits.strip_prefix("011") {
        return format!("+{}", rest);
    }
    let area: String = area_code.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        7 if area.len() == 3 => format!("+1{}{}", area, digits),
        10 => format!("+1{}", digits),
        11 if digits.starts_with('1') => format!("+{}", digits),
        _ => digits,
    }
}

fn normalize_trunk_zero(digits: String, calling_code: &str) -> String {
    if let Some(rest) = digits.strip_prefix("00") {
        format!("+{}", rest)
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+{}{}", calling_code, rest)
    } else {
        format!("+{}{}", calling_code, digits)
    }
}
