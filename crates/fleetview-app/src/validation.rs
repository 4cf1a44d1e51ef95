// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::num::IntErrorKind;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";
pub const DATETIME_LAYOUT: &str = "YYYY-MM-DD HH:MM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    InvalidMoney,
    NegativeMoney,
    InvalidDate,
    InvalidDateTime,
    InvalidInt,
    InvalidDuration,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMoney => f.write_str("invalid money value"),
            Self::NegativeMoney => f.write_str("negative money value"),
            Self::InvalidDate => f.write_str("invalid date value"),
            Self::InvalidDateTime => f.write_str("invalid date and time value"),
            Self::InvalidInt => f.write_str("invalid integer value"),
            Self::InvalidDuration => f.write_str("invalid duration value"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

pub fn parse_required_paise(input: &str) -> ValidationResult<i64> {
    parse_paise(input.trim())
}

pub fn parse_optional_paise(input: &str) -> ValidationResult<Option<i64>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_paise(trimmed).map(Some)
}

pub fn format_paise(paise: i64) -> String {
    let (sign, paise) = normalize_sign(paise);
    let rupees = paise / 100;
    let remainder = paise % 100;
    format!("{sign}₹{}.{:02}", comma_format(rupees), remainder)
}

pub fn format_optional_paise(paise: Option<i64>) -> String {
    paise.map_or_else(String::new, format_paise)
}

pub fn format_compact_paise(paise: i64) -> String {
    let (sign, paise) = normalize_sign(paise);
    let rupees = (paise as f64) / 100.0;
    if rupees < 1000.0 {
        return format!("{sign}{}", format_paise(paise));
    }

    let (value, suffix) = if rupees < 1_000_000.0 {
        (rupees / 1000.0, "k")
    } else if rupees < 1_000_000_000.0 {
        (rupees / 1_000_000.0, "M")
    } else {
        (rupees / 1_000_000_000.0, "B")
    };

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract().abs() < f64::EPSILON {
        format!("{sign}₹{rounded:.0}{suffix}")
    } else {
        format!("{sign}₹{rounded:.1}{suffix}")
    }
}

pub fn parse_required_date(input: &str) -> ValidationResult<Date> {
    parse_date(input.trim())
}

pub fn parse_optional_date(input: &str) -> ValidationResult<Option<Date>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_date(trimmed).map(Some)
}

pub fn format_date(value: Option<Date>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

/// Long form used on profile and detail panels, e.g. `01 Oct 2023`.
pub fn format_long_date(value: Date) -> String {
    value
        .format(&format_description!(
            "[day] [month repr:short] [year]"
        ))
        .unwrap_or_default()
}

pub fn parse_datetime_minutes(input: &str) -> ValidationResult<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        input.trim(),
        &format_description!("[year]-[month]-[day] [hour]:[minute]"),
    )
    .map_err(|_| ValidationError::InvalidDateTime)
}

pub fn format_datetime_minutes(value: PrimitiveDateTime) -> String {
    value
        .format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}

pub fn format_time_of_day(value: PrimitiveDateTime) -> String {
    value
        .format(&format_description!("[hour]:[minute]"))
        .unwrap_or_default()
}

pub fn parse_optional_int(input: &str) -> ValidationResult<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let value = trimmed
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidInt)?;
    if value < 0 {
        return Err(ValidationError::InvalidInt);
    }
    Ok(value)
}

pub fn parse_required_int(input: &str) -> ValidationResult<i64> {
    if input.trim().is_empty() {
        return Err(ValidationError::InvalidInt);
    }
    parse_optional_int(input)
}

/// Parses `6h 30m`, `6h30m`, `4h`, `45m` or a bare minute count.
pub fn parse_duration_minutes(input: &str) -> ValidationResult<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidDuration);
    }

    match trimmed.parse::<i64>() {
        Ok(value) => {
            if value < 0 {
                return Err(ValidationError::InvalidDuration);
            }
            return Ok(value);
        }
        Err(error) => {
            if error.kind() != &IntErrorKind::InvalidDigit {
                return Err(ValidationError::InvalidDuration);
            }
        }
    }

    let bytes = trimmed.as_bytes();
    let mut index = 0usize;
    let mut total = 0i64;
    let mut parsed_any = false;

    if let Some(hours) = parse_unit(bytes, &mut index, b'h', true)? {
        total = hours
            .checked_mul(60)
            .ok_or(ValidationError::InvalidDuration)?;
        parsed_any = true;
    }

    skip_ascii_whitespace(bytes, &mut index);
    if let Some(minutes) = parse_unit(bytes, &mut index, b'm', false)? {
        total = total
            .checked_add(minutes)
            .ok_or(ValidationError::InvalidDuration)?;
        parsed_any = true;
    }

    skip_ascii_whitespace(bytes, &mut index);
    if index != bytes.len() || !parsed_any {
        return Err(ValidationError::InvalidDuration);
    }
    Ok(total)
}

pub fn format_duration_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, rest) => format!("{rest}m"),
        (hours, 0) => format!("{hours}h"),
        (hours, rest) => format!("{hours}h {rest}m"),
    }
}

fn parse_paise(input: &str) -> ValidationResult<i64> {
    let clean = input.replace(',', "");
    if clean.starts_with('-') {
        return Err(ValidationError::NegativeMoney);
    }

    let clean = clean.strip_prefix('₹').unwrap_or(&clean).trim_start();
    if clean.is_empty() {
        return Err(ValidationError::InvalidMoney);
    }

    let parts = clean.split('.').collect::<Vec<_>>();
    if parts.len() > 2 {
        return Err(ValidationError::InvalidMoney);
    }

    let whole = parse_digits(parts[0], true)?;
    if whole > i64::MAX / 100 {
        return Err(ValidationError::InvalidMoney);
    }

    let mut frac = 0i64;
    if let Some(fraction) = parts.get(1) {
        if fraction.len() > 2 {
            return Err(ValidationError::InvalidMoney);
        }
        frac = parse_digits(fraction, false)?;
        if fraction.len() == 1 {
            frac *= 10;
        }
    }

    whole
        .checked_mul(100)
        .and_then(|value| value.checked_add(frac))
        .ok_or(ValidationError::InvalidMoney)
}

fn parse_digits(input: &str, allow_empty: bool) -> ValidationResult<i64> {
    if input.is_empty() {
        if allow_empty {
            return Ok(0);
        }
        return Err(ValidationError::InvalidMoney);
    }
    if !input.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ValidationError::InvalidMoney);
    }
    input
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidMoney)
}

fn parse_date(input: &str) -> ValidationResult<Date> {
    Date::parse(input, &format_description!("[year]-[month]-[day]"))
        .map_err(|_| ValidationError::InvalidDate)
}

fn comma_format(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let mut chars = digits.chars().collect::<Vec<_>>();
    let mut count = 0usize;
    while let Some(ch) = chars.pop() {
        if count == 3 {
            out.push(',');
            count = 0;
        }
        out.push(ch);
        count += 1;
    }
    out.chars().rev().collect()
}

fn normalize_sign(paise: i64) -> (&'static str, i64) {
    if paise >= 0 {
        return ("", paise);
    }
    if paise == i64::MIN {
        ("-", i64::MAX)
    } else {
        ("-", -paise)
    }
}

fn parse_unit(
    bytes: &[u8],
    index: &mut usize,
    suffix: u8,
    rollback_on_mismatch: bool,
) -> ValidationResult<Option<i64>> {
    let start = *index;
    while *index < bytes.len() && bytes[*index].is_ascii_digit() {
        *index += 1;
    }
    if *index == start {
        return Ok(None);
    }
    let digits_end = *index;

    skip_ascii_whitespace(bytes, index);
    if *index >= bytes.len() || !bytes[*index].eq_ignore_ascii_case(&suffix) {
        if rollback_on_mismatch {
            *index = start;
            return Ok(None);
        }
        return Err(ValidationError::InvalidDuration);
    }
    *index += 1;

    std::str::from_utf8(&bytes[start..digits_end])
        .ok()
        .and_then(|number| number.parse::<i64>().ok())
        .map(Some)
        .ok_or(ValidationError::InvalidDuration)
}

fn skip_ascii_whitespace(bytes: &[u8], index: &mut usize) {
    while *index < bytes.len() && bytes[*index].is_ascii_whitespace() {
        *index += 1;
    }
}
