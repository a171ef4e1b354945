//! Field rules for agency records, shared by the JSON endpoints and the CSV
//! importer. Each function records problems in `errors` and returns the
//! normalised value.

use std::str::FromStr;

use chrono::{Datelike, Utc};
use db::models::agency::{AgencyFields, CompanySize};
use utils::validation::{FieldErrors, is_valid_email, is_valid_phone, non_empty, normalize_url};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 5000;
pub const HEADQUARTERS_MAX: usize = 200;
pub const EMPLOYEE_COUNT_MAX: usize = 50;
pub const EMAIL_MAX: usize = 254;
pub const EARLIEST_FOUNDED_YEAR: i32 = 1800;

pub fn validate_name(raw: &str, errors: &mut FieldErrors) -> String {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = name.chars().count();
    if len == 0 {
        errors.add("name", "is required");
    } else if len < NAME_MIN {
        errors.add("name", format!("must be at least {NAME_MIN} characters"));
    } else if len > NAME_MAX {
        errors.add("name", format!("must be at most {NAME_MAX} characters"));
    }
    name
}

pub fn validate_text(
    field: &str,
    raw: Option<&str>,
    max: usize,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = non_empty(raw)?;
    if value.chars().count() > max {
        errors.add(field, format!("must be at most {max} characters"));
    }
    Some(value)
}

pub fn validate_url(field: &str, raw: Option<&str>, errors: &mut FieldErrors) -> Option<String> {
    let value = non_empty(raw)?;
    match normalize_url(&value) {
        Some(url) => Some(url),
        None => {
            errors.add(field, "must be a valid http(s) URL");
            None
        }
    }
}

pub fn validate_email(field: &str, raw: Option<&str>, errors: &mut FieldErrors) -> Option<String> {
    let value = non_empty(raw)?;
    if value.len() > EMAIL_MAX || !is_valid_email(&value) {
        errors.add(field, "must be a valid email address");
        return None;
    }
    Some(value.to_ascii_lowercase())
}

pub fn validate_phone(field: &str, raw: Option<&str>, errors: &mut FieldErrors) -> Option<String> {
    let value = non_empty(raw)?;
    if !is_valid_phone(&value) {
        errors.add(field, "must contain 10 to 15 digits");
        return None;
    }
    Some(value)
}

pub fn validate_founded_year(year: Option<i32>, errors: &mut FieldErrors) -> Option<i32> {
    let year = year?;
    let current = Utc::now().year();
    if !(EARLIEST_FOUNDED_YEAR..=current).contains(&year) {
        errors.add(
            "founded_year",
            format!("must be between {EARLIEST_FOUNDED_YEAR} and {current}"),
        );
        return None;
    }
    Some(year)
}

/// Parses a year cell from a spreadsheet, then applies the range rule.
pub fn parse_founded_year(raw: Option<&str>, errors: &mut FieldErrors) -> Option<i32> {
    let value = non_empty(raw)?;
    match value.parse::<i32>() {
        Ok(year) => validate_founded_year(Some(year), errors),
        Err(_) => {
            errors.add("founded_year", "must be a whole number");
            None
        }
    }
}

pub fn validate_company_size(raw: Option<&str>, errors: &mut FieldErrors) -> Option<CompanySize> {
    let value = non_empty(raw)?;
    match CompanySize::from_str(&value) {
        Ok(size) => Some(size),
        Err(_) => {
            errors.add(
                "company_size",
                "must be one of small, medium, large, enterprise",
            );
            None
        }
    }
}

/// Share of the twelve listing fields that are filled in, rounded down.
pub fn profile_completion(fields: &AgencyFields, trade_count: usize, region_count: usize) -> i32 {
    let checks = [
        !fields.name.trim().is_empty(),
        fields.description.is_some(),
        fields.logo_url.is_some(),
        fields.website.is_some(),
        fields.phone.is_some(),
        fields.email.is_some(),
        fields.headquarters.is_some(),
        fields.founded_year.is_some(),
        fields.employee_count.is_some(),
        fields.company_size.is_some(),
        trade_count > 0,
        region_count > 0,
    ];
    let filled = checks.iter().filter(|c| **c).count();
    (filled * 100 / checks.len()) as i32
}
