//! Field-level validation primitives shared by the HTTP handlers and the
//! CSV importer.

use std::{collections::BTreeMap, fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use url::Url;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

const PHONE_PUNCTUATION: &[char] = &['+', '-', '.', '(', ')', ' '];

/// Messages keyed by field name, returned as the `error_data` of a 400.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(field, msgs)| msgs.iter().map(move |m| (field.as_str(), m.as_str())))
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Trims and maps empty strings to `None`.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

/// Parses an http(s) URL, prefixing `https://` when no scheme was given.
pub fn normalize_url(value: &str) -> Option<String> {
    let value = value.trim();
    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://{value}")
    };
    let url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| h.contains('.')) => {
            Some(url.to_string())
        }
        _ => None,
    }
}

/// Number of digits in a phone number, or `None` if it contains anything
/// other than digits and common punctuation.
pub fn phone_digit_count(value: &str) -> Option<usize> {
    let mut digits = 0;
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits += 1;
        } else if !PHONE_PUNCTUATION.contains(&ch) {
            return None;
        }
    }
    Some(digits)
}

pub fn is_valid_phone(value: &str) -> bool {
    matches!(phone_digit_count(value), Some(10..=15))
}

/// Host of a URL or email domain, lower-cased, without a leading `www.`.
pub fn registrable_host(value: &str) -> Option<String> {
    let host = if let Some((_, domain)) = value.rsplit_once('@') {
        domain.to_string()
    } else {
        let url = normalize_url(value)?;
        Url::parse(&url).ok()?.host_str()?.to_string()
    };
    let host = host.trim().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (!host.is_empty()).then_some(host)
}

/// True when `email`'s domain is the website's host or a subdomain of it.
pub fn email_matches_website(email: &str, website: &str) -> bool {
    match (registrable_host(email), registrable_host(website)) {
        (Some(mail), Some(site)) => mail == site || mail.ends_with(&format!(".{site}")),
        _ => false,
    }
}

/// Accepts the boolean spellings that show up in spreadsheets.
pub fn parse_bool_loose(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Some(false),
        "true" | "yes" | "y" | "1" => Some(true),
        _ => None,
    }
}
