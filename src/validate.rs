//! Report validation. Every rule is checked and all failures are returned
//! together so the client can fix the whole form in one round trip.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Category, ItemKind, ReportForm, Upload};

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MIN: usize = 10;
pub const DESCRIPTION_MAX: usize = 1000;

pub const ALLOWED_IMAGE_MIME: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError { field: field.to_string(), message: message.into() });
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| format!("{}: {}", e.field, e.message)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Upload limits applied while validating attachments.
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_images: usize,
    pub max_bytes: usize,
}

/// Report fields after trimming and parsing.
#[derive(Debug, Clone)]
pub struct ValidReport {
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: String,
    pub date: DateTime<Utc>,
    pub contact_name: String,
    pub contact_email: String,
    pub phone: Option<String>,
}

/// An attachment whose content type was sniffed from its bytes.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub extension: String,
}

fn required<'a>(errs: &mut ValidationErrors, field: &str, value: &'a Option<String>) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errs.push(field, format!("{field} is required"));
            None
        }
    }
}

fn check_length(errs: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min {
        errs.push(field, format!("{field} must be at least {min} characters long"));
    } else if len > max {
        errs.push(field, format!("{field} must be at most {max} characters long"));
    }
}

/// Matches `^[^\s@]+@[^\s@]+\.[^\s@]+$`.
pub fn is_valid_email(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.split_once('@') else { return false };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // any dot with text on both sides satisfies the pattern
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

pub fn validate_report(form: &ReportForm) -> Result<ValidReport, ValidationErrors> {
    let mut errs = ValidationErrors::default();

    let kind = required(&mut errs, "type", &form.kind).and_then(|raw| {
        let parsed = ItemKind::parse(raw);
        if parsed.is_none() {
            errs.push("type", "type must be one of: lost, found");
        }
        parsed
    });
    let title = required(&mut errs, "title", &form.title);
    if let Some(t) = title {
        check_length(&mut errs, "title", t, TITLE_MIN, TITLE_MAX);
    }
    let category = required(&mut errs, "category", &form.category).and_then(|raw| {
        let parsed = Category::parse(raw);
        if parsed.is_none() {
            let names: Vec<_> = Category::ALL.iter().map(Category::as_str).collect();
            errs.push("category", format!("category must be one of: {}", names.join(", ")));
        }
        parsed
    });
    let description = required(&mut errs, "description", &form.description);
    if let Some(d) = description {
        check_length(&mut errs, "description", d, DESCRIPTION_MIN, DESCRIPTION_MAX);
    }
    let location = required(&mut errs, "location", &form.location);
    let date = required(&mut errs, "date", &form.date).and_then(|raw| {
        let parsed = parse_date(raw);
        if parsed.is_none() {
            errs.push("date", "date must be YYYY-MM-DD or an RFC 3339 timestamp");
        }
        parsed
    });
    let contact_name = required(&mut errs, "contactName", &form.contact_name);
    let contact_email = required(&mut errs, "contactEmail", &form.contact_email);
    if let Some(e) = contact_email {
        if !is_valid_email(e) {
            errs.push("contactEmail", "please provide a valid email address");
        }
    }
    let phone = form.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);

    if !errs.is_empty() {
        return Err(errs);
    }
    match (kind, title, category, description, location, date, contact_name, contact_email) {
        (Some(kind), Some(title), Some(category), Some(description), Some(location), Some(date), Some(cn), Some(ce)) => {
            Ok(ValidReport {
                kind,
                title: title.to_string(),
                description: description.to_string(),
                category,
                location: location.to_string(),
                date,
                contact_name: cn.to_string(),
                contact_email: ce.to_lowercase(),
                phone,
            })
        }
        _ => Err(errs),
    }
}

/// Sniff and bound-check attachments. Errors are appended to `errs`.
pub fn validate_images(uploads: Vec<Upload>, limits: ImageLimits, errs: &mut ValidationErrors) -> Vec<ValidImage> {
    if uploads.len() > limits.max_images {
        errs.push("images", format!("too many files; maximum is {}", limits.max_images));
        return Vec::new();
    }
    let mut out = Vec::with_capacity(uploads.len());
    for (idx, up) in uploads.into_iter().enumerate() {
        let label = up.original_name.clone().unwrap_or_else(|| format!("#{}", idx + 1));
        if up.bytes.len() > limits.max_bytes {
            errs.push("images", format!("{label} is too large; maximum size is {} bytes", limits.max_bytes));
            continue;
        }
        match infer::get(&up.bytes) {
            Some(t) if ALLOWED_IMAGE_MIME.contains(&t.mime_type()) => out.push(ValidImage {
                mime: t.mime_type().to_string(),
                extension: t.extension().to_string(),
                bytes: up.bytes,
            }),
            _ => errs.push("images", format!("{label}: only image files are allowed")),
        }
    }
    out
}
