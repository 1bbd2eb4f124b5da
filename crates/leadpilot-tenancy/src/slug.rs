//! Organization name, slug and domain rules.

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};

/// Derive a URL-safe slug: ASCII-lowercase, every run of
/// non-alphanumeric characters collapsed into one hyphen, no leading or
/// trailing hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Trimmed, non-empty organization name.
pub fn validate_name(name: &str) -> LeadpilotResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LeadpilotError::validation("organization name must not be empty"));
    }
    Ok(trimmed)
}

/// Slug for `name`, or the explicit override when one is given.
pub fn resolve_slug(name: &str, explicit: Option<&str>) -> LeadpilotResult<String> {
    match explicit.map(str::trim) {
        Some(slug) => {
            validate_slug(slug)?;
            Ok(slug.to_string())
        }
        None => {
            let slug = slugify(name);
            if slug.is_empty() {
                return Err(LeadpilotError::validation(
                    "organization name must contain at least one letter or digit",
                ));
            }
            Ok(slug)
        }
    }
}

pub fn validate_slug(slug: &str) -> LeadpilotResult<()> {
    if slug.is_empty() {
        return Err(LeadpilotError::validation("slug must not be empty"));
    }
    if slugify(slug) != slug {
        return Err(LeadpilotError::validation(format!(
            "slug '{slug}' must be lowercase letters, digits and single hyphens"
        )));
    }
    Ok(())
}

/// Loose hostname check: dot-separated labels of ASCII letters, digits and
/// inner hyphens. Returns the lowercased domain.
pub fn validate_domain(domain: &str) -> LeadpilotResult<String> {
    let domain = domain.trim().to_ascii_lowercase();
    let malformed = || LeadpilotError::validation(format!("malformed domain '{domain}'"));

    if domain.len() > 253 || !domain.contains('.') {
        return Err(malformed());
    }
    for label in domain.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(malformed());
        }
    }
    Ok(domain)
}
