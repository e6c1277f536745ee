//! Configuration validation.
//!
//! # Responsibilities
//! - Enforce required fields (serde defaults let them decode empty)
//! - Validate address fields as hostnames or IP literals
//! - Validate the organization as an address-like identifier (`local@domain`)
//! - Reject duplicate site names and topic segments containing wildcards
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PigeonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::IpAddr;

use thiserror::Error;

use crate::config::schema::PigeonConfig;

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} is not a valid host: {value:?}")]
    InvalidHost { field: String, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("database.org is not an address-like identifier: {0:?}")]
    InvalidOrganization(String),

    #[error("{field} is not a valid topic segment: {value:?}")]
    InvalidTopicSegment { field: String, value: String },

    #[error("duplicate site name: {0:?}")]
    DuplicateSite(String),
}

fn required(field: &str) -> ValidationError {
    ValidationError::Required {
        field: field.to_string(),
    }
}

/// Validate a decoded configuration.
pub fn validate_config(config: &PigeonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Broker
    check_host(&mut errors, "broker.address", &config.broker.address);
    if config.broker.port == 0 {
        errors.push(required("broker.port"));
    }
    if config.broker.client_id.trim().is_empty() {
        errors.push(required("broker.client_id"));
    }
    if config.broker.qos > 2 {
        errors.push(ValidationError::OutOfRange {
            field: "broker.qos".into(),
            value: config.broker.qos.into(),
            min: 0,
            max: 2,
        });
    }

    // Database
    check_host(&mut errors, "database.address", &config.database.address);
    if config.database.port == 0 {
        errors.push(required("database.port"));
    }
    if config.database.org.is_empty() {
        errors.push(required("database.org"));
    } else if !is_address_like(&config.database.org) {
        errors.push(ValidationError::InvalidOrganization(config.database.org.clone()));
    }
    if config.database.token.is_empty() {
        errors.push(required("database.token"));
    }

    // Sites
    if config.sites.is_empty() {
        errors.push(required("sites"));
    }
    let mut seen = HashSet::new();
    for (i, site) in config.sites.iter().enumerate() {
        let field = format!("sites[{}].name", i);
        if site.name.is_empty() {
            errors.push(required(&field));
            continue;
        }
        if !is_topic_segment(&site.name) {
            errors.push(ValidationError::InvalidTopicSegment {
                field,
                value: site.name.clone(),
            });
        }
        if !seen.insert(site.name.as_str()) {
            errors.push(ValidationError::DuplicateSite(site.name.clone()));
        }
        for (j, device) in site.devices.iter().enumerate() {
            if !is_topic_segment(device) {
                errors.push(ValidationError::InvalidTopicSegment {
                    field: format!("sites[{}].devices[{}]", i, j),
                    value: device.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_host(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.is_empty() {
        errors.push(required(field));
    } else if !is_host(value) {
        errors.push(ValidationError::InvalidHost {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

/// IP literal or RFC 1123 hostname.
pub fn is_host(value: &str) -> bool {
    if value.parse::<IpAddr>().is_ok() {
        return true;
    }
    let name = value.strip_suffix('.').unwrap_or(value);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// `local@domain` with a non-blank local part and a hostname domain.
fn is_address_like(value: &str) -> bool {
    match value.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !local.chars().any(char::is_whitespace)
                && domain.contains('.')
                && is_host(domain)
        }
        None => false,
    }
}

fn is_topic_segment(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| matches!(c, '/' | '+' | '#') || c.is_control())
}
