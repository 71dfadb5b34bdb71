//! Connection string checks and redaction for logs.

use thiserror::Error;
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["mongodb", "mongodb+srv"];
const REDACTED: &str = "***";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("connection string is empty")]
    Empty,
    #[error("connection string must start with mongodb:// or mongodb+srv://")]
    Scheme,
    #[error("connection string has no host")]
    MissingHost,
}

/// Cheap shape check on a connection string, done before handing it to the
/// driver so a typo shows up as a configuration problem.
pub fn validate_uri(uri: &str) -> Result<(), UriError> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(UriError::Empty);
    }
    let (scheme, rest) = trimmed.split_once("://").ok_or(UriError::Scheme)?;
    if !ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return Err(UriError::Scheme);
    }
    let authority = rest.split(['/', '?']).next().unwrap_or("");
    let hosts = authority.rsplit_once('@').map_or(authority, |(_, hosts)| hosts);
    if hosts.is_empty() {
        return Err(UriError::MissingHost);
    }
    Ok(())
}

/// Replaces the password of a connection string, if any, for logging.
pub fn redact_uri(uri: &str) -> String {
    if !uri.contains('@') {
        return uri.to_string();
    }
    if let Ok(mut parsed) = Url::parse(uri) {
        if parsed.password().is_some() && parsed.set_password(Some(REDACTED)).is_ok() {
            return parsed.to_string();
        }
    }
    // seed lists (`host1,host2`) do not always parse as URLs
    redact_userinfo(uri)
}

fn redact_userinfo(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => {
            let user = userinfo.split(':').next().unwrap_or("");
            if userinfo.contains(':') {
                format!("{}://{}:{}@{}{}", scheme, user, REDACTED, hosts, tail)
            } else {
                format!("{}://{}@{}{}", scheme, user, hosts, tail)
            }
        }
        None => uri.to_string(),
    }
}
