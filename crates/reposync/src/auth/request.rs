//! The outgoing request an authentication strategy signs.

use secrecy::SecretString;

use super::error::{AuthError, Result};

/// HTTP basic credentials.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Authentication material for one outgoing request.
///
/// The git backend turns this into transport-level credentials: basic
/// credentials answer the credential challenge and headers are sent with
/// every HTTP request of the operation.
#[derive(Debug, Clone, Default)]
pub struct OutgoingRequest {
    basic_auth: Option<BasicCredentials>,
    headers: Vec<(String, String)>,
}

impl OutgoingRequest {
    /// Creates an unsigned request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets HTTP basic credentials, replacing any previous ones.
    pub fn set_basic_auth(&mut self, username: impl Into<String>, password: SecretString) {
        self.basic_auth = Some(BasicCredentials {
            username: username.into(),
            password,
        });
    }

    /// Returns the basic credentials, if any.
    pub fn basic_auth(&self) -> Option<&BasicCredentials> {
        self.basic_auth.as_ref()
    }

    /// Sets a header, replacing an existing header of the same name
    /// (compared case-insensitively).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Looks up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns all headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Renders headers as `Name: value` lines.
    pub fn header_lines(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect()
    }

    /// Returns true if neither credentials nor headers are set.
    pub fn is_empty(&self) -> bool {
        self.basic_auth.is_none() && self.headers.is_empty()
    }
}

/// Parses a `Name: value` header line.
///
/// The line is split on the first colon and both halves are trimmed, so
/// values may themselves contain colons.
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| AuthError::InvalidHeader(line.to_string()))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(AuthError::InvalidHeader(line.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
