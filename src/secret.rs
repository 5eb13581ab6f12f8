use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::Zeroize;

const REDACTED: &str = "[REDACTED]";

/// SSH password as read from flags or the config file.
///
/// Formatting never reveals the value and the buffer is wiped on drop.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Only for handing the password to the SSH session.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// An empty password is treated as "not configured".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_never_formatted() {
        let secret = SecretString::new("enable-pass");
        assert_eq!(format!("{:?}", secret), REDACTED);
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(format!("{:?}", Some(secret.clone())), "Some([REDACTED])");
        assert_eq!(secret.expose(), "enable-pass");
    }

    #[test]
    fn test_password_from_yaml() {
        let secret: SecretString = serde_yaml::from_str("\"s3cret\"").unwrap();
        assert_eq!(secret.expose(), "s3cret");
        assert!(!secret.is_empty());

        let empty: SecretString = serde_yaml::from_str("''").unwrap();
        assert!(empty.is_empty());
    }
}
