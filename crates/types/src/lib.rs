/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not a structurally plausible email address
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A string type that guarantees a structurally plausible email address.
///
/// Validation is deliberately conservative: exactly one `@`, a non-empty local
/// part, a dotted domain and no whitespace. It does not attempt full RFC 5321
/// parsing; deliverability is the mail system's concern, not this type's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a new `EmailAddress` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace before
    /// validation. Returns `Err(TextError::Empty)` for blank input and
    /// `Err(TextError::InvalidEmail)` for anything that fails the structural
    /// checks.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidEmail(trimmed.to_owned()));
        }
        let (local, domain) = match trimmed.split_once('@') {
            Some(parts) => parts,
            None => return Err(TextError::InvalidEmail(trimmed.to_owned())),
        };
        let domain_ok = domain.contains('.')
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || domain.is_empty() || !domain_ok {
            return Err(TextError::InvalidEmail(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmailAddress::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_address() {
        let email = EmailAddress::new("oncall@example.org").unwrap();
        assert_eq!(email.as_str(), "oncall@example.org");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let email = EmailAddress::new("  oncall@example.org\n").unwrap();
        assert_eq!(email.as_str(), "oncall@example.org");
    }

    #[test]
    fn rejects_blank_input() {
        assert!(matches!(EmailAddress::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn rejects_missing_at_sign() {
        assert!(matches!(
            EmailAddress::new("oncall.example.org"),
            Err(TextError::InvalidEmail(_))
        ));
    }

    #[test]
    fn rejects_undotted_domain() {
        assert!(matches!(
            EmailAddress::new("oncall@localhost"),
            Err(TextError::InvalidEmail(_))
        ));
    }

    #[test]
    fn rejects_interior_whitespace() {
        assert!(matches!(
            EmailAddress::new("on call@example.org"),
            Err(TextError::InvalidEmail(_))
        ));
    }

    #[test]
    fn rejects_second_at_sign() {
        assert!(matches!(
            EmailAddress::new("oncall@ward@example.org"),
            Err(TextError::InvalidEmail(_))
        ));
    }
}
