//! Credential normalization before SCRAM key derivation.
use std::borrow::Cow;

/// How a password is normalized before it is hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringPreparation {
    /// Strip ASCII control characters, reject anything outside US-ASCII.
    None,
    /// RFC 4013 SASLprep profile.
    #[default]
    SaslPrep,
}

/// Credential rejected by [`StringPreparation::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StringPrepError {
    /// Input is empty, or nothing is left after normalization.
    #[error("credential is empty")]
    EmptyCredential,
    /// Input contains a character the preparation profile prohibits.
    #[error("credential contains prohibited characters")]
    InvalidCredentialFormat,
}

impl StringPreparation {
    /// Normalize `value` according to the preparation profile.
    pub fn normalize(self, value: &str) -> Result<Cow<'_, str>, StringPrepError> {
        if value.is_empty() {
            return Err(StringPrepError::EmptyCredential);
        }

        let normalized = match self {
            StringPreparation::None => to_printable(value)?,
            StringPreparation::SaslPrep => {
                stringprep::saslprep(value).map_err(|_| StringPrepError::InvalidCredentialFormat)?
            }
        };

        if normalized.is_empty() {
            return Err(StringPrepError::EmptyCredential);
        }

        Ok(normalized)
    }
}

fn to_printable(value: &str) -> Result<Cow<'_, str>, StringPrepError> {
    if !value.is_ascii() {
        return Err(StringPrepError::InvalidCredentialFormat);
    }
    if !value.bytes().any(|b| b.is_ascii_control()) {
        return Ok(Cow::Borrowed(value));
    }
    Ok(Cow::Owned(value.chars().filter(|c| !c.is_ascii_control()).collect()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn none_strips_control() {
        let prep = StringPreparation::None;
        assert_eq!(prep.normalize("pen\tcil\x7f").unwrap(), "pencil");
        assert!(matches!(prep.normalize("pencil").unwrap(), Cow::Borrowed("pencil")));
    }

    #[test]
    fn none_rejects_non_ascii() {
        let err = StringPreparation::None.normalize("pässword").unwrap_err();
        assert_eq!(err, StringPrepError::InvalidCredentialFormat);
    }

    #[test]
    fn empty_credential() {
        for prep in [StringPreparation::None, StringPreparation::SaslPrep] {
            assert_eq!(prep.normalize("").unwrap_err(), StringPrepError::EmptyCredential);
        }
        assert_eq!(
            StringPreparation::None.normalize("\x01\x02\x1f").unwrap_err(),
            StringPrepError::EmptyCredential,
        );
    }

    #[test]
    fn saslprep() {
        let prep = StringPreparation::SaslPrep;
        // non-ASCII space maps to space, soft hyphen maps to nothing
        assert_eq!(prep.normalize("I\u{00AD}X").unwrap(), "IX");
        assert_eq!(prep.normalize("a\u{00A0}b").unwrap(), "a b");
        assert_eq!(prep.normalize("\u{2168}").unwrap(), "IX");
        assert_eq!(prep.normalize("\u{0007}").unwrap_err(), StringPrepError::InvalidCredentialFormat);
    }
}
