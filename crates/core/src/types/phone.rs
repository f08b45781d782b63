//! E.164 phone number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when normalizing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Could not be coerced into E.164.
    #[error("Phone number must be a valid E.164 phone number.")]
    InvalidE164,
    /// Not a 10-digit US number.
    #[error("Phone number must be a valid 10-digit US number.")]
    InvalidUsNumber,
}

/// A phone number in E.164 form (`+` followed by 6-15 digits).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhoneNumber(String);

const MIN_DIGITS: usize = 6;
const MAX_DIGITS: usize = 15;

impl PhoneNumber {
    /// Coerce loosely formatted input into E.164.
    ///
    /// - Input starting with `+` keeps its digits as the full number.
    /// - Exactly ten digits are treated as a US number and get `+1`.
    /// - Any other 6-15 digit input gets a bare `+` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneError::InvalidE164`] when the digit count falls outside
    /// 6-15.
    ///
    /// ```
    /// use artfulfam_core::PhoneNumber;
    ///
    /// assert_eq!(PhoneNumber::to_e164("(555) 123-4567").unwrap().as_str(), "+15551234567");
    /// assert_eq!(PhoneNumber::to_e164("+44 20 7946 0958").unwrap().as_str(), "+442079460958");
    /// assert!(PhoneNumber::to_e164("123").is_err());
    /// ```
    pub fn to_e164(input: &str) -> Result<Self, PhoneError> {
        let trimmed = input.trim();
        let digits = digits_of(trimmed);

        if trimmed.starts_with('+') || digits.len() != 10 {
            if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
                return Err(PhoneError::InvalidE164);
            }
            return Ok(Self(format!("+{digits}")));
        }

        Ok(Self(format!("+1{digits}")))
    }

    /// Accept only a 10-digit US number, returned as `+1XXXXXXXXXX`.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneError::InvalidUsNumber`] unless exactly ten digits remain
    /// after stripping formatting.
    pub fn us_ten_digit(input: &str) -> Result<Self, PhoneError> {
        let digits = digits_of(input);
        if digits.len() != 10 {
            return Err(PhoneError::InvalidUsNumber);
        }
        Ok(Self(format!("+1{digits}")))
    }

    /// Returns the E.164 string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn digits_of(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits_become_us() {
        assert_eq!(
            PhoneNumber::to_e164("555.123.4567").unwrap().as_str(),
            "+15551234567"
        );
    }

    #[test]
    fn test_plus_prefixed_keeps_country_code() {
        assert_eq!(
            PhoneNumber::to_e164("+1 (555) 123-4567").unwrap().as_str(),
            "+15551234567"
        );
        // A leading + with ten digits is not reinterpreted as US.
        assert_eq!(
            PhoneNumber::to_e164("+5551234567").unwrap().as_str(),
            "+5551234567"
        );
    }

    #[test]
    fn test_other_lengths_get_plus() {
        assert_eq!(
            PhoneNumber::to_e164("442079460958").unwrap().as_str(),
            "+442079460958"
        );
    }

    #[test]
    fn test_digit_bounds() {
        assert_eq!(PhoneNumber::to_e164("12345"), Err(PhoneError::InvalidE164));
        assert!(PhoneNumber::to_e164("123456").is_ok());
        assert!(PhoneNumber::to_e164("+123456789012345").is_ok());
        assert_eq!(
            PhoneNumber::to_e164("+1234567890123456"),
            Err(PhoneError::InvalidE164)
        );
        assert_eq!(PhoneNumber::to_e164(""), Err(PhoneError::InvalidE164));
    }

    #[test]
    fn test_us_ten_digit() {
        assert_eq!(
            PhoneNumber::us_ten_digit("555-123-4567").unwrap().as_str(),
            "+15551234567"
        );
        assert_eq!(
            PhoneNumber::us_ten_digit("+1 555 123 4567"),
            Err(PhoneError::InvalidUsNumber)
        );
    }
}
