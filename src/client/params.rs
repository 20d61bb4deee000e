//! Request parameter validation (spec §4.4.2).
//!
//! The service enforces these bounds; the client validates up front so
//! malformed requests fail locally with a typed error instead of a round
//! trip. A `thiserror` enum covers this secondary/auxiliary error path
//! while the flagship error type stays hand-rolled (see
//! [`crate::error::RandomOrgError`]).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("count must be in [1,{max}], got {got}")]
    CountOutOfRange { got: i64, max: i64 },
    #[error("min ({min}) must be <= max ({max})")]
    MinGreaterThanMax { min: i64, max: i64 },
    #[error("integer bound must be in [-10^9,10^9], got {got}")]
    IntegerBoundOutOfRange { got: i64 },
    #[error("real bound must be in [-10^6,10^6], got {got}")]
    RealBoundOutOfRange { got: f64 },
    #[error("decimal places must be in [1,20], got {got}")]
    DecimalPlacesOutOfRange { got: u32 },
    #[error("significant digits must be in [2,20], got {got}")]
    SignificantDigitsOutOfRange { got: u32 },
    #[error("string length must be in [1,20], got {got}")]
    StringLengthOutOfRange { got: u32 },
    #[error("alphabet must have at most 80 code points, got {got}")]
    AlphabetTooLarge { got: usize },
    #[error("blob size in bits must be in [1,1048576] and divisible by 8, got {got}")]
    BlobSizeInvalid { got: u32 },
    #[error("blob format must be \"base64\" or \"hex\", got {got:?}")]
    InvalidBlobFormat { got: String },
    #[error("multiform array length ({got}) must equal sequence count ({expected})")]
    MultiformLengthMismatch { got: usize, expected: usize },
    #[error("display base must be one of 2, 8, 10, 16, got {got}")]
    InvalidBase { got: u8 },
    #[error("user data must be at most 1000 characters when encoded, got {got}")]
    UserDataTooLarge { got: usize },
}

pub fn validate_count(n: i64, max: i64) -> Result<(), ParamError> {
    if (1..=max).contains(&n) {
        Ok(())
    } else {
        Err(ParamError::CountOutOfRange { got: n, max })
    }
}

pub fn validate_integer_bounds(min: i64, max: i64) -> Result<(), ParamError> {
    for bound in [min, max] {
        if !(-1_000_000_000..=1_000_000_000).contains(&bound) {
            return Err(ParamError::IntegerBoundOutOfRange { got: bound });
        }
    }
    if min > max {
        return Err(ParamError::MinGreaterThanMax { min, max });
    }
    Ok(())
}

pub fn validate_base(base: u8) -> Result<(), ParamError> {
    if matches!(base, 2 | 8 | 10 | 16) {
        Ok(())
    } else {
        Err(ParamError::InvalidBase { got: base })
    }
}

pub fn validate_decimal_places(places: u32) -> Result<(), ParamError> {
    if (1..=20).contains(&places) {
        Ok(())
    } else {
        Err(ParamError::DecimalPlacesOutOfRange { got: places })
    }
}

pub fn validate_real_bound(value: f64) -> Result<(), ParamError> {
    if (-1_000_000.0..=1_000_000.0).contains(&value) {
        Ok(())
    } else {
        Err(ParamError::RealBoundOutOfRange { got: value })
    }
}

pub fn validate_significant_digits(digits: u32) -> Result<(), ParamError> {
    if (2..=20).contains(&digits) {
        Ok(())
    } else {
        Err(ParamError::SignificantDigitsOutOfRange { got: digits })
    }
}

pub fn validate_string_length(length: u32) -> Result<(), ParamError> {
    if (1..=20).contains(&length) {
        Ok(())
    } else {
        Err(ParamError::StringLengthOutOfRange { got: length })
    }
}

pub fn validate_alphabet(alphabet: &str) -> Result<(), ParamError> {
    let len = alphabet.chars().count();
    if len <= 80 {
        Ok(())
    } else {
        Err(ParamError::AlphabetTooLarge { got: len })
    }
}

pub fn validate_blob_size_bits(size_bits: u32) -> Result<(), ParamError> {
    if (1..=1_048_576).contains(&size_bits) && size_bits % 8 == 0 {
        Ok(())
    } else {
        Err(ParamError::BlobSizeInvalid { got: size_bits })
    }
}

pub fn validate_blob_format(format: &str) -> Result<(), ParamError> {
    if matches!(format, "base64" | "hex") {
        Ok(())
    } else {
        Err(ParamError::InvalidBlobFormat { got: format.to_string() })
    }
}

pub fn validate_multiform_lengths(expected: usize, lengths: &[usize]) -> Result<(), ParamError> {
    for &len in lengths {
        if len != expected {
            return Err(ParamError::MultiformLengthMismatch { got: len, expected });
        }
    }
    Ok(())
}

pub fn validate_user_data_len(encoded_len: usize) -> Result<(), ParamError> {
    if encoded_len <= 1000 {
        Ok(())
    } else {
        Err(ParamError::UserDataTooLarge { got: encoded_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_bounds() {
        assert!(validate_count(1, 10_000).is_ok());
        assert!(validate_count(10_000, 10_000).is_ok());
        assert!(validate_count(0, 10_000).is_err());
        assert!(validate_count(10_001, 10_000).is_err());
    }

    #[test]
    fn integer_bounds_reject_out_of_range_and_inverted() {
        assert!(validate_integer_bounds(0, 9).is_ok());
        assert!(validate_integer_bounds(5, 1).is_err());
        assert!(validate_integer_bounds(-2_000_000_000, 0).is_err());
    }

    #[test]
    fn blob_size_must_be_divisible_by_eight() {
        assert!(validate_blob_size_bits(8).is_ok());
        assert!(validate_blob_size_bits(1_048_576).is_ok());
        assert!(validate_blob_size_bits(5).is_err());
        assert!(validate_blob_size_bits(1_048_577).is_err());
    }

    #[test]
    fn alphabet_size_ceiling() {
        assert!(validate_alphabet(&"a".repeat(80)).is_ok());
        assert!(validate_alphabet(&"a".repeat(81)).is_err());
    }

    #[test]
    fn base_must_be_recognized() {
        for b in [2, 8, 10, 16] {
            assert!(validate_base(b).is_ok());
        }
        assert!(validate_base(7).is_err());
    }
}
