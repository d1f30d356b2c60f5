use std::fmt;

/// Coins are whole, indivisible units. Stored as `i64` to match SQLite's
/// INTEGER affinity; a valid balance or amount is never negative.
pub type Coins = i64;

/// Parse a user-supplied coin amount.
/// Only whole numbers are accepted: "30" -> 30, "+30" -> 30, "1.5" -> error.
/// The sign is preserved so callers can report non-positive amounts precisely.
pub fn parse_coins(input: &str) -> Result<Coins, ParseCoinsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseCoinsError::Empty);
    }
    if input.contains('.') || input.contains(',') {
        return Err(ParseCoinsError::Fractional);
    }
    input.parse().map_err(|_| ParseCoinsError::InvalidFormat)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCoinsError {
    Empty,
    Fractional,
    InvalidFormat,
}

impl fmt::Display for ParseCoinsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCoinsError::Empty => write!(f, "amount is empty"),
            ParseCoinsError::Fractional => write!(f, "coins cannot be split into fractions"),
            ParseCoinsError::InvalidFormat => write!(f, "invalid coin amount"),
        }
    }
}

impl std::error::Error for ParseCoinsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coins() {
        assert_eq!(parse_coins("30"), Ok(30));
        assert_eq!(parse_coins(" 1000 "), Ok(1000));
        assert_eq!(parse_coins("+5"), Ok(5));
        assert_eq!(parse_coins("0"), Ok(0));
        assert_eq!(parse_coins("-10"), Ok(-10));
    }

    #[test]
    fn test_parse_coins_invalid() {
        assert_eq!(parse_coins(""), Err(ParseCoinsError::Empty));
        assert_eq!(parse_coins("1.5"), Err(ParseCoinsError::Fractional));
        assert_eq!(parse_coins("1,000"), Err(ParseCoinsError::Fractional));
        assert_eq!(parse_coins("ten"), Err(ParseCoinsError::InvalidFormat));
    }
}
