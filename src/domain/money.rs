use thiserror::Error;

/// Amounts are integer minor units. 1000.00 TRY is stored as 100000.
pub type Cents = i64;

/// Currency used when a record does not name one.
pub const DEFAULT_CURRENCY: &str = "TRY";

/// Largest amount a single record may carry (10 billion in major units).
/// Keeps ledger-wide sums far from `i64` overflow.
pub const MAX_AMOUNT_CENTS: Cents = 1_000_000_000_000;

/// True for amounts a record may carry: positive and at most
/// [`MAX_AMOUNT_CENTS`].
pub fn is_valid_amount(cents: Cents) -> bool {
    (1..=MAX_AMOUNT_CENTS).contains(&cents)
}

/// Render cents with two fractional digits: 150050 -> "1500.50".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Render cents followed by the currency code: "1500.50 TRY".
pub fn format_amount(cents: Cents, currency: &str) -> String {
    format!("{} {}", format_cents(cents), currency)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAmountError {
    #[error("invalid amount: {0:?}")]
    InvalidFormat(String),

    #[error("amount must be positive: {0:?}")]
    NotPositive(String),

    #[error("amount has more than two decimal places: {0:?}")]
    TooPrecise(String),

    #[error("amount exceeds the maximum of 10000000000.00: {0:?}")]
    TooLarge(String),
}

/// Parse a user-entered decimal amount into cents.
///
/// Accepts `"1000"`, `"12.5"` and `"12.50"`; a comma works as the decimal separator.
/// Zero and negative amounts are rejected: every record-level amount in the
/// ledger is strictly positive.
pub fn parse_amount(input: &str) -> Result<Cents, ParseAmountError> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(ParseAmountError::NotPositive(trimmed.to_string()));
    }

    let normalized = trimmed.replace(',', ".");
    let (units, fraction) = match normalized.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (normalized.as_str(), ""),
    };

    let invalid = || ParseAmountError::InvalidFormat(trimmed.to_string());
    if units.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !units.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > 2 {
        return Err(ParseAmountError::TooPrecise(trimmed.to_string()));
    }

    let whole: i64 = if units.is_empty() {
        0
    } else {
        units.parse().map_err(|_| invalid())?
    };
    let minor: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    let too_large = || ParseAmountError::TooLarge(trimmed.to_string());
    let cents = whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(minor))
        .ok_or_else(too_large)?;
    if cents == 0 {
        return Err(ParseAmountError::NotPositive(trimmed.to_string()));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(too_large());
    }
    Ok(cents)
}
