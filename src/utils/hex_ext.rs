use hex::FromHexError;

pub trait HexString {
    fn hex(&self) -> String;
    fn hex_0x(&self) -> String;
    fn unhex(&self) -> Result<Vec<u8>, FromHexError>;
}

impl<T: AsRef<[u8]>> HexString for T {
    fn hex(&self) -> String {
        hex::encode(self.as_ref())
    }

    fn hex_0x(&self) -> String {
        format!("0x{}", hex::encode(self.as_ref()))
    }

    fn unhex(&self) -> Result<Vec<u8>, FromHexError> {
        hex::decode(self.as_ref())
    }
}

/// Strips an optional `0x`/`0X` prefix.
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Canonical form of an invite secret: lowercase hex without prefix.
pub fn normalize_hex_secret(s: &str) -> Result<String, FromHexError> {
    let digits = strip_0x(s.trim());
    if digits.is_empty() {
        return Err(FromHexError::InvalidStringLength);
    }
    hex::decode(digits)?;
    Ok(digits.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_normalisation() {
        assert_eq!(normalize_hex_secret("0xDEADbeef").unwrap(), "deadbeef");
        assert_eq!(normalize_hex_secret(" deadbeef ").unwrap(), "deadbeef");
        assert!(normalize_hex_secret("").is_err());
        assert!(normalize_hex_secret("0x").is_err());
        assert!(normalize_hex_secret("abc").is_err());
        assert!(normalize_hex_secret("not-hex!").is_err());
    }

    #[test]
    fn hex_round_trip_prefix() {
        assert_eq!([0xab_u8, 0x01].hex_0x(), "0xab01");
        assert_eq!(strip_0x("0Xff"), "ff");
    }
}
