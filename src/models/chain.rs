use crate::utils::hex_ext::HexString;
use invitee_macros::InviteeBusinessError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, thiserror::Error, InviteeBusinessError)]
pub enum AddressParseError {
    #[code(1101)]
    #[error("Address must be {expected} hex chars, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[code(1102)]
    #[error("Address is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 20-byte account address, always rendered as `0x`-prefixed lowercase hex.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressParseError> {
        let raw: [u8; ADDRESS_LEN] =
            bytes
                .try_into()
                .map_err(|_| AddressParseError::InvalidLength {
                    expected: ADDRESS_LEN * 2,
                    got: bytes.len() * 2,
                })?;
        Ok(Self(raw))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_LEN * 2,
                got: digits.len(),
            });
        }
        Self::from_slice(&digits.unhex()?)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.0.hex())
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What the referral contract reports for a signer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OnChainAccount {
    pub account: Address,
    pub claimed: bool,
}

impl OnChainAccount {
    pub const UNCLAIMED: OnChainAccount = OnChainAccount {
        account: Address::ZERO,
        claimed: false,
    };

    pub fn is_registered(&self) -> bool {
        !self.account.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalises_case_and_prefix() {
        let a: Address = "0xAbCdEf0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        let b: Address = "abcdef0123456789abcdef0123456789abcdef01".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::InvalidLength { got: 4, .. })
        ));
        assert!(matches!(
            "0xzzcdef0123456789abcdef0123456789abcdef01".parse::<Address>(),
            Err(AddressParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_canonical_string() {
        let a: Address = serde_json::from_str(r#""0x00000000000000000000000000000000000000FF""#)
            .unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#""0x00000000000000000000000000000000000000ff""#
        );
        assert!(Address::ZERO.is_zero());
        assert!(!OnChainAccount::UNCLAIMED.is_registered());
    }
}
