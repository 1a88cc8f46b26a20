use crate::models::chain::{ADDRESS_LEN, Address};
use crate::utils::hex_ext::HexString;
use invitee_macros::InviteeBusinessError;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

#[derive(Debug, thiserror::Error, InviteeBusinessError)]
pub enum SignerError {
    #[code(2001)]
    #[error("Secret is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[code(2002)]
    #[error("Secret is not a valid secp256k1 key: {0}")]
    InvalidKey(#[from] secp256k1::Error),
    #[code(2003)]
    #[error("Secret controls {derived}, not {claimed}")]
    AddressMismatch { derived: Address, claimed: Address },
}

/// Address controlled by a secp256k1 secret key: last 20 bytes of the Keccak-256 of the
/// uncompressed public key without its `0x04` tag.
pub fn derive_address(secret_hex: &str) -> Result<Address, SignerError> {
    let bytes = secret_hex.unhex()?;
    let key = SecretKey::from_slice(&bytes)?;
    let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &key);
    let hash = Keccak256::digest(&public.serialize_uncompressed()[1..]);
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
    Ok(Address(out))
}

pub fn verify_secret_owner(secret_hex: &str, claimed: &Address) -> Result<(), SignerError> {
    let derived = derive_address(secret_hex)?;
    if derived != *claimed {
        return Err(SignerError::AddressMismatch {
            derived,
            claimed: *claimed,
        });
    }
    Ok(())
}
