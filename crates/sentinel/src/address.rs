//! Payment address checks.
//!
//! Payment addresses are base58check encoded: one version byte, a 20 byte
//! key hash and a 4 byte checksum taken from the double SHA-256 of the first
//! 21 bytes. Only single-signature (pubkey hash) versions are accepted for
//! governance payouts.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const BASE58_ALPHABET: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of a decoded address: version, key hash and checksum
const DECODED_LEN: usize = 25;
const CHECKSUM_LEN: usize = 4;

#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58 character {0:?}")]
    InvalidCharacter(char),
    #[error("Decoded address has length {0}, expected {DECODED_LEN}")]
    InvalidLength(usize),
    #[error("Address checksum mismatch")]
    ChecksumMismatch,
    #[error("Multisig addresses cannot receive governance payments")]
    Multisig,
    #[error("Address version {found} is not a {network} pubkey hash")]
    WrongVersion { found: u8, network: Network },
    #[error("Unknown network {0:?}")]
    UnknownNetwork(String),
}

/// The chain a node is running on
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Main network
    #[default]
    Mainnet,
    /// Test network
    Testnet,
}

impl Network {
    /// Version byte of single-signature addresses
    pub fn pubkey_hash_version(&self) -> u8 {
        match self {
            Network::Mainnet => 76,
            Network::Testnet => 140,
        }
    }

    /// Version byte of script (multisig) addresses. These are never valid
    /// payment addresses.
    pub fn script_hash_version(&self) -> u8 {
        match self {
            Network::Mainnet => 16,
            Network::Testnet => 19,
        }
    }

    /// Default daemon RPC port
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Network::Mainnet => 9998,
            Network::Testnet => 19998,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(AddressError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Decode a base58 string into bytes, keeping leading zero bytes encoded as
/// `1`s.
#[allow(clippy::arithmetic_side_effects)]
pub fn decode_base58(input: &str) -> Result<Vec<u8>, AddressError> {
    // big-endian base-256 accumulator
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.chars() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|&a| char::from(a) == c)
            .ok_or(AddressError::InvalidCharacter(c))?;
        let mut carry = digit;
        for byte in bytes.iter_mut().rev() {
            carry += usize::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let leading_zeros = input.chars().take_while(|&c| c == '1').count();
    let mut out = vec![0u8; leading_zeros];
    out.extend(bytes);
    Ok(out)
}

/// Double SHA-256 checksum of an address payload
fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Check that `address` is a well-formed single-signature address of the
/// given network.
pub fn validate_address(
    address: &str,
    network: Network,
) -> Result<(), AddressError> {
    let decoded = decode_base58(address)?;
    if decoded.len() != DECODED_LEN {
        return Err(AddressError::InvalidLength(decoded.len()));
    }
    let (payload, check) = decoded.split_at(DECODED_LEN - CHECKSUM_LEN);
    if checksum(payload) != check {
        return Err(AddressError::ChecksumMismatch);
    }
    let version = payload[0];
    if version == network.script_hash_version() {
        return Err(AddressError::Multisig);
    }
    if version != network.pubkey_hash_version() {
        return Err(AddressError::WrongVersion {
            found: version,
            network,
        });
    }
    Ok(())
}

/// Boolean form of [`validate_address`]
pub fn is_valid_address(address: &str, network: Network) -> bool {
    validate_address(address, network).is_ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_address(
            "XpjStRH8SgA6PjgebtPZqCa9y7hLXP767n",
            Network::Mainnet
        ));
        assert!(is_valid_address(
            "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui",
            Network::Testnet
        ));
        assert!(is_valid_address(
            "XagqqFetxiDb9wbartKDrXgnqLah6SqX2S",
            Network::Mainnet
        ));
    }

    #[test]
    fn test_wrong_network() {
        assert_matches!(
            validate_address(
                "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui",
                Network::Mainnet
            ),
            Err(AddressError::WrongVersion { found: 140, .. })
        );
    }

    #[test]
    fn test_multisig_rejected() {
        assert_matches!(
            validate_address(
                "7SQfxmMEhETVQuHwTQ3XMS11AkrcJwJS18",
                Network::Mainnet
            ),
            Err(AddressError::Multisig)
        );
        assert_matches!(
            validate_address(
                "8eRUv6F6pmr7sCiCXf3UoopN4GdSSt6SgR",
                Network::Testnet
            ),
            Err(AddressError::Multisig)
        );
    }

    #[test]
    fn test_corrupted_addresses() {
        // last character changed
        assert_matches!(
            validate_address(
                "XpjStRH8SgA6PjgebtPZqCa9y7hLXP767m",
                Network::Mainnet
            ),
            Err(AddressError::ChecksumMismatch)
        );
        assert_matches!(
            validate_address("XpjStRH8SgA6PjgebtPZqCa0", Network::Mainnet),
            Err(AddressError::InvalidCharacter('0'))
        );
        assert_matches!(
            validate_address("Xpj", Network::Mainnet),
            Err(AddressError::InvalidLength(_))
        );
        assert!(!is_valid_address("", Network::Mainnet));
    }

    #[test]
    fn test_leading_ones_decode_to_zero_bytes() {
        assert_eq!(decode_base58("11").unwrap(), vec![0, 0]);
        assert_eq!(decode_base58("1z").unwrap(), vec![0, 57]);
    }
}
