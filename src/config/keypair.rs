//! Keypair file parsing.
//!
//! Keypair files hold a JSON array of 64 bytes: the 32-byte secret seed
//! followed by the 32-byte public key. The public half is checked against the
//! seed before the identity is accepted, and the address is its base58 form.

use crate::error::ConfigError;
use crate::models::{Identity, SecretMaterial};
use ed25519_dalek::SigningKey;
use std::fs;
use std::path::Path;
use zeroize::Zeroize;

const KEYPAIR_LEN: usize = 64;

/// Read and validate a keypair file.
pub fn read_keypair_file(path: &Path) -> Result<Identity, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }

    let mut content = fs::read_to_string(path)?;
    let parsed = parse_keypair_bytes(&content);
    content.zeroize();
    let bytes = parsed.map_err(|reason| {
        ConfigError::Malformed(format!("{}: {}", path.display(), reason))
    })?;

    let public_address = address_from_keypair(&bytes)
        .map_err(|reason| ConfigError::Malformed(format!("{}: {}", path.display(), reason)))?;

    Ok(Identity {
        public_address,
        secret_material: Some(SecretMaterial::new(bytes)),
        source: Some(path.to_path_buf()),
    })
}

fn parse_keypair_bytes(content: &str) -> Result<Vec<u8>, String> {
    let bytes: Vec<u8> = serde_json::from_str(content.trim())
        .map_err(|e| format!("expected a JSON array of bytes ({})", e))?;
    if bytes.len() != KEYPAIR_LEN {
        return Err(format!(
            "expected {} bytes, found {}",
            KEYPAIR_LEN,
            bytes.len()
        ));
    }
    Ok(bytes)
}

/// Derive the base58 address, rejecting pairs whose halves disagree.
pub fn address_from_keypair(bytes: &[u8]) -> Result<String, String> {
    let mut pair: [u8; KEYPAIR_LEN] = bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, found {}", KEYPAIR_LEN, bytes.len()))?;
    let signing_key = SigningKey::from_keypair_bytes(&pair);
    pair.zeroize();
    let signing_key =
        signing_key.map_err(|_| "public key does not match secret key".to_string())?;
    Ok(bs58::encode(signing_key.verifying_key().as_bytes()).into_string())
}

/// Check that `address` is a base58-encoded 32-byte public key.
pub fn validate_address(address: &str) -> Result<(), ConfigError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| ConfigError::Malformed(format!("'{}' is not base58: {}", address, e)))?;
    if decoded.len() != 32 {
        return Err(ConfigError::Malformed(format!(
            "'{}' decodes to {} bytes, expected 32",
            address,
            decoded.len()
        )));
    }
    Ok(())
}
