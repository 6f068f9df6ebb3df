//! Wallet sign-in: EIP-191 `personal_sign` signatures over a client-chosen message.

use alloy::primitives::{Address, PrimitiveSignature};
use serde::Deserialize;

use crate::auth::session::{SessionUser, UserRole};
use crate::error::CertifiError;

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCredentials {
    pub address: Option<String>,
    pub signature: Option<String>,
    pub message: Option<String>,
    pub role: Option<UserRole>,
}

/// Recover the address that produced `signature_hex` over `message`.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<Address, CertifiError> {
    let raw = signature_hex.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw)
        .map_err(|e| CertifiError::InvalidSignature(format!("signature is not hex: {e}")))?;
    let signature = PrimitiveSignature::from_raw(&bytes).map_err(|e| {
        CertifiError::InvalidSignature(format!("expected 65 signature bytes: {e}"))
    })?;
    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| CertifiError::InvalidSignature(e.to_string()))
}

/// Case-insensitive comparison of the recovered signer against the claimed address.
pub fn signer_matches(recovered: &Address, claimed: &str) -> bool {
    let claimed = claimed.trim();
    let claimed = claimed
        .strip_prefix("0x")
        .or_else(|| claimed.strip_prefix("0X"))
        .unwrap_or(claimed);
    hex::encode(recovered.as_slice()).eq_ignore_ascii_case(claimed)
}

/// `Institution 0x1234...abcd`
pub fn display_name(address: &str) -> String {
    if address.len() <= 10 {
        return format!("Institution {address}");
    }
    format!(
        "Institution {}...{}",
        &address[..6],
        &address[address.len() - 4..]
    )
}

/// Validate the credentials and build the session user they authorize.
pub fn authorize(creds: WalletCredentials) -> Result<SessionUser, CertifiError> {
    let (Some(address), Some(signature), Some(message)) =
        (creds.address, creds.signature, creds.message)
    else {
        return Err(CertifiError::BadRequest(
            "address, signature and message are required".to_string(),
        ));
    };
    if !address.is_ascii() {
        return Err(CertifiError::BadRequest("address must be hex".to_string()));
    }

    let recovered = recover_signer(&message, &signature)?;
    if !signer_matches(&recovered, &address) {
        return Err(CertifiError::Unauthorized(
            "Signature does not match address".to_string(),
        ));
    }

    Ok(SessionUser {
        id: address.clone(),
        role: creds.role.unwrap_or(UserRole::Student),
        name: Some(display_name(&address)),
        address: Some(address),
        email: None,
        image: None,
        approved: true,
    })
}
