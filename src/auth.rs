use crate::schemas::WalletAddress;
use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "Wallet ";

/// Signs a wallet address with the server secret. The credential handed to the
/// client is `<address>:<hex signature>`.
pub fn issue_credential(address: &str, secret: &str) -> String {
    let signature = compute_hash(address, secret)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("{address}:{signature}")
}

/// Returns the wallet address carried by a valid `Authorization: Wallet ...` header.
pub fn check_identity(request: &HttpRequest, secret: &str) -> Option<WalletAddress> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    verify_credential(authorization.strip_prefix(SCHEME)?, secret)
}

pub fn verify_credential(credential: &str, secret: &str) -> Option<WalletAddress> {
    let (address, signature) = credential.rsplit_once(':')?;
    if address.is_empty() || signature.len() % 2 != 0 {
        return None;
    }
    let signature = signature
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;

    let mut hmac_hasher = keyed_hasher(secret);
    hmac_hasher.update(address.as_bytes());
    hmac_hasher
        .verify_slice(&signature)
        .ok()
        .map(|_| address.to_string())
}

fn compute_hash(address: &str, secret: &str) -> Vec<u8> {
    let mut hmac_hasher = keyed_hasher(secret);
    hmac_hasher.update(address.as_bytes());
    hmac_hasher.finalize().into_bytes().to_vec()
}

fn keyed_hasher(secret: &str) -> HmacSha256 {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();
    match HmacSha256::new_from_slice(&secret_hash) {
        Ok(hasher) => hasher,
        Err(_) => unreachable!("hmac takes keys of any size"),
    }
}
