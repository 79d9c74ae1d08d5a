// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! BIP340 identity keypairs.
//!
//! Participants, members, and the relay itself are identified by the x-only
//! public key of a secp256k1 keypair. The secret scalar is stored in its
//! even-Y-normalized form so ECDH against a peer's lifted x-only key agrees
//! in both directions.

#![forbid(unsafe_code)]

use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::schnorr::signature::Signer;
use k256::schnorr::SigningKey;
use k256::Scalar;

use crate::curve;
use crate::error::{CoreError, Result};

#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    public: [u8; 32],
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing_key = SigningKey::random(rng);
        let public = signing_key.verifying_key().to_bytes().into();
        Self {
            signing_key,
            public,
        }
    }

    /// Reconstruct a keypair from secret bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(secret)
            .map_err(|_| CoreError::Crypto("invalid secret key".into()))?;
        let public = signing_key.verifying_key().to_bytes().into();
        Ok(Self {
            signing_key,
            public,
        })
    }

    /// The x-only public key.
    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    /// The even-Y-normalized secret scalar, for the share-distribution ECDH.
    pub(crate) fn secret_scalar(&self) -> Scalar {
        let bytes: [u8; 32] = self.signing_key.to_bytes().into();
        curve::scalar_from_bytes(&bytes).expect("signing key scalar is canonical")
    }

    /// Sign a message, returning a 64-byte BIP340 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::rand_core::OsRng;

    #[test]
    fn secret_roundtrip() {
        let keypair = Keypair::generate(&mut OsRng);
        let secret: [u8; 32] = keypair.signing_key.to_bytes().into();
        let restored = Keypair::from_secret_bytes(&secret).unwrap();
        assert_eq!(keypair.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn rejects_zero_secret() {
        assert!(Keypair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn public_key_lifts_even() {
        let keypair = Keypair::generate(&mut OsRng);
        let lifted = curve::lift_x(keypair.public_bytes()).unwrap();
        let derived = k256::ProjectivePoint::GENERATOR * keypair.secret_scalar();
        assert_eq!(lifted, derived);
    }

    #[test]
    fn signature_verifies() {
        let keypair = Keypair::generate(&mut OsRng);
        let message = [7u8; 32];
        let signature = keypair.sign(&message);
        curve::schnorr_verify(keypair.public_bytes(), &message, &signature).unwrap();
    }
}
