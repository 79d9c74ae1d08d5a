// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authenticated encryption for share distribution.
//!
//! Round-2 shares travel encrypted under a conversation key derived from
//! ECDH between the sender's static secret and the recipient's static
//! public key, passed through a tagged KDF. The AEAD binds the session id
//! and round as associated data, so a ciphertext replayed into a different
//! session or round fails authentication.

#![forbid(unsafe_code)]

use blake2::{Blake2b512, Digest};
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::XChaCha20Poly1305;
use rand::RngCore;

use crate::curve;
use crate::error::{CoreError, Result};
use crate::keys::Keypair;

/// XChaCha20-Poly1305 nonce size.
pub const NONCE_LEN: usize = 24;
/// Poly1305 authentication tag size.
pub const TAG_LEN: usize = 16;

const CONVERSATION_TAG: &str = "conclave/share/conversation-key";

/// Derive the symmetric conversation key between this keypair and a peer's
/// x-only public key. Symmetric: both directions produce the same key.
pub fn conversation_key(local: &Keypair, peer_x: &[u8; 32]) -> Result<[u8; 32]> {
    let peer = curve::lift_x(peer_x)?;
    let shared = peer * local.secret_scalar();
    let shared_bytes = curve::point_to_bytes(&shared);
    Ok(curve::tagged_hash(CONVERSATION_TAG, &[&shared_bytes]))
}

/// Associated data binding a ciphertext to one session and round.
pub fn share_aad(session_id: &[u8; 32], round: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(32 + round.len());
    aad.extend_from_slice(session_id);
    aad.extend_from_slice(round.as_bytes());
    aad
}

/// Encrypt with XChaCha20-Poly1305. Output framing is `nonce || ciphertext`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            GenericArray::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CoreError::Crypto("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext` produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], bytes: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < NONCE_LEN + TAG_LEN {
        return Err(CoreError::Crypto("ciphertext too short".into()));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    cipher
        .decrypt(
            GenericArray::from_slice(&bytes[..NONCE_LEN]),
            Payload {
                msg: &bytes[NONCE_LEN..],
                aad,
            },
        )
        .map_err(|_| CoreError::Crypto("decryption failed".into()))
}

/// Compute Blake2b-256 of data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    let result = hasher.finalize();

    let mut output = [0u8; 32];
    output.copy_from_slice(&result[..32]);
    output
}

/// Generate cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}
