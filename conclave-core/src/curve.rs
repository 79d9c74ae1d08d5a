// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! secp256k1 scalar and point primitives.
//!
//! Everything upstream (DKG, signing, refresh) speaks in the two canonical
//! encodings: 32-byte big-endian scalars mod the curve order and 33-byte
//! SEC1 compressed points. BIP340-tagged hashing lives here too so every
//! module derives challenges and binding factors the same way.

#![forbid(unsafe_code)]

use k256::elliptic_curve::generic_array::GenericArray;
use k256::elliptic_curve::group::GroupEncoding;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, ProjectivePoint, Scalar, U256};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Canonical scalar exchange width.
pub const SCALAR_LEN: usize = 32;
/// Canonical compressed point exchange width.
pub const POINT_LEN: usize = 33;

/// BIP340 challenge tag. Aggregated group signatures verify under the same
/// challenge as single-signer Schnorr signatures.
pub const CHALLENGE_TAG: &str = "BIP0340/challenge";

/// Sample a uniformly random nonzero scalar.
pub fn rand_scalar_nonzero<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let candidate = Scalar::random(&mut *rng);
        if !bool::from(candidate.is_zero()) {
            return candidate;
        }
    }
}

/// Decode a scalar, rejecting values >= the curve order.
pub fn scalar_from_bytes(bytes: &[u8; SCALAR_LEN]) -> Result<Scalar> {
    Option::<Scalar>::from(Scalar::from_repr((*bytes).into())).ok_or(CoreError::ScalarRange)
}

/// Decode a scalar that must be usable as a secret: in range and nonzero.
pub fn secret_scalar_from_bytes(bytes: &[u8; SCALAR_LEN]) -> Result<Scalar> {
    let scalar = scalar_from_bytes(bytes)?;
    if bool::from(scalar.is_zero()) {
        return Err(CoreError::ZeroScalar);
    }
    Ok(scalar)
}

pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    scalar.to_bytes().into()
}

/// Decode a 33-byte SEC1 compressed point, rejecting off-curve encodings.
pub fn point_from_bytes(bytes: &[u8; POINT_LEN]) -> Result<ProjectivePoint> {
    let affine =
        Option::<AffinePoint>::from(AffinePoint::from_bytes(GenericArray::from_slice(bytes)))
            .ok_or(CoreError::InvalidPoint)?;
    Ok(ProjectivePoint::from(affine))
}

pub fn point_to_bytes(point: &ProjectivePoint) -> [u8; POINT_LEN] {
    let mut out = [0u8; POINT_LEN];
    out.copy_from_slice(&point.to_affine().to_bytes());
    out
}

/// The x coordinate of a point, as used for BIP340 public keys.
pub fn x_only(point: &ProjectivePoint) -> [u8; SCALAR_LEN] {
    point.to_affine().x().into()
}

pub fn has_even_y(point: &ProjectivePoint) -> bool {
    !bool::from(point.to_affine().y_is_odd())
}

/// Reconstruct the even-Y point with the given x coordinate.
pub fn lift_x(x: &[u8; SCALAR_LEN]) -> Result<ProjectivePoint> {
    let mut compressed = [0u8; POINT_LEN];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(x);
    point_from_bytes(&compressed)
}

/// BIP340-style tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, chunks: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}

/// Tagged hash reduced to a scalar mod the curve order.
pub fn hash_to_scalar(tag: &str, chunks: &[&[u8]]) -> Scalar {
    let digest = tagged_hash(tag, chunks);
    <Scalar as Reduce<U256>>::reduce_bytes(&digest.into())
}

/// Horner evaluation of `f(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1}`.
pub fn evaluate_polynomial(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut acc = Scalar::ZERO;
    for coeff in coefficients.iter().rev() {
        acc = acc * x + coeff;
    }
    acc
}

pub fn index_scalar(index: u16) -> Scalar {
    Scalar::from(index as u64)
}

/// Horner evaluation in the exponent: `Σ_k C_k · x^k` for commitment points
/// `C_k = a_k · G`. Used for VSS checks and deriving verifying shares.
pub fn evaluate_commitments(commitments: &[ProjectivePoint], index: u16) -> ProjectivePoint {
    let x = index_scalar(index);
    let mut acc = ProjectivePoint::IDENTITY;
    for commitment in commitments.iter().rev() {
        acc = acc * x + commitment;
    }
    acc
}

/// Lagrange coefficient at zero for `index` within `indices`.
pub fn lagrange_coefficient(index: u16, indices: &[u16]) -> Result<Scalar> {
    let x_i = index_scalar(index);

    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in indices {
        if other == index {
            continue;
        }
        let x_j = index_scalar(other);
        numerator *= x_j;
        denominator *= x_j - x_i;
    }

    let inverse = Option::<Scalar>::from(denominator.invert())
        .ok_or_else(|| CoreError::Protocol("Lagrange coefficient: zero denominator".into()))?;

    Ok(numerator * inverse)
}

/// BIP340 Schnorr verification of `signature` over `message` under the
/// x-only key `pubkey_x`.
pub fn schnorr_verify(
    pubkey_x: &[u8; 32],
    message: &[u8; 32],
    signature: &[u8; 64],
) -> Result<()> {
    let pubkey = lift_x(pubkey_x)?;

    let mut r_x = [0u8; 32];
    r_x.copy_from_slice(&signature[..32]);
    let r = lift_x(&r_x)?;

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);
    let s = scalar_from_bytes(&s_bytes)?;

    let challenge = hash_to_scalar(CHALLENGE_TAG, &[&r_x, pubkey_x, message]);

    if ProjectivePoint::GENERATOR * s == r + pubkey * challenge {
        Ok(())
    } else {
        Err(CoreError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::rand_core::OsRng;

    #[test]
    fn scalar_roundtrip() {
        let scalar = rand_scalar_nonzero(&mut OsRng);
        let bytes = scalar_to_bytes(&scalar);
        assert_eq!(scalar_from_bytes(&bytes).unwrap(), scalar);
    }

    #[test]
    fn scalar_rejects_order() {
        // The curve order itself is out of range.
        let order: [u8; 32] = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c,
            0xd0, 0x36, 0x41, 0x41,
        ];
        assert!(matches!(
            scalar_from_bytes(&order),
            Err(CoreError::ScalarRange)
        ));
    }

    #[test]
    fn secret_scalar_rejects_zero() {
        assert!(matches!(
            secret_scalar_from_bytes(&[0u8; 32]),
            Err(CoreError::ZeroScalar)
        ));
    }

    #[test]
    fn point_roundtrip() {
        let scalar = rand_scalar_nonzero(&mut OsRng);
        let point = ProjectivePoint::GENERATOR * scalar;
        let bytes = point_to_bytes(&point);
        assert_eq!(point_from_bytes(&bytes).unwrap(), point);
    }

    #[test]
    fn point_rejects_off_curve() {
        let mut bytes = [0u8; POINT_LEN];
        bytes[0] = 0x02;
        bytes[1..].copy_from_slice(&[0xff; 32]);
        assert!(point_from_bytes(&bytes).is_err());
    }

    #[test]
    fn lift_x_is_even() {
        let scalar = rand_scalar_nonzero(&mut OsRng);
        let point = ProjectivePoint::GENERATOR * scalar;
        let lifted = lift_x(&x_only(&point)).unwrap();
        assert!(has_even_y(&lifted));
        assert_eq!(x_only(&lifted), x_only(&point));
    }

    #[test]
    fn tagged_hash_separates_domains() {
        let a = tagged_hash("conclave/a", &[b"data"]);
        let b = tagged_hash("conclave/b", &[b"data"]);
        assert_ne!(a, b);
    }

    #[test]
    fn polynomial_and_commitments_agree() {
        let coefficients: Vec<Scalar> = (0..3).map(|_| rand_scalar_nonzero(&mut OsRng)).collect();
        let commitments: Vec<ProjectivePoint> = coefficients
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect();

        for index in 1u16..=5 {
            let eval = evaluate_polynomial(&coefficients, &index_scalar(index));
            let expected = ProjectivePoint::GENERATOR * eval;
            assert_eq!(evaluate_commitments(&commitments, index), expected);
        }
    }

    #[test]
    fn lagrange_interpolates_at_zero() {
        // f(x) = 7 + 3x: f(1) = 10, f(2) = 13, and the weighted sum recovers 7.
        let shares = [(1u16, Scalar::from(10u64)), (2u16, Scalar::from(13u64))];
        let indices = [1u16, 2];

        let mut acc = Scalar::ZERO;
        for (index, value) in shares {
            acc += lagrange_coefficient(index, &indices).unwrap() * value;
        }
        assert_eq!(acc, Scalar::from(7u64));
    }

    #[test]
    fn schnorr_verify_accepts_single_signer() {
        use crate::keys::Keypair;

        let keypair = Keypair::generate(&mut OsRng);
        let message = [0x42u8; 32];
        let signature = keypair.sign(&message);
        schnorr_verify(keypair.public_bytes(), &message, &signature).unwrap();

        let mut tampered = signature;
        tampered[40] ^= 0x01;
        assert!(schnorr_verify(keypair.public_bytes(), &message, &tampered).is_err());
    }
}
