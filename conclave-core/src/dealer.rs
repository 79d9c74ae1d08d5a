// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! **WARNING: Testing/development only. Do not use in production.**
//!
//! The trusted dealer samples the full group secret on a single machine,
//! which creates a single point of compromise during generation. The
//! production path is the distributed key generation in [`crate::dkg`],
//! where each participant contributes entropy independently and the full
//! secret never exists on any single device. This module is compiled only
//! with the `trusted-dealer` feature.

#![forbid(unsafe_code)]

use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::{ProjectivePoint, Scalar};
use zeroize::Zeroize;

use crate::curve;
use crate::dkg::{KeyPackage, MAX_SIGNERS, MIN_THRESHOLD};
use crate::error::{CoreError, Result};

/// Deal `max_signers` shares of a fresh random group secret with the given
/// threshold. Returns one [`KeyPackage`] per participant index, ascending.
pub fn deal<R: RngCore + CryptoRng>(
    threshold: u16,
    max_signers: u16,
    rng: &mut R,
) -> Result<Vec<KeyPackage>> {
    if threshold < MIN_THRESHOLD {
        return Err(CoreError::Config("threshold must be at least 2".into()));
    }
    if max_signers < threshold {
        return Err(CoreError::Config("max signers must be >= threshold".into()));
    }
    if max_signers > MAX_SIGNERS {
        return Err(CoreError::Config(format!(
            "maximum {MAX_SIGNERS} signers supported"
        )));
    }

    let mut coefficients: Vec<Scalar> = (0..threshold)
        .map(|_| curve::rand_scalar_nonzero(rng))
        .collect();
    let commitments: Vec<ProjectivePoint> = coefficients
        .iter()
        .map(|c| ProjectivePoint::GENERATOR * c)
        .collect();

    let packages = (1..=max_signers)
        .map(|index| {
            let share = curve::evaluate_polynomial(&coefficients, &curve::index_scalar(index));
            KeyPackage::new(
                index,
                share,
                commitments[0],
                commitments.clone(),
                threshold,
                max_signers,
            )
        })
        .collect();

    coefficients.zeroize();
    Ok(packages)
}
