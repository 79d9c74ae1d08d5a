// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Threshold root identity for online communities.
//!
//! A community's root key is produced by distributed key generation, held
//! as Shamir-style shares by a quorum of administrators, and used through
//! FROST-style threshold signing. The root key authorizes member pubkeys
//! through signed capability grants. This crate is the cryptographic and
//! protocol substrate:
//!
//! - **Curve primitives** over secp256k1 (`curve`, `keys`)
//! - **DKG engine** with verifiable secret sharing (`dkg`)
//! - **Proactive share refresh** preserving the group key (`refresh`)
//! - **Two-round threshold signing** producing BIP340 signatures (`signing`)
//! - **Capability model** with delegation and revocation (`capability`)
//!
//! The engines are pure state transitions on per-session state: callers
//! supply serialized message ingress per session and own the sessions'
//! lifetimes. Dropping a session zeroizes its ephemeral secrets.

#![forbid(unsafe_code)]

/// Capability records, authorization decisions, and delegation validation.
pub mod capability;
/// Authenticated encryption for share distribution.
pub mod cipher;
/// secp256k1 scalar/point primitives and tagged hashing.
pub mod curve;
/// Single-machine share generation. Development only.
#[cfg(feature = "trusted-dealer")]
pub mod dealer;
/// Pedersen DKG with verifiable secret sharing.
pub mod dkg;
/// Error types and result aliases.
pub mod error;
/// BIP340 identity keypairs.
pub mod keys;
/// Proactive share rotation.
pub mod refresh;
/// Two-round FROST threshold signing.
pub mod signing;

pub use dkg::{DkgConfig, DkgSession, DkgState, KeyPackage};
pub use error::{CoreError, Result};
pub use keys::Keypair;
pub use signing::{sign_with_packages, SigningSession, SigningState};
