// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Two-round FROST threshold signing.
//!
//! Round 1 publishes per-signer nonce commitment pairs. Once the full
//! quorum's commitments are in, every signer derives the binding factors,
//! the group commitment `R`, and the BIP340 challenge, then releases a
//! Lagrange-weighted partial signature. Partials are verified against the
//! committed nonces and the VSS-derived verifying shares before they are
//! accepted; the aggregate is released only if it verifies as an ordinary
//! BIP340 signature under the x-only group key.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::{ProjectivePoint, Scalar};
use tracing::debug;
use zeroize::Zeroize;

use crate::cipher;
use crate::curve;
use crate::dkg::KeyPackage;
use crate::error::{CoreError, Result, SigningFault};

const BINDING_TAG: &str = "conclave/frost/binding";

/// Round-1 broadcast: hidden and binding nonce commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCommitment {
    pub sender: u16,
    pub hidden: [u8; 33],
    pub binder: [u8; 33],
}

/// Round-2 broadcast: one signer's partial signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    pub sender: u16,
    pub z: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    CollectingNonces,
    CollectingPartials,
    Complete,
    Failed,
}

struct SecretNonces {
    hidden: Scalar,
    binder: Scalar,
}

impl Drop for SecretNonces {
    fn drop(&mut self) {
        self.hidden.zeroize();
        self.binder.zeroize();
    }
}

/// Cached signing context, fixed once every quorum commitment is in.
struct Context {
    binding: BTreeMap<u16, Scalar>,
    group_commitment: ProjectivePoint,
    challenge: Scalar,
    negate_nonce: bool,
    negate_share: bool,
}

/// One signer's session for a single message.
///
/// Nonces are single-use: producing a partial signature consumes them, and
/// a session can never sign twice.
pub struct SigningSession {
    session_id: [u8; 32],
    message: [u8; 32],
    key_package: KeyPackage,
    signer_indices: Vec<u16>,
    state: SigningState,
    secret_nonces: Option<SecretNonces>,
    commitments: BTreeMap<u16, (ProjectivePoint, ProjectivePoint)>,
    partials: BTreeMap<u16, Scalar>,
    context: Option<Context>,
    signature: Option<[u8; 64]>,
}

impl SigningSession {
    pub fn new(
        key_package: KeyPackage,
        message: [u8; 32],
        mut signer_indices: Vec<u16>,
    ) -> Result<Self> {
        signer_indices.sort_unstable();
        signer_indices.dedup();

        let threshold = key_package.threshold() as usize;
        if signer_indices.len() < threshold {
            return Err(CoreError::NotEnoughShares {
                needed: threshold,
                available: signer_indices.len(),
            });
        }
        if signer_indices
            .iter()
            .any(|&i| i == 0 || i > key_package.max_signers())
        {
            return Err(CoreError::Config("signer index out of range".into()));
        }
        if !signer_indices.contains(&key_package.index()) {
            return Err(CoreError::Config(
                "local index not in the signer set".into(),
            ));
        }

        let mut preimage = Vec::with_capacity(80);
        preimage.extend_from_slice(&message);
        preimage.extend_from_slice(&key_package.group_pubkey_xonly());
        preimage.extend_from_slice(&cipher::random_bytes::<16>());
        let session_id = cipher::blake2b_256(&preimage);

        Ok(Self {
            session_id,
            message,
            key_package,
            signer_indices,
            state: SigningState::CollectingNonces,
            secret_nonces: None,
            commitments: BTreeMap::new(),
            partials: BTreeMap::new(),
            context: None,
            signature: None,
        })
    }

    pub fn session_id(&self) -> &[u8; 32] {
        &self.session_id
    }

    pub fn state(&self) -> SigningState {
        self.state
    }

    pub fn signer_indices(&self) -> &[u16] {
        &self.signer_indices
    }

    /// Nonce commitments still missing from the quorum.
    pub fn nonces_needed(&self) -> usize {
        self.signer_indices.len() - self.commitments.len()
    }

    /// Partial signatures still missing from the quorum.
    pub fn partials_needed(&self) -> usize {
        self.signer_indices.len() - self.partials.len()
    }

    /// Draw the local nonce pair and publish its commitments. Single use.
    pub fn commit<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<NonceCommitment> {
        if self.state != SigningState::CollectingNonces {
            return Err(CoreError::SessionState("not collecting nonce commitments"));
        }
        if self.secret_nonces.is_some() {
            return Err(CoreError::SessionState("commitment already generated"));
        }

        let hidden = curve::rand_scalar_nonzero(rng);
        let binder = curve::rand_scalar_nonzero(rng);
        let hidden_point = ProjectivePoint::GENERATOR * hidden;
        let binder_point = ProjectivePoint::GENERATOR * binder;

        let my_index = self.key_package.index();
        self.secret_nonces = Some(SecretNonces { hidden, binder });
        self.commitments
            .insert(my_index, (hidden_point, binder_point));
        self.check_nonces_complete();

        Ok(NonceCommitment {
            sender: my_index,
            hidden: curve::point_to_bytes(&hidden_point),
            binder: curve::point_to_bytes(&binder_point),
        })
    }

    /// Ingest a peer's nonce commitment. Idempotent for identical re-sends.
    pub fn ingest_nonce(&mut self, commitment: &NonceCommitment) -> Result<()> {
        if !matches!(
            self.state,
            SigningState::CollectingNonces | SigningState::CollectingPartials
        ) {
            return Err(CoreError::SessionState("not collecting nonce commitments"));
        }

        let sender = commitment.sender;
        if !self.signer_indices.contains(&sender) {
            return Err(CoreError::Signing {
                peer: sender,
                fault: SigningFault::NotInQuorum,
            });
        }

        let hidden = curve::point_from_bytes(&commitment.hidden).map_err(|_| {
            CoreError::Signing {
                peer: sender,
                fault: SigningFault::Encoding,
            }
        })?;
        let binder = curve::point_from_bytes(&commitment.binder).map_err(|_| {
            CoreError::Signing {
                peer: sender,
                fault: SigningFault::Encoding,
            }
        })?;

        if let Some(existing) = self.commitments.get(&sender) {
            if *existing != (hidden, binder) {
                return Err(CoreError::Signing {
                    peer: sender,
                    fault: SigningFault::NonceMismatch,
                });
            }
            return Ok(());
        }

        self.commitments.insert(sender, (hidden, binder));
        self.check_nonces_complete();
        Ok(())
    }

    /// Produce the local partial signature. Requires the full quorum's
    /// nonces; consumes the local secret nonces; self-verifies before
    /// release.
    pub fn sign(&mut self) -> Result<PartialSignature> {
        if self.state != SigningState::CollectingPartials {
            return Err(CoreError::SessionState("nonce commitments incomplete"));
        }
        let nonces = self
            .secret_nonces
            .take()
            .ok_or(CoreError::SessionState("nonces already consumed"))?;

        let my_index = self.key_package.index();
        let context = self.context.as_ref().expect("context set with state");

        let rho = context.binding[&my_index];
        let mut nonce_scalar = nonces.hidden + rho * nonces.binder;
        if context.negate_nonce {
            nonce_scalar = -nonce_scalar;
        }

        let mut share = *self.key_package.share();
        if context.negate_share {
            share = -share;
        }

        let lambda = curve::lagrange_coefficient(my_index, &self.signer_indices)?;
        let z = nonce_scalar + lambda * context.challenge * share;
        nonce_scalar.zeroize();
        share.zeroize();

        // A failed self-check means the share or the code is compromised;
        // never release the partial.
        if !self.partial_holds(my_index, &z) {
            self.state = SigningState::Failed;
            return Err(CoreError::Signing {
                peer: my_index,
                fault: SigningFault::InvalidPartial,
            });
        }

        self.partials.insert(my_index, z);
        Ok(PartialSignature {
            sender: my_index,
            z: curve::scalar_to_bytes(&z),
        })
    }

    /// Ingest and verify a peer's partial signature.
    pub fn ingest_partial(&mut self, partial: &PartialSignature) -> Result<()> {
        if self.state != SigningState::CollectingPartials {
            return Err(CoreError::SessionState("not collecting partial signatures"));
        }

        let sender = partial.sender;
        if !self.signer_indices.contains(&sender) {
            return Err(CoreError::Signing {
                peer: sender,
                fault: SigningFault::NotInQuorum,
            });
        }

        let z = curve::scalar_from_bytes(&partial.z).map_err(|_| CoreError::Signing {
            peer: sender,
            fault: SigningFault::Encoding,
        })?;

        if let Some(existing) = self.partials.get(&sender) {
            if *existing != z {
                self.state = SigningState::Failed;
                return Err(CoreError::Signing {
                    peer: sender,
                    fault: SigningFault::PartialMismatch,
                });
            }
            return Ok(());
        }

        if !self.partial_holds(sender, &z) {
            self.state = SigningState::Failed;
            return Err(CoreError::Signing {
                peer: sender,
                fault: SigningFault::InvalidPartial,
            });
        }

        self.partials.insert(sender, z);
        Ok(())
    }

    /// Aggregate all partials into the final 64-byte signature. Accepted
    /// only if it verifies under the group key.
    pub fn aggregate(&mut self) -> Result<[u8; 64]> {
        if self.state != SigningState::CollectingPartials {
            return Err(CoreError::SessionState("not ready to aggregate"));
        }
        if self.partials.len() != self.signer_indices.len() {
            return Err(CoreError::NotEnoughShares {
                needed: self.signer_indices.len(),
                available: self.partials.len(),
            });
        }

        let context = self.context.as_ref().expect("context set with state");

        let mut sigma = Scalar::ZERO;
        for z in self.partials.values() {
            sigma += z;
        }

        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&curve::x_only(&context.group_commitment));
        signature[32..].copy_from_slice(&curve::scalar_to_bytes(&sigma));

        let group = self.key_package.group_pubkey_xonly();
        if curve::schnorr_verify(&group, &self.message, &signature).is_err() {
            self.state = SigningState::Failed;
            return Err(CoreError::InvalidSignature);
        }

        self.state = SigningState::Complete;
        self.signature = Some(signature);
        debug!(
            session = %hex::encode(&self.session_id[..8]),
            group = %hex::encode(group),
            "signature aggregated"
        );
        Ok(signature)
    }

    /// The final signature, if aggregation has completed.
    pub fn signature(&self) -> Option<&[u8; 64]> {
        self.signature.as_ref()
    }

    fn check_nonces_complete(&mut self) {
        if self.commitments.len() == self.signer_indices.len() {
            self.context = Some(self.build_context());
            self.state = SigningState::CollectingPartials;
        }
    }

    /// Binding factors, group commitment, and challenge. Deterministic in
    /// the full commitment list, the message, and the group key.
    fn build_context(&self) -> Context {
        let group_x = self.key_package.group_pubkey_xonly();

        // B = [(i, D_i, E_i)] in ascending signer order.
        let mut commitment_list = Vec::with_capacity(self.commitments.len() * 68);
        for (index, (hidden, binder)) in &self.commitments {
            commitment_list.extend_from_slice(&index.to_be_bytes());
            commitment_list.extend_from_slice(&curve::point_to_bytes(hidden));
            commitment_list.extend_from_slice(&curve::point_to_bytes(binder));
        }

        let mut binding = BTreeMap::new();
        for &index in &self.signer_indices {
            let rho = curve::hash_to_scalar(
                BINDING_TAG,
                &[
                    &index.to_be_bytes(),
                    &commitment_list,
                    &self.message,
                    &group_x,
                ],
            );
            binding.insert(index, rho);
        }

        let mut group_commitment = ProjectivePoint::IDENTITY;
        for (index, (hidden, binder)) in &self.commitments {
            group_commitment += *hidden + *binder * binding[index];
        }

        // BIP340 works on even-Y points; fold the parity of R and Y into
        // the signers' scalars.
        let negate_nonce = !curve::has_even_y(&group_commitment);
        let negate_share = !curve::has_even_y(self.key_package.group_point());

        let r_x = curve::x_only(&group_commitment);
        let challenge =
            curve::hash_to_scalar(curve::CHALLENGE_TAG, &[&r_x, &group_x, &self.message]);

        Context {
            binding,
            group_commitment,
            challenge,
            negate_nonce,
            negate_share,
        }
    }

    /// `z_i·G == ±(D_i + ρ_i·E_i) + λ_i·c·(±P_i)` for signer `i`.
    fn partial_holds(&self, index: u16, z: &Scalar) -> bool {
        let context = self.context.as_ref().expect("context set with state");
        let Some((hidden, binder)) = self.commitments.get(&index) else {
            return false;
        };
        let Ok(lambda) = curve::lagrange_coefficient(index, &self.signer_indices) else {
            return false;
        };

        let mut nonce_commitment = *hidden + *binder * context.binding[&index];
        if context.negate_nonce {
            nonce_commitment = -nonce_commitment;
        }

        let mut verifying_share = self.key_package.verifying_share(index);
        if context.negate_share {
            verifying_share = -verifying_share;
        }

        ProjectivePoint::GENERATOR * z
            == nonce_commitment + verifying_share * (context.challenge * lambda)
    }
}

/// Sign with `threshold` key packages held locally, driving the two-round
/// protocol in-process. Intended for tests and co-located tooling; the
/// distributed path goes through [`SigningSession`] directly and produces
/// bit-identical output for the same nonces.
pub fn sign_with_packages<R: RngCore + CryptoRng>(
    packages: &[KeyPackage],
    message: &[u8; 32],
    rng: &mut R,
) -> Result<[u8; 64]> {
    if packages.is_empty() {
        return Err(CoreError::NotEnoughShares {
            needed: 1,
            available: 0,
        });
    }

    let threshold = packages[0].threshold() as usize;
    let group = packages[0].group_pubkey();
    if packages.len() < threshold {
        return Err(CoreError::NotEnoughShares {
            needed: threshold,
            available: packages.len(),
        });
    }
    if packages.iter().any(|p| p.group_pubkey() != group) {
        return Err(CoreError::Config(
            "packages belong to different groups".into(),
        ));
    }

    let quorum = &packages[..threshold];
    let indices: Vec<u16> = quorum.iter().map(|p| p.index()).collect();

    let mut sessions: Vec<SigningSession> = quorum
        .iter()
        .map(|p| SigningSession::new(p.clone(), *message, indices.clone()))
        .collect::<Result<_>>()?;

    let commitments: Vec<NonceCommitment> = sessions
        .iter_mut()
        .map(|s| s.commit(rng))
        .collect::<Result<_>>()?;
    for session in sessions.iter_mut() {
        for commitment in &commitments {
            if commitment.sender != session.key_package.index() {
                session.ingest_nonce(commitment)?;
            }
        }
    }

    let partials: Vec<PartialSignature> = sessions
        .iter_mut()
        .map(|s| s.sign())
        .collect::<Result<_>>()?;
    let aggregator_index = sessions[0].key_package.index();
    for partial in &partials {
        if partial.sender != aggregator_index {
            sessions[0].ingest_partial(partial)?;
        }
    }

    sessions[0].aggregate()
}
