// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pedersen distributed key generation with verifiable secret sharing.
//!
//! Each participant commits to a random degree `t-1` polynomial, publishes
//! the coefficient commitments, and sends the evaluation `f_i(j)` to
//! participant `j` encrypted on the pairwise share channel. Every recipient
//! checks `f_i(j)·G == Σ_k A_{i,k}·j^k` before accepting. The final share is
//! the sum of all received evaluations; the group public key is the sum of
//! the constant-term commitments. No party ever holds the full secret.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::{ProjectivePoint, Scalar};
use tracing::debug;
use zeroize::Zeroize;

use crate::cipher;
use crate::curve;
use crate::error::{CoreError, DkgFault, Result};
use crate::keys::Keypair;

/// Threshold floor: a single share must never be able to sign.
pub const MIN_THRESHOLD: u16 = 2;
/// Ceiling on quorum size. Far above any practical admin set.
pub const MAX_SIGNERS: u16 = 255;

pub(crate) const ROUND2_AAD: &str = "dkg/round2";

/// Configuration for one participant's DKG session.
///
/// Participant indices are assigned by lexicographic order of the x-only
/// pubkeys; the local index is derived from the local keypair's position,
/// never trusted from outside.
#[derive(Clone)]
pub struct DkgConfig {
    session_id: [u8; 32],
    threshold: u16,
    max_signers: u16,
    participants: Vec<[u8; 32]>,
    my_index: u16,
    keypair: Keypair,
}

impl DkgConfig {
    pub fn new(
        session_id: [u8; 32],
        threshold: u16,
        max_signers: u16,
        mut participants: Vec<[u8; 32]>,
        keypair: Keypair,
    ) -> Result<Self> {
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
        if participants.len() != max_signers as usize {
            return Err(CoreError::Config(format!(
                "expected {} participants, got {}",
                max_signers,
                participants.len()
            )));
        }

        participants.sort_unstable();
        if participants.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(CoreError::Config("duplicate participant pubkey".into()));
        }

        let position = participants
            .iter()
            .position(|p| p == keypair.public_bytes())
            .ok_or_else(|| CoreError::Config("local key not in participant set".into()))?;
        let my_index = (position + 1) as u16;

        Ok(Self {
            session_id,
            threshold,
            max_signers,
            participants,
            my_index,
            keypair,
        })
    }

    pub fn session_id(&self) -> &[u8; 32] {
        &self.session_id
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn max_signers(&self) -> u16 {
        self.max_signers
    }

    pub fn my_index(&self) -> u16 {
        self.my_index
    }

    pub fn participants(&self) -> &[[u8; 32]] {
        &self.participants
    }

    /// The pubkey at a one-based participant index.
    pub fn participant(&self, index: u16) -> Option<&[u8; 32]> {
        if index == 0 {
            return None;
        }
        self.participants.get(index as usize - 1)
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    fn index_in_range(&self, index: u16) -> bool {
        index >= 1 && index <= self.max_signers
    }
}

/// Round-1 broadcast: the sender's coefficient commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round1Package {
    pub session_id: [u8; 32],
    pub sender: u16,
    pub commitments: Vec<[u8; 33]>,
}

/// Round-2 direct message: one encrypted polynomial evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Package {
    pub session_id: [u8; 32],
    pub sender: u16,
    pub recipient: u16,
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgState {
    Initialized,
    Round1Complete,
    Round2Complete,
    Finalized,
    Failed,
}

/// Per-participant DKG state machine.
///
/// `Failed` is terminal: the session must be discarded and the blamed peer
/// reported out of band. Dropping the session zeroizes all ephemeral
/// secrets.
pub struct DkgSession {
    config: DkgConfig,
    state: DkgState,
    coefficients: Option<Vec<Scalar>>,
    round1: BTreeMap<u16, Vec<ProjectivePoint>>,
    round2: BTreeMap<u16, Scalar>,
    blamed: Option<u16>,
}

impl DkgSession {
    pub fn new(config: DkgConfig) -> Self {
        Self {
            config,
            state: DkgState::Initialized,
            coefficients: None,
            round1: BTreeMap::new(),
            round2: BTreeMap::new(),
            blamed: None,
        }
    }

    pub fn state(&self) -> DkgState {
        self.state
    }

    pub fn config(&self) -> &DkgConfig {
        &self.config
    }

    /// The peer blamed for a verification failure, if the session failed.
    pub fn blamed(&self) -> Option<u16> {
        self.blamed
    }

    /// Sample the local polynomial and produce the round-1 broadcast.
    pub fn round1<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Round1Package> {
        if self.state != DkgState::Initialized {
            return Err(CoreError::SessionState("round 1 requires a fresh session"));
        }
        if self.coefficients.is_some() {
            return Err(CoreError::SessionState("round 1 already generated"));
        }

        let coefficients: Vec<Scalar> = (0..self.config.threshold)
            .map(|_| curve::rand_scalar_nonzero(rng))
            .collect();

        let commitments: Vec<ProjectivePoint> = coefficients
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect();

        let package = Round1Package {
            session_id: self.config.session_id,
            sender: self.config.my_index,
            commitments: commitments.iter().map(curve::point_to_bytes).collect(),
        };

        self.round1.insert(self.config.my_index, commitments);
        self.coefficients = Some(coefficients);
        self.check_round1_complete();

        Ok(package)
    }

    /// Ingest a peer's round-1 commitments.
    pub fn ingest_round1(&mut self, package: &Round1Package) -> Result<()> {
        if self.state != DkgState::Initialized {
            return Err(CoreError::SessionState("not collecting round 1 packages"));
        }
        self.check_session(&package.session_id)?;

        let sender = package.sender;
        if sender == self.config.my_index || !self.config.index_in_range(sender) {
            return Err(self.fault(sender, DkgFault::Index));
        }
        if package.commitments.len() != self.config.threshold as usize {
            return Err(self.fault(sender, DkgFault::CommitmentCount));
        }

        let commitments: Vec<ProjectivePoint> = package
            .commitments
            .iter()
            .map(|bytes| curve::point_from_bytes(bytes))
            .collect::<Result<_>>()
            .map_err(|_| self.fault(sender, DkgFault::BadPoint))?;

        if let Some(existing) = self.round1.get(&sender) {
            if *existing != commitments {
                return Err(self.fail(sender, DkgFault::Equivocation));
            }
            return Ok(());
        }

        self.round1.insert(sender, commitments);
        self.check_round1_complete();
        Ok(())
    }

    /// Produce the encrypted round-2 shares for every other participant.
    ///
    /// The self-evaluation is recorded in the session and never leaves it.
    /// Consumes the polynomial coefficients.
    pub fn round2(&mut self) -> Result<Vec<Round2Package>> {
        if self.state != DkgState::Round1Complete {
            return Err(CoreError::SessionState("round 1 incomplete"));
        }
        let mut coefficients = self
            .coefficients
            .take()
            .ok_or(CoreError::SessionState("round 2 already generated"))?;

        let my_index = self.config.my_index;
        let self_share =
            curve::evaluate_polynomial(&coefficients, &curve::index_scalar(my_index));
        self.round2.insert(my_index, self_share);

        let aad = cipher::share_aad(&self.config.session_id, ROUND2_AAD);
        let mut outgoing = Vec::with_capacity(self.config.max_signers as usize - 1);

        for to_index in 1..=self.config.max_signers {
            if to_index == my_index {
                continue;
            }
            let peer = self
                .config
                .participant(to_index)
                .expect("index in range by construction");
            let key = cipher::conversation_key(self.config.keypair(), peer)?;

            let mut share =
                curve::evaluate_polynomial(&coefficients, &curve::index_scalar(to_index));
            let mut share_bytes = curve::scalar_to_bytes(&share);
            let ciphertext = cipher::encrypt(&key, &share_bytes, &aad)?;
            share.zeroize();
            share_bytes.zeroize();

            outgoing.push(Round2Package {
                session_id: self.config.session_id,
                sender: my_index,
                recipient: to_index,
                ciphertext,
            });
        }

        coefficients.zeroize();
        self.check_round2_complete();
        Ok(outgoing)
    }

    /// Ingest a peer's encrypted round-2 share addressed to this participant.
    ///
    /// Decrypts, then verifies against the sender's VSS commitments. Any
    /// failure is terminal and records the blamed peer.
    pub fn ingest_round2(&mut self, package: &Round2Package) -> Result<()> {
        if self.state != DkgState::Round1Complete {
            return Err(CoreError::SessionState("not collecting round 2 packages"));
        }
        self.check_session(&package.session_id)?;

        if package.recipient != self.config.my_index {
            return Err(CoreError::Protocol(
                "round 2 package not addressed to this participant".into(),
            ));
        }

        let sender = package.sender;
        if sender == self.config.my_index || !self.config.index_in_range(sender) {
            return Err(self.fault(sender, DkgFault::Index));
        }

        let peer = self
            .config
            .participant(sender)
            .expect("index in range checked above");
        let key = cipher::conversation_key(self.config.keypair(), peer)?;
        let aad = cipher::share_aad(&self.config.session_id, ROUND2_AAD);

        let mut plaintext = cipher::decrypt(&key, &package.ciphertext, &aad)
            .map_err(|_| self.fail(sender, DkgFault::Decrypt))?;
        if plaintext.len() != curve::SCALAR_LEN {
            plaintext.zeroize();
            return Err(self.fail(sender, DkgFault::Encoding));
        }
        let mut share_bytes = [0u8; curve::SCALAR_LEN];
        share_bytes.copy_from_slice(&plaintext);
        plaintext.zeroize();

        let share = curve::scalar_from_bytes(&share_bytes);
        share_bytes.zeroize();
        let share = share.map_err(|_| self.fail(sender, DkgFault::Encoding))?;

        let commitments = self
            .round1
            .get(&sender)
            .expect("round 1 complete implies all commitments present");
        let expected = curve::evaluate_commitments(commitments, self.config.my_index);
        if ProjectivePoint::GENERATOR * share != expected {
            return Err(self.fail(sender, DkgFault::Vss));
        }

        if let Some(existing) = self.round2.get(&sender) {
            if *existing != share {
                return Err(self.fail(sender, DkgFault::Equivocation));
            }
            return Ok(());
        }

        self.round2.insert(sender, share);
        self.check_round2_complete();
        Ok(())
    }

    /// Aggregate shares and commitments into this participant's
    /// [`KeyPackage`]. Terminal on success.
    pub fn finalize(&mut self) -> Result<KeyPackage> {
        if self.state != DkgState::Round2Complete {
            return Err(CoreError::SessionState("round 2 incomplete"));
        }

        let mut share = Scalar::ZERO;
        for value in self.round2.values() {
            share += value;
        }

        let threshold = self.config.threshold as usize;
        let mut commitments = vec![ProjectivePoint::IDENTITY; threshold];
        for index in 1..=self.config.max_signers {
            let peer_commitments = self
                .round1
                .get(&index)
                .expect("round 1 complete implies all commitments present");
            for (k, commitment) in peer_commitments.iter().enumerate() {
                commitments[k] += commitment;
            }
        }

        let group_pubkey = commitments[0];
        if group_pubkey == ProjectivePoint::IDENTITY {
            return Err(CoreError::Protocol("group public key is the identity".into()));
        }

        // Own share must sit on the aggregated public polynomial.
        if ProjectivePoint::GENERATOR * share
            != curve::evaluate_commitments(&commitments, self.config.my_index)
        {
            return Err(CoreError::Protocol(
                "aggregated share off the public polynomial".into(),
            ));
        }

        for value in self.round2.values_mut() {
            value.zeroize();
        }
        self.round2.clear();
        self.state = DkgState::Finalized;
        debug!(
            index = self.config.my_index,
            group = %hex::encode(curve::x_only(&group_pubkey)),
            "dkg finalized"
        );

        Ok(KeyPackage {
            index: self.config.my_index,
            share,
            group_pubkey,
            commitments,
            threshold: self.config.threshold,
            max_signers: self.config.max_signers,
        })
    }

    fn check_session(&self, session_id: &[u8; 32]) -> Result<()> {
        if *session_id != self.config.session_id {
            return Err(CoreError::Protocol("session id mismatch".into()));
        }
        Ok(())
    }

    fn check_round1_complete(&mut self) {
        if self.round1.len() == self.config.max_signers as usize {
            self.state = DkgState::Round1Complete;
            debug!(index = self.config.my_index, "dkg round 1 complete");
        }
    }

    fn check_round2_complete(&mut self) {
        if self.round2.len() == self.config.max_signers as usize {
            self.state = DkgState::Round2Complete;
            debug!(index = self.config.my_index, "dkg round 2 complete");
        }
    }

    fn fault(&self, peer: u16, fault: DkgFault) -> CoreError {
        CoreError::Dkg { peer, fault }
    }

    fn fail(&mut self, peer: u16, fault: DkgFault) -> CoreError {
        self.state = DkgState::Failed;
        self.blamed = Some(peer);
        CoreError::Dkg { peer, fault }
    }
}

impl Drop for DkgSession {
    fn drop(&mut self) {
        if let Some(coefficients) = self.coefficients.as_mut() {
            coefficients.zeroize();
        }
        for value in self.round2.values_mut() {
            value.zeroize();
        }
    }
}

/// A participant's long-lived output of DKG: their share plus the public
/// material needed to sign and to verify peers.
#[derive(Clone)]
pub struct KeyPackage {
    index: u16,
    share: Scalar,
    group_pubkey: ProjectivePoint,
    commitments: Vec<ProjectivePoint>,
    threshold: u16,
    max_signers: u16,
}

impl KeyPackage {
    pub(crate) fn new(
        index: u16,
        share: Scalar,
        group_pubkey: ProjectivePoint,
        commitments: Vec<ProjectivePoint>,
        threshold: u16,
        max_signers: u16,
    ) -> Self {
        Self {
            index,
            share,
            group_pubkey,
            commitments,
            threshold,
            max_signers,
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn max_signers(&self) -> u16 {
        self.max_signers
    }

    pub(crate) fn share(&self) -> &Scalar {
        &self.share
    }

    pub(crate) fn group_point(&self) -> &ProjectivePoint {
        &self.group_pubkey
    }

    pub(crate) fn commitments(&self) -> &[ProjectivePoint] {
        &self.commitments
    }

    /// The group public key in compressed form.
    pub fn group_pubkey(&self) -> [u8; 33] {
        curve::point_to_bytes(&self.group_pubkey)
    }

    /// The x-only group public key, as used to verify signatures and to
    /// identify the community.
    pub fn group_pubkey_xonly(&self) -> [u8; 32] {
        curve::x_only(&self.group_pubkey)
    }

    /// Derive a participant's verifying share from the aggregated VSS
    /// commitments: `P_i = Σ_k Φ_k · i^k`.
    pub fn verifying_share(&self, index: u16) -> ProjectivePoint {
        curve::evaluate_commitments(&self.commitments, index)
    }

    /// Serialize for storage. Layout:
    /// `version || index || threshold || max_signers || share || group || commitments`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(72 + self.commitments.len() * 33);
        out.push(1u8);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.threshold.to_be_bytes());
        out.extend_from_slice(&self.max_signers.to_be_bytes());
        out.extend_from_slice(&curve::scalar_to_bytes(&self.share));
        out.extend_from_slice(&self.group_pubkey());
        for commitment in &self.commitments {
            out.extend_from_slice(&curve::point_to_bytes(commitment));
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        const HEADER: usize = 1 + 2 + 2 + 2 + 32 + 33;
        if bytes.len() < HEADER || bytes[0] != 1 {
            return Err(CoreError::Protocol("invalid key package encoding".into()));
        }

        let index = u16::from_be_bytes([bytes[1], bytes[2]]);
        let threshold = u16::from_be_bytes([bytes[3], bytes[4]]);
        let max_signers = u16::from_be_bytes([bytes[5], bytes[6]]);

        if bytes.len() != HEADER + threshold as usize * 33 {
            return Err(CoreError::Protocol("invalid key package encoding".into()));
        }

        let mut share_bytes = [0u8; 32];
        share_bytes.copy_from_slice(&bytes[7..39]);
        let share = curve::secret_scalar_from_bytes(&share_bytes)?;
        share_bytes.zeroize();

        let mut group_bytes = [0u8; 33];
        group_bytes.copy_from_slice(&bytes[39..72]);
        let group_pubkey = curve::point_from_bytes(&group_bytes)?;

        let mut commitments = Vec::with_capacity(threshold as usize);
        for k in 0..threshold as usize {
            let mut point_bytes = [0u8; 33];
            point_bytes.copy_from_slice(&bytes[HEADER + k * 33..HEADER + (k + 1) * 33]);
            commitments.push(curve::point_from_bytes(&point_bytes)?);
        }

        Ok(Self {
            index,
            share,
            group_pubkey,
            commitments,
            threshold,
            max_signers,
        })
    }
}

impl Drop for KeyPackage {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config_for, keypairs, run_dkg};
    use k256::elliptic_curve::rand_core::OsRng;

    #[test]
    fn config_rejects_bad_parameters() {
        let keys = keypairs(3);
        let pubkeys: Vec<[u8; 32]> = keys.iter().map(|k| *k.public_bytes()).collect();
        let session_id = [0u8; 32];

        assert!(DkgConfig::new(session_id, 1, 3, pubkeys.clone(), keys[0].clone()).is_err());
        assert!(DkgConfig::new(session_id, 4, 3, pubkeys.clone(), keys[0].clone()).is_err());
        assert!(DkgConfig::new(session_id, 2, 4, pubkeys.clone(), keys[0].clone()).is_err());

        let outsider = Keypair::generate(&mut OsRng);
        assert!(DkgConfig::new(session_id, 2, 3, pubkeys.clone(), outsider).is_err());

        let mut duplicated = pubkeys;
        duplicated[2] = duplicated[0];
        assert!(DkgConfig::new(session_id, 2, 3, duplicated, keys[0].clone()).is_err());
    }

    #[test]
    fn indices_follow_pubkey_order() {
        let keys = keypairs(3);
        let session_id = [0u8; 32];
        let mut sorted: Vec<[u8; 32]> = keys.iter().map(|k| *k.public_bytes()).collect();
        sorted.sort_unstable();

        for key in &keys {
            let config = config_for(session_id, 2, &keys, key);
            let expected = sorted.iter().position(|p| p == key.public_bytes()).unwrap() + 1;
            assert_eq!(config.my_index() as usize, expected);
        }
    }

    #[test]
    fn two_of_three_produces_common_group_key() {
        let keys = keypairs(3);
        let packages = run_dkg(2, &keys);

        let group = packages[0].group_pubkey();
        for package in &packages {
            assert_eq!(package.group_pubkey(), group);
            assert_eq!(package.threshold(), 2);
            assert_eq!(package.max_signers(), 3);
        }
    }

    #[test]
    fn shares_interpolate_to_group_secret() {
        let keys = keypairs(3);
        let packages = run_dkg(2, &keys);
        let group = *packages[0].group_point();

        // Any 2-subset must interpolate to the same implicit secret.
        for subset in [[0usize, 1], [1, 2], [0, 2]] {
            let indices: Vec<u16> = subset.iter().map(|&i| packages[i].index()).collect();
            let mut secret = Scalar::ZERO;
            for &i in &subset {
                let lambda =
                    curve::lagrange_coefficient(packages[i].index(), &indices).unwrap();
                secret += lambda * packages[i].share();
            }
            assert_eq!(ProjectivePoint::GENERATOR * secret, group);
        }
    }

    #[test]
    fn round1_rejects_malformed_packages() {
        let keys = keypairs(3);
        let session_id: [u8; 32] = cipher::random_bytes();
        let mut sessions: Vec<DkgSession> = keys
            .iter()
            .map(|k| DkgSession::new(config_for(session_id, 2, &keys, k)))
            .collect();
        let packages: Vec<Round1Package> = sessions
            .iter_mut()
            .map(|s| s.round1(&mut OsRng).unwrap())
            .collect();

        let me = sessions[0].config().my_index();
        let other = packages.iter().find(|p| p.sender != me).unwrap().clone();

        let mut own = other.clone();
        own.sender = me;
        assert!(matches!(
            sessions[0].ingest_round1(&own),
            Err(CoreError::Dkg {
                fault: DkgFault::Index,
                ..
            })
        ));

        let mut out_of_range = other.clone();
        out_of_range.sender = 9;
        assert!(sessions[0].ingest_round1(&out_of_range).is_err());

        let mut short = other.clone();
        short.commitments.pop();
        assert!(matches!(
            sessions[0].ingest_round1(&short),
            Err(CoreError::Dkg {
                fault: DkgFault::CommitmentCount,
                ..
            })
        ));

        // Identical duplicate is idempotent; a differing one is equivocation.
        sessions[0].ingest_round1(&other).unwrap();
        sessions[0].ingest_round1(&other).unwrap();
        let mut forged = other.clone();
        forged.commitments[0] =
            curve::point_to_bytes(&(ProjectivePoint::GENERATOR * Scalar::from(99u64)));
        assert!(matches!(
            sessions[0].ingest_round1(&forged),
            Err(CoreError::Dkg {
                fault: DkgFault::Equivocation,
                ..
            })
        ));
        assert_eq!(sessions[0].state(), DkgState::Failed);
    }

    #[test]
    fn round2_before_round1_complete_rejected() {
        let keys = keypairs(3);
        let session_id: [u8; 32] = cipher::random_bytes();
        let mut session = DkgSession::new(config_for(session_id, 2, &keys, &keys[0]));
        session.round1(&mut OsRng).unwrap();

        assert!(matches!(
            session.round2(),
            Err(CoreError::SessionState(_))
        ));
        let bogus = Round2Package {
            session_id,
            sender: 2,
            recipient: session.config().my_index(),
            ciphertext: vec![0u8; 72],
        };
        assert!(matches!(
            session.ingest_round2(&bogus),
            Err(CoreError::SessionState(_))
        ));
    }

    #[test]
    fn tampered_round2_ciphertext_blames_sender() {
        let keys = keypairs(3);
        let session_id: [u8; 32] = cipher::random_bytes();
        let mut sessions: Vec<DkgSession> = keys
            .iter()
            .map(|k| DkgSession::new(config_for(session_id, 2, &keys, k)))
            .collect();

        let round1: Vec<Round1Package> = sessions
            .iter_mut()
            .map(|s| s.round1(&mut OsRng).unwrap())
            .collect();
        for session in sessions.iter_mut() {
            for package in &round1 {
                if package.sender != session.config().my_index() {
                    session.ingest_round1(package).unwrap();
                }
            }
        }

        let round2: Vec<Round2Package> = sessions
            .iter_mut()
            .flat_map(|s| s.round2().unwrap())
            .collect();

        let target_index = sessions[0].config().my_index();
        let mut package = round2
            .iter()
            .find(|p| p.recipient == target_index)
            .unwrap()
            .clone();
        let sender = package.sender;
        let flip = package.ciphertext.len() / 2;
        package.ciphertext[flip] ^= 0x01;

        let err = sessions[0].ingest_round2(&package).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Dkg {
                peer,
                fault: DkgFault::Decrypt,
            } if peer == sender
        ));
        assert_eq!(sessions[0].state(), DkgState::Failed);
        assert_eq!(sessions[0].blamed(), Some(sender));
        assert_eq!(format!("{err}"), format!("dkg:{sender}:decryption failure"));
    }

    #[test]
    fn key_package_roundtrip() {
        let keys = keypairs(3);
        let packages = run_dkg(2, &keys);

        let bytes = packages[0].to_bytes();
        let restored = KeyPackage::from_bytes(&bytes).unwrap();
        assert_eq!(restored.index(), packages[0].index());
        assert_eq!(restored.group_pubkey(), packages[0].group_pubkey());
        assert_eq!(restored.share(), packages[0].share());

        assert!(KeyPackage::from_bytes(&bytes[..10]).is_err());
    }
}
