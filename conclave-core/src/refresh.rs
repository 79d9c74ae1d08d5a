// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Proactive share refresh.
//!
//! Every current holder contributes a random polynomial with a zero
//! constant term, distributed and verified exactly like DKG round 2. Each
//! holder's new share is the old share plus the sum of the received
//! evaluations; because `Σ g_i(0) = 0`, the group public key is unchanged.
//! Shares from before and after a refresh are mutually incompatible.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use k256::{ProjectivePoint, Scalar};
use tracing::debug;
use zeroize::Zeroize;

use crate::cipher;
use crate::curve;
use crate::dkg::{DkgConfig, DkgState, KeyPackage, Round1Package, Round2Package};
use crate::error::{CoreError, DkgFault, Result};

pub(crate) const REFRESH_AAD: &str = "refresh/round2";

/// Per-holder refresh state machine. Reuses the DKG package types; the
/// commitment vector carries `t - 1` points because the constant-term
/// commitment is the identity and is omitted from the wire.
pub struct RefreshSession {
    config: DkgConfig,
    state: DkgState,
    coefficients: Option<Vec<Scalar>>,
    round1: BTreeMap<u16, Vec<ProjectivePoint>>,
    round2: BTreeMap<u16, Scalar>,
    blamed: Option<u16>,
}

impl RefreshSession {
    /// `config` must describe the same quorum shape as the package being
    /// refreshed.
    pub fn new(config: DkgConfig, current: &KeyPackage) -> Result<Self> {
        if config.threshold() != current.threshold()
            || config.max_signers() != current.max_signers()
        {
            return Err(CoreError::Config(
                "refresh config does not match key package".into(),
            ));
        }
        if config.my_index() != current.index() {
            return Err(CoreError::Config(
                "refresh config index does not match key package".into(),
            ));
        }

        Ok(Self {
            config,
            state: DkgState::Initialized,
            coefficients: None,
            round1: BTreeMap::new(),
            round2: BTreeMap::new(),
            blamed: None,
        })
    }

    pub fn state(&self) -> DkgState {
        self.state
    }

    pub fn config(&self) -> &DkgConfig {
        &self.config
    }

    pub fn blamed(&self) -> Option<u16> {
        self.blamed
    }

    /// Sample the zero-constant polynomial and publish the non-constant
    /// coefficient commitments.
    pub fn round1<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Round1Package> {
        if self.state != DkgState::Initialized {
            return Err(CoreError::SessionState("refresh round 1 requires a fresh session"));
        }
        if self.coefficients.is_some() {
            return Err(CoreError::SessionState("refresh round 1 already generated"));
        }

        let mut coefficients = vec![Scalar::ZERO];
        coefficients
            .extend((1..self.config.threshold()).map(|_| curve::rand_scalar_nonzero(rng)));

        let commitments: Vec<ProjectivePoint> = coefficients[1..]
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect();

        let package = Round1Package {
            session_id: *self.config.session_id(),
            sender: self.config.my_index(),
            commitments: commitments.iter().map(curve::point_to_bytes).collect(),
        };

        self.round1.insert(self.config.my_index(), commitments);
        self.coefficients = Some(coefficients);
        self.check_round1_complete();

        Ok(package)
    }

    pub fn ingest_round1(&mut self, package: &Round1Package) -> Result<()> {
        if self.state != DkgState::Initialized {
            return Err(CoreError::SessionState("not collecting refresh round 1"));
        }
        if package.session_id != *self.config.session_id() {
            return Err(CoreError::Protocol("session id mismatch".into()));
        }

        let sender = package.sender;
        if sender == self.config.my_index()
            || sender == 0
            || sender > self.config.max_signers()
        {
            return Err(CoreError::Dkg {
                peer: sender,
                fault: DkgFault::Index,
            });
        }
        if package.commitments.len() != self.config.threshold() as usize - 1 {
            return Err(CoreError::Dkg {
                peer: sender,
                fault: DkgFault::CommitmentCount,
            });
        }

        let commitments: Vec<ProjectivePoint> = package
            .commitments
            .iter()
            .map(|bytes| curve::point_from_bytes(bytes))
            .collect::<Result<_>>()
            .map_err(|_| CoreError::Dkg {
                peer: sender,
                fault: DkgFault::BadPoint,
            })?;

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

    /// Distribute the refresh evaluations on the share channel.
    pub fn round2(&mut self) -> Result<Vec<Round2Package>> {
        if self.state != DkgState::Round1Complete {
            return Err(CoreError::SessionState("refresh round 1 incomplete"));
        }
        let mut coefficients = self
            .coefficients
            .take()
            .ok_or(CoreError::SessionState("refresh round 2 already generated"))?;

        let my_index = self.config.my_index();
        let self_delta =
            curve::evaluate_polynomial(&coefficients, &curve::index_scalar(my_index));
        self.round2.insert(my_index, self_delta);

        let aad = cipher::share_aad(self.config.session_id(), REFRESH_AAD);
        let mut outgoing = Vec::with_capacity(self.config.max_signers() as usize - 1);

        for to_index in 1..=self.config.max_signers() {
            if to_index == my_index {
                continue;
            }
            let peer = self
                .config
                .participant(to_index)
                .expect("index in range by construction");
            let key = cipher::conversation_key(self.config.keypair(), peer)?;

            let mut delta =
                curve::evaluate_polynomial(&coefficients, &curve::index_scalar(to_index));
            let mut delta_bytes = curve::scalar_to_bytes(&delta);
            let ciphertext = cipher::encrypt(&key, &delta_bytes, &aad)?;
            delta.zeroize();
            delta_bytes.zeroize();

            outgoing.push(Round2Package {
                session_id: *self.config.session_id(),
                sender: my_index,
                recipient: to_index,
                ciphertext,
            });
        }

        coefficients.zeroize();
        self.check_round2_complete();
        Ok(outgoing)
    }

    pub fn ingest_round2(&mut self, package: &Round2Package) -> Result<()> {
        if self.state != DkgState::Round1Complete {
            return Err(CoreError::SessionState("not collecting refresh round 2"));
        }
        if package.session_id != *self.config.session_id() {
            return Err(CoreError::Protocol("session id mismatch".into()));
        }
        if package.recipient != self.config.my_index() {
            return Err(CoreError::Protocol(
                "refresh package not addressed to this participant".into(),
            ));
        }

        let sender = package.sender;
        if sender == self.config.my_index()
            || sender == 0
            || sender > self.config.max_signers()
        {
            return Err(CoreError::Dkg {
                peer: sender,
                fault: DkgFault::Index,
            });
        }

        let peer = self
            .config
            .participant(sender)
            .expect("index in range checked above");
        let key = cipher::conversation_key(self.config.keypair(), peer)?;
        let aad = cipher::share_aad(self.config.session_id(), REFRESH_AAD);

        let mut plaintext = cipher::decrypt(&key, &package.ciphertext, &aad)
            .map_err(|_| self.fail(sender, DkgFault::Decrypt))?;
        if plaintext.len() != curve::SCALAR_LEN {
            plaintext.zeroize();
            return Err(self.fail(sender, DkgFault::Encoding));
        }
        let mut delta_bytes = [0u8; curve::SCALAR_LEN];
        delta_bytes.copy_from_slice(&plaintext);
        plaintext.zeroize();

        let delta = curve::scalar_from_bytes(&delta_bytes);
        delta_bytes.zeroize();
        let delta = delta.map_err(|_| self.fail(sender, DkgFault::Encoding))?;

        // Implicit identity constant term: the commitment polynomial for a
        // refresh contribution starts at the identity point.
        let sender_commitments = self
            .round1
            .get(&sender)
            .expect("round 1 complete implies all commitments present");
        let mut full = Vec::with_capacity(sender_commitments.len() + 1);
        full.push(ProjectivePoint::IDENTITY);
        full.extend_from_slice(sender_commitments);
        let expected = curve::evaluate_commitments(&full, self.config.my_index());
        if ProjectivePoint::GENERATOR * delta != expected {
            return Err(self.fail(sender, DkgFault::Vss));
        }

        if let Some(existing) = self.round2.get(&sender) {
            if *existing != delta {
                return Err(self.fail(sender, DkgFault::Equivocation));
            }
            return Ok(());
        }

        self.round2.insert(sender, delta);
        self.check_round2_complete();
        Ok(())
    }

    /// Fold the refresh deltas into a new [`KeyPackage`] whose group public
    /// key is bit-identical to the old one.
    pub fn finalize(&mut self, current: &KeyPackage) -> Result<KeyPackage> {
        if self.state != DkgState::Round2Complete {
            return Err(CoreError::SessionState("refresh round 2 incomplete"));
        }

        let mut share = *current.share();
        for delta in self.round2.values() {
            share += delta;
        }

        let threshold = self.config.threshold() as usize;
        let mut commitments = current.commitments().to_vec();
        debug_assert_eq!(commitments.len(), threshold);
        for index in 1..=self.config.max_signers() {
            let contribution = self
                .round1
                .get(&index)
                .expect("round 1 complete implies all commitments present");
            for (k, commitment) in contribution.iter().enumerate() {
                commitments[k + 1] += commitment;
            }
        }

        let group_pubkey = commitments[0];
        if curve::point_to_bytes(&group_pubkey) != current.group_pubkey() {
            return Err(CoreError::Protocol(
                "group public key changed across refresh".into(),
            ));
        }
        if ProjectivePoint::GENERATOR * share
            != curve::evaluate_commitments(&commitments, self.config.my_index())
        {
            return Err(CoreError::Protocol(
                "refreshed share off the public polynomial".into(),
            ));
        }

        for delta in self.round2.values_mut() {
            delta.zeroize();
        }
        self.round2.clear();
        self.state = DkgState::Finalized;
        debug!(index = self.config.my_index(), "share refresh finalized");

        Ok(KeyPackage::new(
            self.config.my_index(),
            share,
            group_pubkey,
            commitments,
            self.config.threshold(),
            self.config.max_signers(),
        ))
    }

    fn check_round1_complete(&mut self) {
        if self.round1.len() == self.config.max_signers() as usize {
            self.state = DkgState::Round1Complete;
        }
    }

    fn check_round2_complete(&mut self) {
        if self.round2.len() == self.config.max_signers() as usize {
            self.state = DkgState::Round2Complete;
        }
    }

    fn fail(&mut self, peer: u16, fault: DkgFault) -> CoreError {
        self.state = DkgState::Failed;
        self.blamed = Some(peer);
        CoreError::Dkg { peer, fault }
    }
}

impl Drop for RefreshSession {
    fn drop(&mut self) {
        if let Some(coefficients) = self.coefficients.as_mut() {
            coefficients.zeroize();
        }
        for delta in self.round2.values_mut() {
            delta.zeroize();
        }
    }
}

/// Refresh a co-located set of packages in one pass, without the message
/// rounds. All packages must belong to the same group and all of them must
/// be present: rotation is an all-hands operation.
pub fn refresh_packages<R: RngCore + CryptoRng>(
    packages: &[KeyPackage],
    rng: &mut R,
) -> Result<Vec<KeyPackage>> {
    if packages.is_empty() {
        return Err(CoreError::Config("no packages provided".into()));
    }

    let threshold = packages[0].threshold();
    let max_signers = packages[0].max_signers();
    let group = packages[0].group_pubkey();

    for package in &packages[1..] {
        if package.group_pubkey() != group {
            return Err(CoreError::Config(
                "packages belong to different groups".into(),
            ));
        }
        if package.threshold() != threshold || package.max_signers() != max_signers {
            return Err(CoreError::Config(
                "inconsistent quorum shape across packages".into(),
            ));
        }
    }
    if packages.len() != max_signers as usize {
        return Err(CoreError::Config(format!(
            "refresh requires all {} packages, got {}",
            max_signers,
            packages.len()
        )));
    }

    // One zero-constant polynomial per holder.
    let mut polynomials: Vec<Vec<Scalar>> = Vec::with_capacity(packages.len());
    for _ in packages {
        let mut coefficients = vec![Scalar::ZERO];
        coefficients.extend((1..threshold).map(|_| curve::rand_scalar_nonzero(rng)));
        polynomials.push(coefficients);
    }

    let mut refreshed = Vec::with_capacity(packages.len());
    for package in packages {
        let mut share = *package.share();
        for polynomial in &polynomials {
            share += curve::evaluate_polynomial(polynomial, &curve::index_scalar(package.index()));
        }

        let mut commitments = package.commitments().to_vec();
        for polynomial in &polynomials {
            for (k, coefficient) in polynomial.iter().enumerate().skip(1) {
                commitments[k] += ProjectivePoint::GENERATOR * coefficient;
            }
        }

        let group_pubkey = commitments[0];
        if curve::point_to_bytes(&group_pubkey) != group {
            return Err(CoreError::Protocol(
                "group public key changed across refresh".into(),
            ));
        }

        refreshed.push(KeyPackage::new(
            package.index(),
            share,
            group_pubkey,
            commitments,
            threshold,
            max_signers,
        ));
    }

    for polynomial in polynomials.iter_mut() {
        polynomial.zeroize();
    }

    Ok(refreshed)
}
