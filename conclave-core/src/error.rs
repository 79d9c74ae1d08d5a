#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;

/// Per-peer fault kinds raised by the DKG engine. The blamed participant is
/// carried alongside in [`CoreError::Dkg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgFault {
    /// Package carried an index outside `[1, max_signers]` or the sender's own.
    Index,
    /// Commitment vector length did not match the threshold.
    CommitmentCount,
    /// A commitment failed to decode as a curve point.
    BadPoint,
    /// Two packages from the same index disagreed.
    Equivocation,
    /// AEAD decryption of a round-2 share failed.
    Decrypt,
    /// Decrypted share was not a valid scalar.
    Encoding,
    /// Share did not match the sender's VSS commitments.
    Vss,
}

impl fmt::Display for DkgFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DkgFault::Index => "bad index",
            DkgFault::CommitmentCount => "bad commitment length",
            DkgFault::BadPoint => "bad commitment point",
            DkgFault::Equivocation => "equivocation",
            DkgFault::Decrypt => "decryption failure",
            DkgFault::Encoding => "bad share encoding",
            DkgFault::Vss => "vss verification failure",
        };
        f.write_str(s)
    }
}

/// Per-peer fault kinds raised by the signing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningFault {
    /// Message from an index outside the signer set.
    NotInQuorum,
    /// A re-sent nonce commitment disagreed with the recorded one.
    NonceMismatch,
    /// A re-sent partial signature disagreed with the recorded one.
    PartialMismatch,
    /// Nonce or partial failed to decode.
    Encoding,
    /// Partial signature did not verify against the committed nonce.
    InvalidPartial,
}

impl fmt::Display for SigningFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SigningFault::NotInQuorum => "not in quorum",
            SigningFault::NonceMismatch => "nonce mismatch",
            SigningFault::PartialMismatch => "partial mismatch",
            SigningFault::Encoding => "bad encoding",
            SigningFault::InvalidPartial => "invalid partial signature",
        };
        f.write_str(s)
    }
}

/// Fault kinds raised by the capability model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityFault {
    /// Missing or malformed required field.
    Parse,
    /// Capability type outside the fixed set.
    UnknownType,
    /// Rate-limit quota with zero count or period.
    BadQuota,
    /// Delegation from a grant that is not of type `delegate`.
    NotDelegate,
    /// Delegation not signed by the parent holder.
    ChainSigner,
    /// Delegation does not reference the parent grant.
    ReferenceMismatch,
    /// Delegated kind set not a subset of the parent's.
    KindsExceedParent,
    /// Parent is bounded in time but the delegation is not.
    MissingExpiry,
    /// Delegation expires after its parent.
    ExpiryExceedsParent,
    /// Delegation chain longer than the supported depth.
    ChainTooLong,
}

impl fmt::Display for CapabilityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityFault::Parse => "parse failure",
            CapabilityFault::UnknownType => "unknown capability type",
            CapabilityFault::BadQuota => "invalid rate limit",
            CapabilityFault::NotDelegate => "grant is not delegable",
            CapabilityFault::ChainSigner => "chain signature mismatch",
            CapabilityFault::ReferenceMismatch => "delegation does not reference parent",
            CapabilityFault::KindsExceedParent => "delegation exceeds parent kinds",
            CapabilityFault::MissingExpiry => "delegation missing expiry",
            CapabilityFault::ExpiryExceedsParent => "delegation outlives parent",
            CapabilityFault::ChainTooLong => "delegation chain too long",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid point encoding")]
    InvalidPoint,

    #[error("scalar out of range")]
    ScalarRange,

    #[error("zero scalar where nonzero required")]
    ZeroScalar,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid session state: {0}")]
    SessionState(&'static str),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Not enough shares: need {needed}, have {available}")]
    NotEnoughShares { needed: usize, available: usize },

    #[error("dkg:{peer}:{fault}")]
    Dkg { peer: u16, fault: DkgFault },

    #[error("signing:{peer}:{fault}")]
    Signing { peer: u16, fault: SigningFault },

    #[error("capability: {0}")]
    Capability(CapabilityFault),
}

pub type Result<T> = std::result::Result<T, CoreError>;
