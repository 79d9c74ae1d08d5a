// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capability records: grants, revocations, and delegations.
//!
//! A capability is an immutable record derived from a signed grant event.
//! The group key issues grants; holders of `delegate` grants may issue
//! narrower delegations; revocations are separate records that logically
//! destroy a grant and everything derived from it. This module parses
//! records from event parts (id, signer, timestamp, tags) and makes the
//! authorization decision; it never sees the wire type.

#![forbid(unsafe_code)]

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CapabilityFault, CoreError, Result};

/// Longest supported delegation chain.
pub const MAX_DELEGATION_DEPTH: usize = 8;

/// The fixed set of grantable actions. Any other type string is a parse
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    Read,
    Write,
    Publish,
    Delete,
    Delegate,
}

impl CapabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityType::Read => "read",
            CapabilityType::Write => "write",
            CapabilityType::Publish => "publish",
            CapabilityType::Delete => "delete",
            CapabilityType::Delegate => "delegate",
        }
    }
}

impl FromStr for CapabilityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(CapabilityType::Read),
            "write" => Ok(CapabilityType::Write),
            "publish" => Ok(CapabilityType::Publish),
            "delete" => Ok(CapabilityType::Delete),
            "delegate" => Ok(CapabilityType::Delegate),
            _ => Err(CoreError::Capability(CapabilityFault::UnknownType)),
        }
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-grant rate quota. Enforcement is the relay's; the model only
/// carries the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuota {
    pub count: u32,
    pub period_secs: u32,
}

/// Optional restrictions narrowing what a capability authorizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    pub kinds: Option<Vec<u16>>,
    pub required_tags: Option<Vec<(String, String)>>,
    pub excluded_tags: Option<Vec<(String, String)>>,
    pub rate_limit: Option<RateQuota>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_none()
            && self.required_tags.is_none()
            && self.excluded_tags.is_none()
            && self.rate_limit.is_none()
    }
}

/// One hop in a delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationLink {
    pub delegator: [u8; 32],
    pub delegatee: [u8; 32],
    pub event_id: [u8; 32],
}

/// An immutable capability record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub action: CapabilityType,
    pub holder: [u8; 32],
    /// The group key. Copied along delegation chains: the group remains
    /// the trust root.
    pub issuer: [u8; 32],
    pub qualifiers: Qualifiers,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
    /// Id of the event this record was derived from.
    pub event_id: [u8; 32],
    /// For delegations, the parent grant's event id.
    pub references: Option<[u8; 32]>,
    pub chain: Vec<DelegationLink>,
}

fn tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.first().map(String::as_str) == Some(name))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

fn tag_rest<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a [String]> {
    tags.iter()
        .find(|t| t.first().map(String::as_str) == Some(name))
        .map(|t| &t[1..])
}

fn parse_hex32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| CoreError::Capability(CapabilityFault::Parse))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::Capability(CapabilityFault::Parse))
}

fn parse_qualifiers(tags: &[Vec<String>]) -> Result<Qualifiers> {
    let kinds = match tag_rest(tags, "kinds") {
        Some(values) => {
            let parsed: Vec<u16> = values
                .iter()
                .map(|v| {
                    v.parse::<u16>()
                        .map_err(|_| CoreError::Capability(CapabilityFault::Parse))
                })
                .collect::<Result<_>>()?;
            if parsed.is_empty() {
                return Err(CoreError::Capability(CapabilityFault::Parse));
            }
            Some(parsed)
        }
        None => None,
    };

    let parse_pairs = |name: &str| -> Result<Option<Vec<(String, String)>>> {
        match tag_rest(tags, name) {
            Some(values) => {
                let pairs: Vec<(String, String)> = values
                    .iter()
                    .map(|v| {
                        v.split_once('=')
                            .map(|(n, val)| (n.to_string(), val.to_string()))
                            .ok_or(CoreError::Capability(CapabilityFault::Parse))
                    })
                    .collect::<Result<_>>()?;
                if pairs.is_empty() {
                    return Err(CoreError::Capability(CapabilityFault::Parse));
                }
                Ok(Some(pairs))
            }
            None => Ok(None),
        }
    };

    let required_tags = parse_pairs("required-tags")?;
    let excluded_tags = parse_pairs("excluded-tags")?;

    let rate_limit = match tag_rest(tags, "rate-limit") {
        Some([count, period]) => {
            let count: u32 = count
                .parse()
                .map_err(|_| CoreError::Capability(CapabilityFault::Parse))?;
            let period_secs: u32 = period
                .parse()
                .map_err(|_| CoreError::Capability(CapabilityFault::Parse))?;
            if count < 1 || period_secs < 1 {
                return Err(CoreError::Capability(CapabilityFault::BadQuota));
            }
            Some(RateQuota { count, period_secs })
        }
        Some(_) => return Err(CoreError::Capability(CapabilityFault::Parse)),
        None => None,
    };

    Ok(Qualifiers {
        kinds,
        required_tags,
        excluded_tags,
        rate_limit,
    })
}

fn parse_expiration(tags: &[Vec<String>]) -> Result<Option<i64>> {
    match tag_value(tags, "expiration") {
        Some(value) => {
            let at: i64 = value
                .parse()
                .map_err(|_| CoreError::Capability(CapabilityFault::Parse))?;
            Ok(Some(at))
        }
        None => Ok(None),
    }
}

impl Capability {
    /// Parse a grant record from a grant event's parts. The signer is the
    /// issuer; the caller has already verified the signature and that the
    /// signer is the group key.
    pub fn from_grant(
        event_id: [u8; 32],
        issuer: [u8; 32],
        issued_at: i64,
        tags: &[Vec<String>],
    ) -> Result<Self> {
        let holder = tag_value(tags, "p")
            .ok_or(CoreError::Capability(CapabilityFault::Parse))
            .and_then(parse_hex32)?;
        let action = tag_value(tags, "capability")
            .ok_or(CoreError::Capability(CapabilityFault::Parse))?
            .parse::<CapabilityType>()?;

        Ok(Self {
            action,
            holder,
            issuer,
            qualifiers: parse_qualifiers(tags)?,
            issued_at,
            expires_at: parse_expiration(tags)?,
            event_id,
            references: None,
            chain: Vec::new(),
        })
    }

    /// Parse and validate a delegation derived from `parent`. The caller
    /// has already verified the event signature; this enforces the subset
    /// rules binding the delegation to its parent.
    pub fn from_delegation(
        event_id: [u8; 32],
        signer: [u8; 32],
        issued_at: i64,
        tags: &[Vec<String>],
        parent: &Capability,
    ) -> Result<Self> {
        if parent.action != CapabilityType::Delegate {
            return Err(CoreError::Capability(CapabilityFault::NotDelegate));
        }
        if signer != parent.holder {
            return Err(CoreError::Capability(CapabilityFault::ChainSigner));
        }

        let references = tag_value(tags, "e")
            .ok_or(CoreError::Capability(CapabilityFault::Parse))
            .and_then(parse_hex32)?;
        if references != parent.event_id {
            return Err(CoreError::Capability(CapabilityFault::ReferenceMismatch));
        }

        if parent.chain.len() >= MAX_DELEGATION_DEPTH {
            return Err(CoreError::Capability(CapabilityFault::ChainTooLong));
        }

        let holder = tag_value(tags, "p")
            .ok_or(CoreError::Capability(CapabilityFault::Parse))
            .and_then(parse_hex32)?;
        let action = tag_value(tags, "capability")
            .ok_or(CoreError::Capability(CapabilityFault::Parse))?
            .parse::<CapabilityType>()?;
        let qualifiers = parse_qualifiers(tags)?;
        let expires_at = parse_expiration(tags)?;

        if let Some(parent_kinds) = &parent.qualifiers.kinds {
            let Some(child_kinds) = &qualifiers.kinds else {
                return Err(CoreError::Capability(CapabilityFault::KindsExceedParent));
            };
            if child_kinds.iter().any(|k| !parent_kinds.contains(k)) {
                return Err(CoreError::Capability(CapabilityFault::KindsExceedParent));
            }
        }

        if let Some(parent_expiry) = parent.expires_at {
            let Some(child_expiry) = expires_at else {
                return Err(CoreError::Capability(CapabilityFault::MissingExpiry));
            };
            if child_expiry > parent_expiry {
                return Err(CoreError::Capability(CapabilityFault::ExpiryExceedsParent));
            }
        }

        let mut chain = parent.chain.clone();
        chain.push(DelegationLink {
            delegator: parent.holder,
            delegatee: holder,
            event_id,
        });

        Ok(Self {
            action,
            holder,
            issuer: parent.issuer,
            qualifiers,
            issued_at,
            expires_at,
            event_id,
            references: Some(references),
            chain,
        })
    }

    /// True once the capability has lapsed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    /// True if this record descends from (or is) the grant with `id`.
    pub fn derives_from(&self, id: &[u8; 32]) -> bool {
        self.event_id == *id
            || self.references == Some(*id)
            || self.chain.iter().any(|link| link.event_id == *id)
    }
}

/// The grant id a revocation event targets.
pub fn revocation_target(tags: &[Vec<String>]) -> Result<[u8; 32]> {
    tag_value(tags, "e")
        .ok_or(CoreError::Capability(CapabilityFault::Parse))
        .and_then(parse_hex32)
}

/// Select the first capability in `candidates` authorizing `holder` to
/// perform `action` at `now`, optionally against an event's kind and tags.
///
/// Pure in its inputs; returns at most one witness.
pub fn authorize<'a>(
    candidates: &[&'a Capability],
    holder: &[u8; 32],
    action: CapabilityType,
    now: i64,
    event: Option<(u16, &[Vec<String>])>,
) -> Option<&'a Capability> {
    candidates
        .iter()
        .copied()
        .find(|c| matches(c, holder, action, now, event))
}

fn matches(
    capability: &Capability,
    holder: &[u8; 32],
    action: CapabilityType,
    now: i64,
    event: Option<(u16, &[Vec<String>])>,
) -> bool {
    if capability.holder != *holder || capability.action != action {
        return false;
    }
    if capability.is_expired(now) {
        return false;
    }

    if let Some(kinds) = &capability.qualifiers.kinds {
        match event {
            Some((kind, _)) if kinds.contains(&kind) => {}
            _ => return false,
        }
    }

    if let Some(required) = &capability.qualifiers.required_tags {
        let Some((_, tags)) = event else {
            return false;
        };
        if required
            .iter()
            .any(|(name, value)| !has_tag(tags, name, value))
        {
            return false;
        }
    }

    if let Some(excluded) = &capability.qualifiers.excluded_tags {
        if let Some((_, tags)) = event {
            if excluded
                .iter()
                .any(|(name, value)| has_tag(tags, name, value))
            {
                return false;
            }
        }
    }

    true
}

fn has_tag(tags: &[Vec<String>], name: &str, value: &str) -> bool {
    tags.iter().any(|t| {
        t.first().map(String::as_str) == Some(name) && t.get(1).map(String::as_str) == Some(value)
    })
}

/// Build the tag set of a grant event.
pub fn grant_tags(
    holder: &[u8; 32],
    action: CapabilityType,
    qualifiers: &Qualifiers,
    expires_at: Option<i64>,
) -> Vec<Vec<String>> {
    let mut tags = vec![
        vec!["p".into(), hex::encode(holder)],
        vec!["capability".into(), action.as_str().into()],
    ];

    if let Some(at) = expires_at {
        tags.push(vec!["expiration".into(), at.to_string()]);
    }
    if let Some(kinds) = &qualifiers.kinds {
        let mut tag = vec!["kinds".to_string()];
        tag.extend(kinds.iter().map(u16::to_string));
        tags.push(tag);
    }
    if let Some(required) = &qualifiers.required_tags {
        let mut tag = vec!["required-tags".to_string()];
        tag.extend(required.iter().map(|(n, v)| format!("{n}={v}")));
        tags.push(tag);
    }
    if let Some(excluded) = &qualifiers.excluded_tags {
        let mut tag = vec!["excluded-tags".to_string()];
        tag.extend(excluded.iter().map(|(n, v)| format!("{n}={v}")));
        tags.push(tag);
    }
    if let Some(quota) = &qualifiers.rate_limit {
        tags.push(vec![
            "rate-limit".into(),
            quota.count.to_string(),
            quota.period_secs.to_string(),
        ]);
    }

    tags
}

/// Build the tag set of a revocation event targeting `grant_id`.
pub fn revoke_tags(grant_id: &[u8; 32]) -> Vec<Vec<String>> {
    vec![vec!["e".into(), hex::encode(grant_id)]]
}

/// Build the tag set of a delegation event deriving from `parent_id`.
pub fn delegate_tags(
    delegatee: &[u8; 32],
    parent_id: &[u8; 32],
    action: CapabilityType,
    qualifiers: &Qualifiers,
    expires_at: Option<i64>,
) -> Vec<Vec<String>> {
    let mut tags = grant_tags(delegatee, action, qualifiers, expires_at);
    tags.push(vec!["e".into(), hex::encode(parent_id)]);
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: [u8; 32] = [0xAB; 32];

    fn grant(
        id: u8,
        holder: [u8; 32],
        action: CapabilityType,
        qualifiers: Qualifiers,
        expires_at: Option<i64>,
    ) -> Capability {
        let tags = grant_tags(&holder, action, &qualifiers, expires_at);
        Capability::from_grant([id; 32], GROUP, 1_000, &tags).unwrap()
    }

    #[test]
    fn grant_roundtrips_through_tags() {
        let holder = [0x11; 32];
        let qualifiers = Qualifiers {
            kinds: Some(vec![9, 10]),
            required_tags: Some(vec![("h".into(), "rust".into())]),
            excluded_tags: Some(vec![("nsfw".into(), "true".into())]),
            rate_limit: Some(RateQuota {
                count: 10,
                period_secs: 60,
            }),
        };

        let capability = grant(1, holder, CapabilityType::Write, qualifiers.clone(), Some(2_000));
        assert_eq!(capability.holder, holder);
        assert_eq!(capability.issuer, GROUP);
        assert_eq!(capability.action, CapabilityType::Write);
        assert_eq!(capability.qualifiers, qualifiers);
        assert_eq!(capability.expires_at, Some(2_000));
        assert!(capability.chain.is_empty());
    }

    #[test]
    fn unknown_type_is_a_parse_failure() {
        let tags = vec![
            vec!["p".into(), hex::encode([0x11; 32])],
            vec!["capability".into(), "admin".into()],
        ];
        let err = Capability::from_grant([1; 32], GROUP, 0, &tags).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Capability(CapabilityFault::UnknownType)
        ));
    }

    #[test]
    fn missing_holder_is_a_parse_failure() {
        let tags = vec![vec!["capability".into(), "write".into()]];
        assert!(Capability::from_grant([1; 32], GROUP, 0, &tags).is_err());
    }

    #[test]
    fn zero_quota_rejected() {
        let tags = vec![
            vec!["p".into(), hex::encode([0x11; 32])],
            vec!["capability".into(), "write".into()],
            vec!["rate-limit".into(), "0".into(), "60".into()],
        ];
        assert!(matches!(
            Capability::from_grant([1; 32], GROUP, 0, &tags),
            Err(CoreError::Capability(CapabilityFault::BadQuota))
        ));
    }

    #[test]
    fn authorize_matches_kind_qualified_grant() {
        let holder = [0x11; 32];
        let capability = grant(
            1,
            holder,
            CapabilityType::Write,
            Qualifiers {
                kinds: Some(vec![9, 10]),
                ..Qualifiers::default()
            },
            None,
        );
        let candidates = [&capability];
        let tags: Vec<Vec<String>> = vec![vec!["h".into(), "group".into()]];

        assert!(
            authorize(&candidates, &holder, CapabilityType::Write, 0, Some((9, &tags))).is_some()
        );
        // Wrong kind.
        assert!(
            authorize(&candidates, &holder, CapabilityType::Write, 0, Some((1, &tags))).is_none()
        );
        // Wrong action.
        assert!(
            authorize(&candidates, &holder, CapabilityType::Delete, 0, Some((9, &tags))).is_none()
        );
        // Wrong holder.
        assert!(authorize(&candidates, &[0x22; 32], CapabilityType::Write, 0, Some((9, &tags)))
            .is_none());
    }

    #[test]
    fn authorize_respects_expiry() {
        let holder = [0x11; 32];
        let capability = grant(1, holder, CapabilityType::Write, Qualifiers::default(), Some(500));
        let candidates = [&capability];

        assert!(authorize(&candidates, &holder, CapabilityType::Write, 499, None).is_some());
        assert!(authorize(&candidates, &holder, CapabilityType::Write, 500, None).is_none());
        assert!(authorize(&candidates, &holder, CapabilityType::Write, 501, None).is_none());
    }

    #[test]
    fn authorize_checks_required_and_excluded_tags() {
        let holder = [0x11; 32];
        let capability = grant(
            1,
            holder,
            CapabilityType::Write,
            Qualifiers {
                required_tags: Some(vec![("h".into(), "rust".into())]),
                excluded_tags: Some(vec![("spoiler".into(), "yes".into())]),
                ..Qualifiers::default()
            },
            None,
        );
        let candidates = [&capability];

        let good: Vec<Vec<String>> = vec![vec!["h".into(), "rust".into()]];
        assert!(
            authorize(&candidates, &holder, CapabilityType::Write, 0, Some((9, &good))).is_some()
        );

        let missing: Vec<Vec<String>> = vec![vec!["h".into(), "other".into()]];
        assert!(authorize(&candidates, &holder, CapabilityType::Write, 0, Some((9, &missing)))
            .is_none());

        let excluded: Vec<Vec<String>> = vec![
            vec!["h".into(), "rust".into()],
            vec!["spoiler".into(), "yes".into()],
        ];
        assert!(authorize(&candidates, &holder, CapabilityType::Write, 0, Some((9, &excluded)))
            .is_none());
    }

    #[test]
    fn authorize_returns_first_witness() {
        let holder = [0x11; 32];
        let a = grant(1, holder, CapabilityType::Write, Qualifiers::default(), None);
        let b = grant(2, holder, CapabilityType::Write, Qualifiers::default(), None);
        let candidates = [&a, &b];

        let witness = authorize(&candidates, &holder, CapabilityType::Write, 0, None).unwrap();
        assert_eq!(witness.event_id, a.event_id);
    }

    fn delegation(
        id: u8,
        parent: &Capability,
        signer: [u8; 32],
        delegatee: [u8; 32],
        action: CapabilityType,
        qualifiers: Qualifiers,
        expires_at: Option<i64>,
    ) -> Result<Capability> {
        let tags = delegate_tags(&delegatee, &parent.event_id, action, &qualifiers, expires_at);
        Capability::from_delegation([id; 32], signer, 1_500, &tags, parent)
    }

    #[test]
    fn delegation_subset_is_enforced() {
        let delegator = [0x11; 32];
        let parent = grant(
            1,
            delegator,
            CapabilityType::Delegate,
            Qualifiers {
                kinds: Some(vec![9, 10]),
                ..Qualifiers::default()
            },
            Some(5_000),
        );

        // Kind set exceeding the parent's fails.
        let err = delegation(
            2,
            &parent,
            delegator,
            [0x22; 32],
            CapabilityType::Write,
            Qualifiers {
                kinds: Some(vec![9, 10, 11]),
                ..Qualifiers::default()
            },
            Some(4_000),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Capability(CapabilityFault::KindsExceedParent)
        ));
        assert_eq!(err.to_string(), "capability: delegation exceeds parent kinds");

        // Unset kinds on the child while the parent restricts kinds fails.
        assert!(delegation(
            3,
            &parent,
            delegator,
            [0x22; 32],
            CapabilityType::Write,
            Qualifiers::default(),
            Some(4_000),
        )
        .is_err());

        // A proper subset with earlier expiry passes.
        let child = delegation(
            4,
            &parent,
            delegator,
            [0x22; 32],
            CapabilityType::Write,
            Qualifiers {
                kinds: Some(vec![9]),
                ..Qualifiers::default()
            },
            Some(4_000),
        )
        .unwrap();
        assert_eq!(child.issuer, GROUP);
        assert_eq!(child.references, Some(parent.event_id));
        assert_eq!(child.chain.len(), 1);
        assert_eq!(child.chain[0].delegator, delegator);
        assert_eq!(child.chain[0].delegatee, [0x22; 32]);
    }

    #[test]
    fn delegation_expiry_is_monotone() {
        let delegator = [0x11; 32];
        let parent = grant(
            1,
            delegator,
            CapabilityType::Delegate,
            Qualifiers::default(),
            Some(5_000),
        );

        assert!(matches!(
            delegation(
                2,
                &parent,
                delegator,
                [0x22; 32],
                CapabilityType::Write,
                Qualifiers::default(),
                None,
            ),
            Err(CoreError::Capability(CapabilityFault::MissingExpiry))
        ));
        assert!(matches!(
            delegation(
                3,
                &parent,
                delegator,
                [0x22; 32],
                CapabilityType::Write,
                Qualifiers::default(),
                Some(6_000),
            ),
            Err(CoreError::Capability(CapabilityFault::ExpiryExceedsParent))
        ));
        assert!(delegation(
            4,
            &parent,
            delegator,
            [0x22; 32],
            CapabilityType::Write,
            Qualifiers::default(),
            Some(5_000),
        )
        .is_ok());
    }

    #[test]
    fn delegation_requires_delegate_parent_and_holder_signature() {
        let delegator = [0x11; 32];
        let write_only = grant(1, delegator, CapabilityType::Write, Qualifiers::default(), None);
        assert!(matches!(
            delegation(
                2,
                &write_only,
                delegator,
                [0x22; 32],
                CapabilityType::Write,
                Qualifiers::default(),
                None,
            ),
            Err(CoreError::Capability(CapabilityFault::NotDelegate))
        ));

        let delegable = grant(3, delegator, CapabilityType::Delegate, Qualifiers::default(), None);
        assert!(matches!(
            delegation(
                4,
                &delegable,
                [0x99; 32],
                [0x22; 32],
                CapabilityType::Write,
                Qualifiers::default(),
                None,
            ),
            Err(CoreError::Capability(CapabilityFault::ChainSigner))
        ));
    }

    #[test]
    fn chains_stay_subset_and_monotone_to_depth_eight() {
        let mut holder = [0x10; 32];
        let mut parent = grant(
            1,
            holder,
            CapabilityType::Delegate,
            Qualifiers {
                kinds: Some(vec![9, 10, 11, 12]),
                ..Qualifiers::default()
            },
            Some(10_000),
        );
        let root_kinds = parent.qualifiers.kinds.clone().unwrap();
        let mut expiry = 10_000;

        for depth in 0..MAX_DELEGATION_DEPTH {
            let next_holder = [0x20 + depth as u8; 32];
            expiry -= 100;
            let child = delegation(
                10 + depth as u8,
                &parent,
                holder,
                next_holder,
                CapabilityType::Delegate,
                Qualifiers {
                    kinds: Some(vec![9, 10]),
                    ..Qualifiers::default()
                },
                Some(expiry),
            )
            .unwrap();

            assert_eq!(child.chain.len(), depth + 1);
            assert!(child
                .qualifiers
                .kinds
                .as_ref()
                .unwrap()
                .iter()
                .all(|k| root_kinds.contains(k)));
            assert!(child.expires_at.unwrap() <= parent.expires_at.unwrap());
            assert!(child.derives_from(&[1; 32]));

            holder = next_holder;
            parent = child;
        }

        // Depth 9 is refused.
        assert!(matches!(
            delegation(
                99,
                &parent,
                holder,
                [0x77; 32],
                CapabilityType::Write,
                Qualifiers {
                    kinds: Some(vec![9]),
                    ..Qualifiers::default()
                },
                Some(expiry - 1),
            ),
            Err(CoreError::Capability(CapabilityFault::ChainTooLong))
        ));
    }

    #[test]
    fn derives_from_tracks_the_whole_chain() {
        let delegator = [0x11; 32];
        let parent = grant(
            1,
            delegator,
            CapabilityType::Delegate,
            Qualifiers::default(),
            None,
        );
        let child = delegation(
            2,
            &parent,
            delegator,
            [0x22; 32],
            CapabilityType::Write,
            Qualifiers::default(),
            None,
        )
        .unwrap();

        assert!(child.derives_from(&parent.event_id));
        assert!(child.derives_from(&child.event_id));
        assert!(!child.derives_from(&[0xEE; 32]));
    }
}
