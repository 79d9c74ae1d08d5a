// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! DKG coordination events (kinds 28000-28003).
//!
//! The engines speak packages; the bus speaks signed events. Round-2
//! payloads are already AEAD-encrypted by the engine, so the event body
//! only frames them; the `p` tag routes to the recipient's pubkey.

#![forbid(unsafe_code)]

use conclave_core::dkg::{Round1Package, Round2Package};
use conclave_core::Keypair;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::event::{kinds, Event};

#[derive(Serialize, Deserialize)]
struct InitContent {
    threshold: u16,
    participants: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct Round1Content {
    commitments: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct Round2Content {
    recipient: u16,
    ciphertext: String,
}

#[derive(Serialize, Deserialize)]
struct CompleteContent {
    group_pubkey: String,
}

fn session_tag(session_id: &[u8; 32]) -> Vec<String> {
    vec!["session".into(), hex::encode(session_id)]
}

/// Kind 28000: announce a session's roster and threshold.
pub fn init_event(
    keys: &Keypair,
    session_id: &[u8; 32],
    threshold: u16,
    participants: &[[u8; 32]],
    created_at: i64,
) -> Result<Event> {
    let content = serde_json::to_string(&InitContent {
        threshold,
        participants: participants.iter().map(hex::encode).collect(),
    })?;
    let tags = vec![session_tag(session_id), vec!["round".into(), "0".into()]];
    Event::build(keys, kinds::DKG_INIT, tags, content, created_at)
}

/// Kind 28001: broadcast round-1 commitments.
pub fn round1_event(keys: &Keypair, package: &Round1Package, created_at: i64) -> Result<Event> {
    let content = serde_json::to_string(&Round1Content {
        commitments: package.commitments.iter().map(hex::encode).collect(),
    })?;
    let tags = vec![
        session_tag(&package.session_id),
        vec!["idx".into(), package.sender.to_string()],
        vec!["round".into(), "1".into()],
    ];
    Event::build(keys, kinds::DKG_ROUND1, tags, content, created_at)
}

/// Kind 28002: direct an encrypted round-2 share to one recipient.
pub fn round2_event(
    keys: &Keypair,
    package: &Round2Package,
    recipient_pubkey: &[u8; 32],
    created_at: i64,
) -> Result<Event> {
    let content = serde_json::to_string(&Round2Content {
        recipient: package.recipient,
        ciphertext: hex::encode(&package.ciphertext),
    })?;
    let tags = vec![
        session_tag(&package.session_id),
        vec!["idx".into(), package.sender.to_string()],
        vec!["round".into(), "2".into()],
        vec!["p".into(), hex::encode(recipient_pubkey)],
    ];
    Event::build(keys, kinds::DKG_ROUND2, tags, content, created_at)
}

/// Kind 28003: announce the finished group public key.
pub fn completion_event(
    keys: &Keypair,
    session_id: &[u8; 32],
    group_pubkey_xonly: &[u8; 32],
    created_at: i64,
) -> Result<Event> {
    let content = serde_json::to_string(&CompleteContent {
        group_pubkey: hex::encode(group_pubkey_xonly),
    })?;
    Event::build(
        keys,
        kinds::DKG_COMPLETE,
        vec![session_tag(session_id)],
        content,
        created_at,
    )
}

fn parse_session(event: &Event) -> Result<[u8; 32]> {
    event
        .tag_value("session")
        .and_then(|s| hex::decode(s).ok())
        .and_then(|b| <[u8; 32]>::try_from(b).ok())
        .ok_or_else(|| RelayError::Protocol("missing or malformed session tag".into()))
}

fn parse_index(event: &Event) -> Result<u16> {
    event
        .tag_value("idx")
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|&idx| idx >= 1)
        .ok_or_else(|| RelayError::Protocol("missing or malformed idx tag".into()))
}

/// Reconstruct a round-1 package from a kind-28001 event.
pub fn parse_round1(event: &Event) -> Result<Round1Package> {
    if event.kind != kinds::DKG_ROUND1 {
        return Err(RelayError::Protocol("not a round-1 event".into()));
    }
    let content: Round1Content = serde_json::from_str(&event.content)?;

    let commitments = content
        .commitments
        .iter()
        .map(|c| {
            hex::decode(c)
                .ok()
                .and_then(|b| <[u8; 33]>::try_from(b).ok())
                .ok_or_else(|| RelayError::Protocol("malformed commitment".into()))
        })
        .collect::<Result<Vec<[u8; 33]>>>()?;

    Ok(Round1Package {
        session_id: parse_session(event)?,
        sender: parse_index(event)?,
        commitments,
    })
}

/// Reconstruct a round-2 package from a kind-28002 event.
pub fn parse_round2(event: &Event) -> Result<Round2Package> {
    if event.kind != kinds::DKG_ROUND2 {
        return Err(RelayError::Protocol("not a round-2 event".into()));
    }
    let content: Round2Content = serde_json::from_str(&event.content)?;

    Ok(Round2Package {
        session_id: parse_session(event)?,
        sender: parse_index(event)?,
        recipient: content.recipient,
        ciphertext: hex::decode(&content.ciphertext)
            .map_err(|_| RelayError::Protocol("malformed ciphertext".into()))?,
    })
}
