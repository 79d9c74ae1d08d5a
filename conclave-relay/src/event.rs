// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The signed event: the bus's only message type.
//!
//! `id` is the SHA-256 of the canonical serialization
//! `[0, pubkey, created_at, kind, tags, content]`; `sig` is a 64-byte
//! BIP340 signature over the id. Exchange form is lowercase hex.

#![forbid(unsafe_code)]

use conclave_core::{curve, Keypair};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Reject, RelayError, Result};

/// Event kinds understood by the relay.
pub mod kinds {
    /// Chat message.
    pub const CHAT_MESSAGE: u16 = 9;
    /// Chat reply.
    pub const CHAT_REPLY: u16 = 10;
    /// Note.
    pub const NOTE: u16 = 11;
    /// Note reply.
    pub const NOTE_REPLY: u16 = 12;

    /// Moderation: add a user to the group.
    pub const MOD_ADD_USER: u16 = 9000;
    /// Moderation: remove a user from the group.
    pub const MOD_REMOVE_USER: u16 = 9001;
    /// Moderation: edit group metadata.
    pub const MOD_EDIT_METADATA: u16 = 9002;
    /// Moderation: delete an event.
    pub const MOD_DELETE_EVENT: u16 = 9005;
    /// Moderation: create the group.
    pub const MOD_CREATE_GROUP: u16 = 9007;
    /// Moderation: delete the group.
    pub const MOD_DELETE_GROUP: u16 = 9008;

    /// Join request.
    pub const JOIN_REQUEST: u16 = 9021;
    /// Leave request.
    pub const LEAVE_REQUEST: u16 = 9022;

    /// NIP-42 client authentication.
    pub const CLIENT_AUTH: u16 = 22242;

    /// DKG session init.
    pub const DKG_INIT: u16 = 28000;
    /// DKG round-1 commitments.
    pub const DKG_ROUND1: u16 = 28001;
    /// DKG round-2 encrypted share.
    pub const DKG_ROUND2: u16 = 28002;
    /// DKG completion announcement.
    pub const DKG_COMPLETE: u16 = 28003;

    /// Capability grant, signed by the group key.
    pub const CAP_GRANT: u16 = 29000;
    /// Capability revocation, signed by the group key.
    pub const CAP_REVOKE: u16 = 29001;
    /// Capability delegation, signed by a delegate-grant holder.
    pub const CAP_DELEGATE: u16 = 29002;

    /// Relay-signed group metadata snapshot.
    pub const GROUP_METADATA: u16 = 39000;
    /// Relay-signed admin list snapshot.
    pub const GROUP_ADMINS: u16 = 39001;
    /// Relay-signed member list snapshot.
    pub const GROUP_MEMBERS: u16 = 39002;

    /// Chat and note kinds carry group content and timeline references.
    pub fn is_chat(kind: u16) -> bool {
        (CHAT_MESSAGE..=NOTE_REPLY).contains(&kind)
    }

    pub fn is_moderation(kind: u16) -> bool {
        (9000..=9020).contains(&kind)
    }

    pub fn is_capability(kind: u16) -> bool {
        (CAP_GRANT..=CAP_DELEGATE).contains(&kind)
    }

    pub fn is_dkg(kind: u16) -> bool {
        (DKG_INIT..=DKG_COMPLETE).contains(&kind)
    }

    pub fn is_group_snapshot(kind: u16) -> bool {
        (GROUP_METADATA..=GROUP_MEMBERS).contains(&kind)
    }

    /// Kinds that must carry an `h` group tag.
    pub fn is_group_scoped(kind: u16) -> bool {
        is_chat(kind) || is_moderation(kind) || kind == JOIN_REQUEST || kind == LEAVE_REQUEST
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Build and sign an event with the given keypair.
    pub fn build(
        keys: &Keypair,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: String,
        created_at: i64,
    ) -> Result<Self> {
        Self::build_with(&keys.public_hex(), kind, tags, content, created_at, |id| {
            keys.sign(id)
        })
    }

    /// Build an event signed by an external signer over the computed id.
    /// This is how the group key signs: the 32-byte id goes through the
    /// threshold signing engine and the 64-byte aggregate comes back.
    pub fn build_with<F>(
        pubkey: &str,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: String,
        created_at: i64,
        sign: F,
    ) -> Result<Self>
    where
        F: FnOnce(&[u8; 32]) -> [u8; 64],
    {
        let id_bytes = compute_id(pubkey, created_at, kind, &tags, &content)?;
        let sig = sign(&id_bytes);

        Ok(Self {
            id: hex::encode(id_bytes),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content,
            sig: hex::encode(sig),
        })
    }

    pub fn id_bytes(&self) -> Option<[u8; 32]> {
        decode_hex32(&self.id)
    }

    pub fn pubkey_bytes(&self) -> Option<[u8; 32]> {
        decode_hex32(&self.pubkey)
    }

    pub fn sig_bytes(&self) -> Option<[u8; 64]> {
        let bytes = hex::decode(&self.sig).ok()?;
        bytes.try_into().ok()
    }

    /// Verify the id and signature. Rejections carry the stable `invalid:`
    /// reasons of the OK-frame taxonomy.
    pub fn verify(&self) -> std::result::Result<(), Reject> {
        let id = self
            .id_bytes()
            .ok_or_else(|| Reject::Invalid("malformed event id".into()))?;
        let pubkey = self
            .pubkey_bytes()
            .ok_or_else(|| Reject::Invalid("malformed pubkey".into()))?;
        let sig = self
            .sig_bytes()
            .ok_or_else(|| Reject::Invalid("malformed signature".into()))?;

        let expected = compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
            .map_err(|_| Reject::Invalid("malformed event".into()))?;
        if expected != id {
            return Err(Reject::Invalid("bad event id".into()));
        }

        curve::schnorr_verify(&pubkey, &id, &sig)
            .map_err(|_| Reject::Invalid("bad signature".into()))
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// Values of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    /// The `h` group-id tag.
    pub fn group_id(&self) -> Option<&str> {
        self.tag_value("h")
    }

    /// Every timeline-reference prefix carried by `previous` tags.
    pub fn previous_refs(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.first().map(String::as_str) == Some("previous"))
            .flat_map(|t| t[1..].iter())
            .map(String::as_str)
            .collect()
    }

    /// Serialized size in bytes, as transmitted.
    pub fn wire_size(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(usize::MAX)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn compute_id(
    pubkey: &str,
    created_at: i64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<[u8; 32]> {
    let canonical = serde_json::to_vec(&(0u8, pubkey, created_at, kind, tags, content))
        .map_err(|e| RelayError::Protocol(format!("canonical serialization failed: {e}")))?;
    Ok(Sha256::digest(&canonical).into())
}

fn decode_hex32(s: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}
