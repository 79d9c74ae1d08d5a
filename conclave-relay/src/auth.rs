// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event admission: the ordered checks between a decoded EVENT frame and
//! the store.
//!
//! Order per inbound event: signature (fail-fast), size, relay kind
//! policy, duplicate, AUTH gate, then the kind-specific pipeline.
//! Capability events check the signer against the group key; group-scoped
//! events run tag, existence, timeline, and late-publication checks before
//! the authorization decision; DKG events validate their coordination tags.

#![forbid(unsafe_code)]

use conclave_core::capability::{self, Capability, CapabilityType};
use tracing::{debug, warn};

use crate::config::FUTURE_SKEW;
use crate::error::Reject;
use crate::event::{kinds, Event};
use crate::group::{moderation_permission, Access, Group, GroupMetadata};
use crate::relay::{Admitted, ConnectionId, Relay};

type Decision<T> = std::result::Result<T, Reject>;

impl Relay {
    pub(crate) fn admit_event(&mut self, conn: ConnectionId, event: &Event) -> Decision<Admitted> {
        event.verify()?;

        if event.wire_size() > self.config.max_event_size {
            return Err(Reject::Invalid("event too large".into()));
        }

        if let Some(allowed) = &self.config.allowed_kinds {
            if !allowed.contains(&event.kind) {
                return Err(Reject::Blocked("unsupported event kind".into()));
            }
        }

        if self.events.contains(&event.id) {
            return Ok(Admitted::Duplicate);
        }

        if self.config.require_auth {
            let authed = self
                .connections
                .get(&conn)
                .and_then(|c| c.auth_pubkey.as_ref())
                .is_some();
            if !authed {
                return Err(Reject::AuthRequired("authentication required".into()));
            }
        }

        let snapshots = if kinds::is_capability(event.kind) {
            self.admit_capability(event)?;
            Vec::new()
        } else if kinds::is_group_scoped(event.kind) {
            self.admit_group_event(event)?
        } else if kinds::is_dkg(event.kind) {
            admit_dkg(event)?;
            Vec::new()
        } else if kinds::is_group_snapshot(event.kind) {
            if event.pubkey != self.relay_pubkey() {
                return Err(Reject::Blocked("reserved relay kind".into()));
            }
            Vec::new()
        } else if event.kind == kinds::CLIENT_AUTH {
            return Err(Reject::Invalid("auth event must be sent in an AUTH frame".into()));
        } else {
            return Ok(Admitted::Unsupported);
        };

        self.events.insert(event.clone());
        self.recent.push(&event.id);
        Ok(Admitted::Stored(snapshots))
    }

    /// Kinds 29000-29002. Grants and revocations must be signed by the
    /// group key; delegations by a live delegate-grant holder.
    fn admit_capability(&mut self, event: &Event) -> Decision<()> {
        let signer = event
            .pubkey_bytes()
            .ok_or_else(|| Reject::Invalid("malformed pubkey".into()))?;
        let event_id = event
            .id_bytes()
            .ok_or_else(|| Reject::Invalid("malformed event id".into()))?;

        match event.kind {
            kinds::CAP_GRANT => {
                self.require_group_signer(&event.pubkey)?;
                let capability =
                    Capability::from_grant(event_id, signer, event.created_at, &event.tags)
                        .map_err(Reject::capability)?;
                self.persist_capability(&capability);
                self.capabilities.insert(capability);
            }
            kinds::CAP_REVOKE => {
                self.require_group_signer(&event.pubkey)?;
                let target =
                    capability::revocation_target(&event.tags).map_err(Reject::capability)?;
                self.capabilities.revoke(target);
                if let Some(storage) = &self.storage {
                    if let Err(e) = storage.store_revocation(&target, event.created_at) {
                        warn!("failed to persist revocation: {e}");
                    }
                }
                debug!(target = %hex::encode(target), "capability revoked");
            }
            kinds::CAP_DELEGATE => {
                let parent_id =
                    capability::revocation_target(&event.tags).map_err(Reject::capability)?;
                let Some(parent) = self.capabilities.get(&parent_id) else {
                    return Err(Reject::Capability("capability: unknown parent grant".into()));
                };
                if !self.capabilities.is_alive(parent) {
                    return Err(Reject::Restricted("parent capability revoked".into()));
                }
                let delegation = Capability::from_delegation(
                    event_id,
                    signer,
                    event.created_at,
                    &event.tags,
                    parent,
                )
                .map_err(Reject::capability)?;
                self.persist_capability(&delegation);
                self.capabilities.insert(delegation);
            }
            _ => unreachable!("is_capability covers exactly these kinds"),
        }
        Ok(())
    }

    fn require_group_signer(&self, pubkey: &str) -> Decision<()> {
        if self.groups.values().any(|g| g.pubkey == pubkey) {
            Ok(())
        } else {
            Err(Reject::Restricted("not signed by the group key".into()))
        }
    }

    fn persist_capability(&self, capability: &Capability) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_capability(capability) {
                warn!("failed to persist capability: {e}");
            }
        }
    }

    /// Kinds 9-12, 9000-9020, 9021, 9022.
    fn admit_group_event(&mut self, event: &Event) -> Decision<Vec<Event>> {
        let group_id = event
            .group_id()
            .ok_or_else(|| Reject::Invalid("missing h tag".into()))?
            .to_string();

        let now = Self::now();
        if now - event.created_at > self.config.late_publication_window {
            return Err(Reject::Invalid("Late publication rejected".into()));
        }
        if event.created_at - now > FUTURE_SKEW {
            return Err(Reject::Invalid("timestamp too far in the future".into()));
        }

        if event.kind == kinds::MOD_CREATE_GROUP {
            return self.create_group(&group_id, event);
        }

        if !self.groups.contains_key(&group_id) {
            return Err(Reject::Invalid("unknown group".into()));
        }

        if kinds::is_chat(event.kind) {
            self.check_timeline_refs(event)?;
            self.authorize_chat(&group_id, event)?;
            return Ok(Vec::new());
        }

        if kinds::is_moderation(event.kind) {
            return self.apply_moderation(&group_id, event);
        }

        match event.kind {
            kinds::JOIN_REQUEST => self.apply_join(&group_id, event),
            kinds::LEAVE_REQUEST => self.apply_leave(&group_id, event),
            _ => unreachable!("is_group_scoped covers exactly these kinds"),
        }
    }

    /// Timeline references: format is validated whenever present; the
    /// configured minimum (and ring matching) binds in strict mode.
    fn check_timeline_refs(&self, event: &Event) -> Decision<()> {
        let refs = event.previous_refs();

        for reference in &refs {
            let well_formed = reference.len() == 8
                && reference
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
            if !well_formed {
                return Err(Reject::Invalid("bad previous-ref format".into()));
            }
        }

        if refs.len() < self.config.min_previous_refs {
            return Err(Reject::Invalid("missing timeline references".into()));
        }

        if self.config.min_previous_refs > 0 {
            for reference in &refs {
                if !self.recent.matches_prefix(reference) {
                    return Err(Reject::Invalid("unknown previous reference".into()));
                }
            }
        }

        Ok(())
    }

    /// Chat and note kinds: group membership or a live `write` capability
    /// issued under this group's key.
    fn authorize_chat(&mut self, group_id: &str, event: &Event) -> Decision<()> {
        let group = self.groups.get(group_id).expect("existence checked");
        if group.is_member(&event.pubkey) {
            return Ok(());
        }

        let group_pubkey = decode_pubkey(&group.pubkey)
            .ok_or_else(|| Reject::Invalid("malformed group key".into()))?;
        let holder = event
            .pubkey_bytes()
            .ok_or_else(|| Reject::Invalid("malformed pubkey".into()))?;

        let candidates: Vec<&Capability> = self
            .capabilities
            .for_holder(&holder)
            .into_iter()
            .filter(|c| c.issuer == group_pubkey)
            .collect();

        let witness = capability::authorize(
            &candidates,
            &holder,
            CapabilityType::Write,
            Self::now(),
            Some((event.kind, &event.tags)),
        )
        .ok_or_else(|| Reject::Restricted("not authorized".into()))?;

        let quota = witness.qualifiers.rate_limit;
        let grant_id = witness.event_id;

        if let Some(quota) = quota {
            if !self
                .rates
                .check_and_record(holder, grant_id, quota, Self::now())
            {
                return Err(Reject::Restricted("rate limit exceeded".into()));
            }
        }
        Ok(())
    }

    /// Kind 9007: the group-creation kind is the one group-scoped kind
    /// admitted for a group that does not exist yet.
    fn create_group(&mut self, group_id: &str, event: &Event) -> Decision<Vec<Event>> {
        if self.groups.contains_key(group_id) {
            return Err(Reject::Invalid("group already exists".into()));
        }

        let group_pubkey = event
            .tag_value("pubkey")
            .ok_or_else(|| Reject::Invalid("missing pubkey tag".into()))?;
        if decode_pubkey(group_pubkey).is_none() {
            return Err(Reject::Invalid("malformed group key".into()));
        }

        let mut group = Group::new(group_id, group_pubkey, &event.pubkey);
        if event.tags.iter().any(|t| t.first().map(String::as_str) == Some("private")) {
            group.visibility = crate::group::Visibility::Private;
        }
        if event.tags.iter().any(|t| t.first().map(String::as_str) == Some("closed")) {
            group.access = Access::Closed;
        }

        debug!(group = group_id, creator = %event.pubkey, "group created");
        self.persist_group(&group);
        self.groups.insert(group_id.to_string(), group);
        Ok(self.snapshots_or_log(group_id))
    }

    /// Moderation kinds: the caller must be a recorded admin holding the
    /// kind-specific permission.
    fn apply_moderation(&mut self, group_id: &str, event: &Event) -> Decision<Vec<Event>> {
        let permission = moderation_permission(event.kind)
            .ok_or_else(|| Reject::Blocked("unsupported moderation kind".into()))?;

        let group = self.groups.get(group_id).expect("existence checked");
        if !group.admins.contains_key(&event.pubkey) {
            return Err(Reject::Restricted("not an admin".into()));
        }
        if !group.is_admin_with(&event.pubkey, permission) {
            return Err(Reject::Restricted("missing permission".into()));
        }

        match event.kind {
            kinds::MOD_ADD_USER => {
                let target = event
                    .tag_value("p")
                    .ok_or_else(|| Reject::Invalid("missing p tag".into()))?
                    .to_string();
                let group = self.groups.get_mut(group_id).expect("existence checked");
                group.add_member(&target);
            }
            kinds::MOD_REMOVE_USER => {
                let target = event
                    .tag_value("p")
                    .ok_or_else(|| Reject::Invalid("missing p tag".into()))?
                    .to_string();
                let group = self.groups.get_mut(group_id).expect("existence checked");
                group.remove_member(&target);
            }
            kinds::MOD_EDIT_METADATA => {
                let update: MetadataUpdate = serde_json::from_str(&event.content)
                    .map_err(|_| Reject::Invalid("malformed metadata".into()))?;
                let group = self.groups.get_mut(group_id).expect("existence checked");
                update.apply(&mut group.metadata);
            }
            kinds::MOD_DELETE_EVENT => {
                let target = event
                    .tag_value("e")
                    .ok_or_else(|| Reject::Invalid("missing e tag".into()))?
                    .to_string();
                self.events.remove(&target);
            }
            kinds::MOD_DELETE_GROUP => {
                self.groups.remove(group_id);
                if let Some(storage) = &self.storage {
                    if let Err(e) = storage.delete_group(group_id) {
                        warn!("failed to delete group: {e}");
                    }
                }
                debug!(group = group_id, "group deleted");
                return Ok(Vec::new());
            }
            _ => unreachable!("moderation_permission filtered the kind"),
        }

        if let Some(group) = self.groups.get(group_id) {
            self.persist_group(&group.clone());
        }
        Ok(self.snapshots_or_log(group_id))
    }

    /// Join requests are always accepted: open groups auto-add, closed
    /// groups record the request without approving it.
    fn apply_join(&mut self, group_id: &str, event: &Event) -> Decision<Vec<Event>> {
        let group = self.groups.get_mut(group_id).expect("existence checked");
        match group.access {
            Access::Open => {
                group.add_member(&event.pubkey);
                let group = group.clone();
                self.persist_group(&group);
                Ok(self.snapshots_or_log(group_id))
            }
            Access::Closed => {
                group.pending.insert(event.pubkey.clone());
                let group = group.clone();
                self.persist_group(&group);
                Ok(Vec::new())
            }
        }
    }

    fn apply_leave(&mut self, group_id: &str, event: &Event) -> Decision<Vec<Event>> {
        let group = self.groups.get_mut(group_id).expect("existence checked");
        group.remove_member(&event.pubkey);
        let group = group.clone();
        self.persist_group(&group);
        Ok(self.snapshots_or_log(group_id))
    }

    fn persist_group(&self, group: &Group) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_group(group) {
                warn!("failed to persist group: {e}");
            }
        }
    }

    fn snapshots_or_log(&mut self, group_id: &str) -> Vec<Event> {
        match self.refresh_snapshots(group_id) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!("failed to refresh group snapshots: {e}");
                Vec::new()
            }
        }
    }
}

fn decode_pubkey(hex_str: &str) -> Option<[u8; 32]> {
    hex::decode(hex_str).ok()?.try_into().ok()
}

/// Kinds 28000-28003 relay between participants; the relay only checks
/// the coordination tags are present and well-formed.
fn admit_dkg(event: &Event) -> Decision<()> {
    let session = event
        .tag_value("session")
        .ok_or_else(|| Reject::Invalid("missing session tag".into()))?;
    if hex::decode(session).map(|b| b.len() != 32).unwrap_or(true) {
        return Err(Reject::Invalid("bad session tag".into()));
    }

    if matches!(event.kind, kinds::DKG_ROUND1 | kinds::DKG_ROUND2) {
        let index_ok = event
            .tag_value("idx")
            .and_then(|v| v.parse::<u16>().ok())
            .is_some_and(|idx| idx >= 1);
        if !index_ok {
            return Err(Reject::Invalid("missing idx tag".into()));
        }

        let expected_round = if event.kind == kinds::DKG_ROUND1 { "1" } else { "2" };
        if event.tag_value("round") != Some(expected_round) {
            return Err(Reject::Invalid("bad round tag".into()));
        }
    }

    if event.kind == kinds::DKG_ROUND2 && event.tag_value("p").is_none() {
        return Err(Reject::Invalid("missing p tag".into()));
    }

    Ok(())
}

#[derive(serde::Deserialize)]
struct MetadataUpdate {
    name: Option<String>,
    about: Option<String>,
    picture: Option<String>,
}

impl MetadataUpdate {
    fn apply(self, metadata: &mut GroupMetadata) {
        if let Some(name) = self.name {
            metadata.name = name;
        }
        if let Some(about) = self.about {
            metadata.about = Some(about);
        }
        if let Some(picture) = self.picture {
            metadata.picture = Some(picture);
        }
    }
}
