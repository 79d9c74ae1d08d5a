// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Group state: membership, admin permission sets, and the relay-signed
//! snapshot events (kinds 39000-39002).

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use conclave_core::Keypair;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{kinds, Event};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AdminPermissions: u32 {
        const ADD_USER      = 0b00001;
        const REMOVE_USER   = 0b00010;
        const EDIT_METADATA = 0b00100;
        const DELETE_EVENT  = 0b01000;
        const DELETE_GROUP  = 0b10000;

        const ALL = Self::ADD_USER.bits()
                  | Self::REMOVE_USER.bits()
                  | Self::EDIT_METADATA.bits()
                  | Self::DELETE_EVENT.bits()
                  | Self::DELETE_GROUP.bits();
    }
}

impl AdminPermissions {
    /// Permission names as they appear in the admin snapshot event.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::ADD_USER) {
            names.push("add-user");
        }
        if self.contains(Self::REMOVE_USER) {
            names.push("remove-user");
        }
        if self.contains(Self::EDIT_METADATA) {
            names.push("edit-metadata");
        }
        if self.contains(Self::DELETE_EVENT) {
            names.push("delete-event");
        }
        if self.contains(Self::DELETE_GROUP) {
            names.push("delete-group");
        }
        names
    }
}

/// The admin permission a moderation kind requires, if the kind is
/// supported at all.
pub fn moderation_permission(kind: u16) -> Option<AdminPermissions> {
    match kind {
        kinds::MOD_ADD_USER => Some(AdminPermissions::ADD_USER),
        kinds::MOD_REMOVE_USER => Some(AdminPermissions::REMOVE_USER),
        kinds::MOD_EDIT_METADATA => Some(AdminPermissions::EDIT_METADATA),
        kinds::MOD_DELETE_EVENT => Some(AdminPermissions::DELETE_EVENT),
        kinds::MOD_DELETE_GROUP => Some(AdminPermissions::DELETE_GROUP),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    /// The x-only group public key (hex). Capability events must be signed
    /// by it.
    pub pubkey: String,
    pub visibility: Visibility,
    pub access: Access,
    pub admins: HashMap<String, AdminPermissions>,
    pub members: HashSet<String>,
    /// Join requests awaiting approval on closed groups.
    pub pending: HashSet<String>,
    pub metadata: GroupMetadata,
}

impl Group {
    /// Create a group whose creator holds every permission.
    pub fn new(id: &str, group_pubkey: &str, creator: &str) -> Self {
        let mut admins = HashMap::new();
        admins.insert(creator.to_string(), AdminPermissions::ALL);
        let mut members = HashSet::new();
        members.insert(creator.to_string());

        Self {
            id: id.to_string(),
            pubkey: group_pubkey.to_string(),
            visibility: Visibility::Public,
            access: Access::Open,
            admins,
            members,
            pending: HashSet::new(),
            metadata: GroupMetadata {
                name: id.to_string(),
                ..GroupMetadata::default()
            },
        }
    }

    pub fn is_member(&self, pubkey: &str) -> bool {
        self.members.contains(pubkey) || self.admins.contains_key(pubkey)
    }

    pub fn is_admin_with(&self, pubkey: &str, permission: AdminPermissions) -> bool {
        self.admins
            .get(pubkey)
            .map(|held| held.contains(permission))
            .unwrap_or(false)
    }

    pub fn add_member(&mut self, pubkey: &str) {
        self.pending.remove(pubkey);
        self.members.insert(pubkey.to_string());
    }

    pub fn remove_member(&mut self, pubkey: &str) {
        self.members.remove(pubkey);
        self.admins.remove(pubkey);
        self.pending.remove(pubkey);
    }

    /// Relay-signed metadata snapshot (kind 39000, `d` = group id).
    pub fn metadata_event(&self, relay_keys: &Keypair, created_at: i64) -> Result<Event> {
        let content = serde_json::to_string(&MetadataContent {
            name: &self.metadata.name,
            about: self.metadata.about.as_deref(),
            picture: self.metadata.picture.as_deref(),
            visibility: self.visibility,
            access: self.access,
        })?;

        let mut tags = vec![vec!["d".to_string(), self.id.clone()]];
        tags.push(vec![
            match self.visibility {
                Visibility::Public => "public".to_string(),
                Visibility::Private => "private".to_string(),
            },
        ]);
        tags.push(vec![
            match self.access {
                Access::Open => "open".to_string(),
                Access::Closed => "closed".to_string(),
            },
        ]);

        Event::build(relay_keys, kinds::GROUP_METADATA, tags, content, created_at)
    }

    /// Relay-signed admin snapshot (kind 39001): one `p` tag per admin,
    /// followed by that admin's permission names.
    pub fn admins_event(&self, relay_keys: &Keypair, created_at: i64) -> Result<Event> {
        let mut tags = vec![vec!["d".to_string(), self.id.clone()]];
        let mut admins: Vec<(&String, &AdminPermissions)> = self.admins.iter().collect();
        admins.sort_by(|a, b| a.0.cmp(b.0));
        for (pubkey, permissions) in admins {
            let mut tag = vec!["p".to_string(), pubkey.clone()];
            tag.extend(permissions.names().iter().map(|n| n.to_string()));
            tags.push(tag);
        }

        Event::build(relay_keys, kinds::GROUP_ADMINS, tags, String::new(), created_at)
    }

    /// Relay-signed member snapshot (kind 39002): one `p` tag per member.
    pub fn members_event(&self, relay_keys: &Keypair, created_at: i64) -> Result<Event> {
        let mut tags = vec![vec!["d".to_string(), self.id.clone()]];
        let mut members: Vec<&String> = self.members.iter().collect();
        members.sort();
        for pubkey in members {
            tags.push(vec!["p".to_string(), pubkey.clone()]);
        }

        Event::build(relay_keys, kinds::GROUP_MEMBERS, tags, String::new(), created_at)
    }
}

#[derive(Serialize)]
struct MetadataContent<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    about: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    picture: Option<&'a str>,
    visibility: Visibility,
    access: Access,
}
