#![forbid(unsafe_code)]

//! Subscription filters. An event passes a filter iff it satisfies every
//! non-empty clause conjunctively.

use serde::{Deserialize, Serialize};

use crate::event::Event;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub e_tags: Option<Vec<String>>,
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub p_tags: Option<Vec<String>>,
    #[serde(rename = "#h", skip_serializing_if = "Option::is_none")]
    pub h_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(values) = &self.e_tags {
            if !tag_matches(event, "e", values) {
                return false;
            }
        }
        if let Some(values) = &self.p_tags {
            if !tag_matches(event, "p", values) {
                return false;
            }
        }
        if let Some(values) = &self.h_tags {
            if !tag_matches(event, "h", values) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

fn tag_matches(event: &Event, name: &str, values: &[String]) -> bool {
    event
        .tag_values(name)
        .any(|v| values.iter().any(|want| want == v))
}
