use crate::auth::{ChatType, DecodedPayload, WebAppUser};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: i64,
    pub chat_instance: Option<String>,
    pub chat_type: Option<ChatType>,
    pub start_param: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    pub user: WebAppUser,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupUsage {
    pub(crate) chat_instance: String,
    pub(crate) chat_type: Option<ChatType>,
    pub(crate) first_opened_by: i64,
    pub(crate) first_opened_at: OffsetDateTime,
    pub(crate) users: BTreeSet<i64>,
    pub(crate) total_opens: u64,
    pub(crate) last_activity: OffsetDateTime,
    seq: u64,
}

impl GroupUsage {
    fn summary(&self) -> GroupSummary {
        GroupSummary {
            chat_instance: self.chat_instance.clone(),
            chat_type: self.chat_type.clone(),
            first_opened_by: self.first_opened_by,
            total_users: self.users.len(),
            total_opens: self.total_opens,
            first_opened_at: self.first_opened_at,
            last_activity: self.last_activity,
        }
    }
}

/// Read-side snapshot of a group's usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub chat_instance: String,
    pub chat_type: Option<ChatType>,
    pub first_opened_by: i64,
    pub total_users: usize,
    pub total_opens: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_opened_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResult {
    pub user_id: i64,
    pub chat_instance: Option<String>,
    pub chat_type: Option<ChatType>,
    pub is_from_group: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_groups: usize,
    pub total_sessions: usize,
}

#[derive(Debug, Default)]
struct GroupTable {
    entries: HashMap<String, GroupUsage>,
    next_seq: u64,
}

impl GroupTable {
    fn record(
        &mut self,
        chat_instance: &str,
        payload: &DecodedPayload,
        now: OffsetDateTime,
        max_groups: Option<usize>,
    ) {
        if !self.entries.contains_key(chat_instance) {
            if let Some(max_groups) = max_groups {
                while self.entries.len() >= max_groups.max(1) {
                    self.evict_least_active();
                }
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(
                chat_instance.to_string(),
                GroupUsage {
                    chat_instance: chat_instance.to_string(),
                    chat_type: payload.chat_type.clone(),
                    first_opened_by: payload.user_id,
                    first_opened_at: now,
                    users: BTreeSet::new(),
                    total_opens: 0,
                    last_activity: now,
                    seq,
                },
            );
        }

        if let Some(group) = self.entries.get_mut(chat_instance) {
            group.users.insert(payload.user_id);
            group.total_opens += 1;
            group.last_activity = now;
        }
    }

    fn evict_least_active(&mut self) {
        let oldest = self
            .entries
            .values()
            .min_by_key(|group| (group.last_activity, group.seq))
            .map(|group| group.chat_instance.clone());
        if let Some(chat_instance) = oldest {
            tracing::debug!(%chat_instance, "evicting least active group");
            self.entries.remove(&chat_instance);
        }
    }
}

/// In-memory aggregation of mini app opens, per user and per group.
#[derive(Debug, Default)]
pub struct UsageStore {
    sessions: Mutex<HashMap<i64, UserSession>>,
    groups: Mutex<GroupTable>,
    max_groups: Option<usize>,
}

impl UsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of tracked groups; the least recently active group
    /// is dropped to make room for a new one.
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = Some(max_groups);
        self
    }

    pub fn record_open(&self, payload: &DecodedPayload, now: OffsetDateTime) -> OpenResult {
        let session = UserSession {
            user_id: payload.user_id,
            chat_instance: payload.chat_instance.clone(),
            chat_type: payload.chat_type.clone(),
            start_param: payload.start_param.clone(),
            opened_at: now,
            user: payload.user.clone(),
        };
        self.sessions
            .lock()
            .expect("sessions lock")
            .insert(payload.user_id, session);

        if let Some(chat_instance) = payload.chat_instance.as_deref() {
            self.groups.lock().expect("groups lock").record(
                chat_instance,
                payload,
                now,
                self.max_groups,
            );
        }

        tracing::info!(
            user_id = payload.user_id,
            chat_instance = payload.chat_instance.as_deref(),
            chat_type = payload.chat_type.as_ref().map(ChatType::as_str),
            start_param = payload.start_param.as_deref(),
            "mini app opened"
        );

        OpenResult {
            user_id: payload.user_id,
            chat_instance: payload.chat_instance.clone(),
            chat_type: payload.chat_type.clone(),
            is_from_group: payload.chat_instance.is_some(),
        }
    }

    /// Observability hook only; aggregates are left untouched.
    pub fn record_action(&self, user_id: i64, action: &str, data: &serde_json::Value) {
        tracing::info!(user_id, action, %data, "user action");
    }

    pub fn group_stats(&self, chat_instance: &str) -> Option<GroupSummary> {
        let groups = self.groups.lock().expect("groups lock");
        groups.entries.get(chat_instance).map(GroupUsage::summary)
    }

    /// Groups ordered by total opens, most active first. Ties keep the order
    /// in which the groups were first seen.
    pub fn list_groups(&self) -> Vec<GroupSummary> {
        let mut groups: Vec<(u64, GroupSummary)> = {
            let groups = self.groups.lock().expect("groups lock");
            groups
                .entries
                .values()
                .map(|group| (group.seq, group.summary()))
                .collect()
        };
        groups.sort_by_key(|(seq, _)| *seq);
        groups.sort_by(|(_, a), (_, b)| b.total_opens.cmp(&a.total_opens));
        groups.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn user_session(&self, user_id: i64) -> Option<UserSession> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.get(&user_id).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        let total_sessions = self.sessions.lock().expect("sessions lock").len();
        let total_groups = self.groups.lock().expect("groups lock").entries.len();
        StoreStats {
            total_groups,
            total_sessions,
        }
    }

    /// Drop every session opened more than `max_age` before `now`. Each
    /// session is judged by its `opened_at` at the time the lock is held, so
    /// a session re-opened after `now` was sampled is kept.
    pub fn sweep_sessions(&self, now: OffsetDateTime, max_age: Duration) -> usize {
        let mut sessions = self.sessions.lock().expect("sessions lock");
        let before = sessions.len();
        sessions.retain(|_, session| now - session.opened_at <= max_age);
        before - sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn group_usage(&self, chat_instance: &str) -> Option<GroupUsage> {
        let groups = self.groups.lock().expect("groups lock");
        groups.entries.get(chat_instance).cloned()
    }
}
