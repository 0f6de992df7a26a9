//! Verification of mini app init data.
//!
//! The chat platform signs the launch parameters it hands to a mini app with
//! a key derived from the bot token. A payload is accepted only when its
//! `hash` field matches the HMAC-SHA256 of the sorted, newline-joined
//! remaining fields.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY_LABEL: &[u8] = b"WebAppData";
const HASH_FIELD: &str = "hash";
const HASH_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("init data has no hash field")]
    MissingHash,
    #[error("init data signature mismatch")]
    BadSignature,
    #[error("init data field `{0}` is missing or malformed")]
    MalformedField(&'static str),
    #[error("init data is older than the accepted window")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    Sender,
    Other(String),
}

impl ChatType {
    pub fn as_str(&self) -> &str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Supergroup => "supergroup",
            ChatType::Channel => "channel",
            ChatType::Sender => "sender",
            ChatType::Other(raw) => raw,
        }
    }
}

impl From<String> for ChatType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "private" => ChatType::Private,
            "group" => ChatType::Group,
            "supergroup" => ChatType::Supergroup,
            "channel" => ChatType::Channel,
            "sender" => ChatType::Sender,
            _ => ChatType::Other(raw),
        }
    }
}

impl Serialize for ChatType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChatType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ChatType::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_write_to_pm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Typed view of a verified payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub user_id: i64,
    pub user: WebAppUser,
    pub chat: Option<WebAppChat>,
    pub chat_instance: Option<String>,
    pub chat_type: Option<ChatType>,
    pub start_param: Option<String>,
    pub query_id: Option<String>,
    pub auth_date: Option<OffsetDateTime>,
    /// Signed fields without a dedicated slot, passed through verbatim.
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct InitDataVerifier {
    secret_key: Vec<u8>,
    max_age: Option<Duration>,
}

// The derived key is as sensitive as the bot token itself.
impl std::fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitDataVerifier")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl InitDataVerifier {
    pub fn new(bot_token: &str) -> Self {
        let mut mac = new_mac(SECRET_KEY_LABEL);
        mac.update(bot_token.as_bytes());
        Self {
            secret_key: mac.finalize().into_bytes().to_vec(),
            max_age: None,
        }
    }

    /// Reject payloads whose `auth_date` is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn verify(&self, init_data: &str) -> Result<DecodedPayload, AuthError> {
        self.verify_at(init_data, OffsetDateTime::now_utc())
    }

    pub fn verify_at(
        &self,
        init_data: &str,
        now: OffsetDateTime,
    ) -> Result<DecodedPayload, AuthError> {
        let mut fields: Vec<(String, String)> =
            url::form_urlencoded::parse(init_data.as_bytes())
                .into_owned()
                .collect();

        let hash = fields
            .iter()
            .find(|(key, _)| key == HASH_FIELD)
            .map(|(_, value)| value.clone())
            .ok_or(AuthError::MissingHash)?;
        fields.retain(|(key, _)| key != HASH_FIELD);
        sort_fields(&mut fields);

        self.check_signature(&data_check_string(&fields), &hash)?;

        let payload = decode_fields(fields)?;
        if let Some(max_age) = self.max_age {
            let auth_date = payload
                .auth_date
                .ok_or(AuthError::MalformedField("auth_date"))?;
            if now - auth_date > max_age {
                return Err(AuthError::Expired);
            }
        }
        Ok(payload)
    }

    /// Produce a signed init data string for the given fields, in the same
    /// shape the platform would issue it. Used by the `sign` subcommand and
    /// by tests.
    pub fn sign(&self, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<(String, String)> = fields
            .iter()
            .filter(|(key, _)| *key != HASH_FIELD)
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        sort_fields(&mut sorted);
        let mac = self.mac_for(&data_check_string(&sorted));
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields.iter().filter(|(key, _)| *key != HASH_FIELD) {
            serializer.append_pair(key, value);
        }
        serializer.append_pair(HASH_FIELD, &hash);
        serializer.finish()
    }

    fn mac_for(&self, check_string: &str) -> HmacSha256 {
        let mut mac = new_mac(&self.secret_key);
        mac.update(check_string.as_bytes());
        mac
    }

    fn check_signature(&self, check_string: &str, hash: &str) -> Result<(), AuthError> {
        if hash.len() != HASH_HEX_LEN
            || !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(AuthError::BadSignature);
        }
        let expected = hex::decode(hash).map_err(|_| AuthError::BadSignature)?;
        self.mac_for(check_string)
            .verify_slice(&expected)
            .map_err(|_| AuthError::BadSignature)
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("hmac accepts keys of any length")
}

// Stable, so repeated keys keep their relative input order.
fn sort_fields(fields: &mut [(String, String)]) {
    fields.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
}

fn data_check_string(sorted_fields: &[(String, String)]) -> String {
    sorted_fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_fields(fields: Vec<(String, String)>) -> Result<DecodedPayload, AuthError> {
    // Later occurrences of a key win.
    let mut fields: BTreeMap<String, String> = fields.into_iter().collect();

    let raw_user = fields
        .remove("user")
        .ok_or(AuthError::MalformedField("user"))?;
    let user: WebAppUser =
        serde_json::from_str(&raw_user).map_err(|_| AuthError::MalformedField("user"))?;

    let chat = match fields.remove("chat") {
        Some(raw_chat) => Some(
            serde_json::from_str::<WebAppChat>(&raw_chat)
                .map_err(|_| AuthError::MalformedField("chat"))?,
        ),
        None => None,
    };

    let auth_date = fields
        .remove("auth_date")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok());

    Ok(DecodedPayload {
        user_id: user.id,
        user,
        chat,
        chat_instance: fields.remove("chat_instance").filter(|value| !value.is_empty()),
        chat_type: fields
            .remove("chat_type")
            .filter(|value| !value.is_empty())
            .map(ChatType::from),
        start_param: fields.remove("start_param"),
        query_id: fields.remove("query_id"),
        auth_date,
        extra: fields,
    })
}
