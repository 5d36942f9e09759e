// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::{fmt::Display, str::FromStr};

use anyhow::{Error, bail};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Derives the content address of a wallpaper from its canonical source URL.
pub(crate) fn content_address(src: &str) -> String {
    format!("{:x}", md5::compute(src.as_bytes()))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Wallpaper {
    pub(crate) id: String,
    pub(crate) src: String,
    pub(crate) source: String,
    pub(crate) source_src: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) author_url: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) colors: Vec<String>,
    pub(crate) category: Option<String>,
    /// mime or file type, `type` in the persisted layout
    pub(crate) kind: Option<String>,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) ratio: f64,
    pub(crate) size: i64,
    pub(crate) sfw: bool,
    pub(crate) extra_info: Value,
    /// delivery handle, set after the first successful upload
    pub(crate) file_id: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Wallpaper {
    /// A fresh, never delivered wallpaper addressed by `src`.
    pub(crate) fn new(src: &str, source: &str) -> Self {
        Self {
            id: content_address(src),
            src: src.to_string(),
            source: source.to_string(),
            source_src: None,
            description: None,
            author: None,
            author_url: None,
            tags: Vec::new(),
            colors: Vec::new(),
            category: None,
            kind: None,
            width: 0,
            height: 0,
            ratio: 0.0,
            size: 0,
            sfw: false,
            extra_info: Value::Object(Default::default()),
            file_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Width over height, rounded to two decimals.
pub(crate) fn aspect_ratio(width: i32, height: i32) -> f64 {
    if height == 0 {
        return 0.0;
    }

    (f64::from(width) / f64::from(height) * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Supergroup => "supergroup",
            ChatType::Channel => "channel",
        }
    }
}

impl Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "private" => ChatType::Private,
            "group" => ChatType::Group,
            "supergroup" => ChatType::Supergroup,
            "channel" => ChatType::Channel,
            other => bail!("unknown chat type {other:?}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Subscription {
    pub(crate) chat_id: i64,
    pub(crate) chat_type: ChatType,
    pub(crate) title: String,
    pub(crate) username: Option<String>,
    /// whether we may post with elevated rights in that chat
    pub(crate) is_admin: bool,
    pub(crate) active: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) extra_info: Value,
}

/// Partial update of a subscription; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SubscriptionUpdate {
    pub(crate) chat_type: Option<ChatType>,
    pub(crate) title: Option<String>,
    pub(crate) username: Option<Option<String>>,
    pub(crate) is_admin: Option<bool>,
    pub(crate) active: Option<bool>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) extra_info: Option<Value>,
}

impl SubscriptionUpdate {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn deactivate() -> Self {
        Self {
            active: Some(false),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Safety {
    Safe,
    Unsafe,
    Any,
}

impl Safety {
    /// The required value of the `sfw` flag, if any.
    pub(crate) fn sfw(&self) -> Option<bool> {
        match self {
            Safety::Safe => Some(true),
            Safety::Unsafe => Some(false),
            Safety::Any => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn admits(&self, sfw: bool) -> bool {
        self.sfw().is_none_or(|required| required == sfw)
    }
}
