// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use anyhow::{Context, Error, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::model::{Subscription, SubscriptionUpdate, Wallpaper};

/// Lists are kept as JSON arrays, so entries may contain any character.
fn encode_list(values: &[String]) -> String {
    serde_json::Value::from(values).to_string()
}

fn decode_list(value: &str) -> Result<Vec<String>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(value).context("invalid list")
}

fn decode_json(value: &str) -> Result<serde_json::Value> {
    if value.is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }

    serde_json::from_str(value).context("invalid extra_info")
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = super::schema::wallpapers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct WallpaperRow {
    pub(super) id: String,
    pub(super) src: String,
    pub(super) source: String,
    pub(super) source_src: Option<String>,
    pub(super) description: Option<String>,
    pub(super) author: Option<String>,
    pub(super) author_url: Option<String>,
    pub(super) tags: String,
    pub(super) colors: String,
    pub(super) category: Option<String>,
    pub(super) width: i32,
    pub(super) height: i32,
    pub(super) ratio: f64,
    pub(super) size: i64,
    pub(super) sfw: bool,
    pub(super) kind: Option<String>,
    pub(super) extra_info: String,
    pub(super) file_id: Option<String>,
    pub(super) created_at: NaiveDateTime,
}

impl From<&Wallpaper> for WallpaperRow {
    fn from(value: &Wallpaper) -> Self {
        Self {
            id: value.id.clone(),
            src: value.src.clone(),
            source: value.source.clone(),
            source_src: value.source_src.clone(),
            description: value.description.clone(),
            author: value.author.clone(),
            author_url: value.author_url.clone(),
            tags: encode_list(&value.tags),
            colors: encode_list(&value.colors),
            category: value.category.clone(),
            width: value.width,
            height: value.height,
            ratio: value.ratio,
            size: value.size,
            sfw: value.sfw,
            kind: value.kind.clone(),
            extra_info: value.extra_info.to_string(),
            file_id: value.file_id.clone(),
            created_at: value.created_at.naive_utc(),
        }
    }
}

impl TryFrom<WallpaperRow> for Wallpaper {
    type Error = Error;

    fn try_from(value: WallpaperRow) -> Result<Self> {
        Ok(Self {
            extra_info: decode_json(&value.extra_info)
                .with_context(|| format!("wallpaper {}", value.id))?,
            tags: decode_list(&value.tags).with_context(|| format!("tags of {}", value.id))?,
            colors: decode_list(&value.colors)
                .with_context(|| format!("colors of {}", value.id))?,
            id: value.id,
            src: value.src,
            source: value.source,
            source_src: value.source_src,
            description: value.description,
            author: value.author,
            author_url: value.author_url,
            category: value.category,
            width: value.width,
            height: value.height,
            ratio: value.ratio,
            size: value.size,
            sfw: value.sfw,
            kind: value.kind,
            file_id: value.file_id,
            created_at: value.created_at.and_utc(),
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = super::schema::subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct SubscriptionRow {
    pub(super) chat_id: i64,
    pub(super) chat_type: String,
    pub(super) title: String,
    pub(super) username: Option<String>,
    pub(super) is_admin: bool,
    pub(super) active: bool,
    pub(super) created_at: NaiveDateTime,
    pub(super) updated_at: NaiveDateTime,
    pub(super) extra_info: String,
}

impl From<&Subscription> for SubscriptionRow {
    fn from(value: &Subscription) -> Self {
        Self {
            chat_id: value.chat_id,
            chat_type: value.chat_type.to_string(),
            title: value.title.clone(),
            username: value.username.clone(),
            is_admin: value.is_admin,
            active: value.active,
            created_at: value.created_at.naive_utc(),
            updated_at: value.updated_at.naive_utc(),
            extra_info: value.extra_info.to_string(),
        }
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = Error;

    fn try_from(value: SubscriptionRow) -> Result<Self> {
        Ok(Self {
            chat_type: value
                .chat_type
                .parse()
                .with_context(|| format!("subscription {}", value.chat_id))?,
            extra_info: decode_json(&value.extra_info)
                .with_context(|| format!("subscription {}", value.chat_id))?,
            chat_id: value.chat_id,
            title: value.title,
            username: value.username,
            is_admin: value.is_admin,
            active: value.active,
            created_at: value.created_at.and_utc(),
            updated_at: value.updated_at.and_utc(),
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = super::schema::subscriptions)]
pub(super) struct SubscriptionChanges {
    chat_type: Option<String>,
    title: Option<String>,
    username: Option<Option<String>>,
    is_admin: Option<bool>,
    active: Option<bool>,
    updated_at: Option<NaiveDateTime>,
    extra_info: Option<String>,
}

impl From<&SubscriptionUpdate> for SubscriptionChanges {
    fn from(value: &SubscriptionUpdate) -> Self {
        Self {
            chat_type: value.chat_type.map(|chat_type| chat_type.to_string()),
            title: value.title.clone(),
            username: value.username.clone(),
            is_admin: value.is_admin,
            active: value.active,
            updated_at: value.updated_at.map(|updated_at| updated_at.naive_utc()),
            extra_info: value.extra_info.as_ref().map(|extra_info| extra_info.to_string()),
        }
    }
}
