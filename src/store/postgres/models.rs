// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use anyhow::{Context, Error, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::model::{Subscription, SubscriptionUpdate, Wallpaper};

#[derive(Queryable, Selectable)]
#[diesel(table_name = super::schema::wallpapers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(super) struct WallpaperRow {
    pub(super) id: String,
    pub(super) src: String,
    pub(super) source: String,
    pub(super) source_src: Option<String>,
    pub(super) description: Option<String>,
    pub(super) author: Option<String>,
    pub(super) author_url: Option<String>,
    pub(super) tags: Vec<String>,
    pub(super) colors: Vec<String>,
    pub(super) category: Option<String>,
    pub(super) width: i32,
    pub(super) height: i32,
    pub(super) ratio: f64,
    pub(super) size: i64,
    pub(super) sfw: bool,
    pub(super) kind: Option<String>,
    pub(super) extra_info: Value,
    pub(super) file_id: Option<String>,
    pub(super) created_at: DateTime<Utc>,
}

impl TryFrom<WallpaperRow> for Wallpaper {
    type Error = Error;

    fn try_from(value: WallpaperRow) -> Result<Self> {
        Ok(Self {
            id: value.id,
            src: value.src,
            source: value.source,
            source_src: value.source_src,
            description: value.description,
            author: value.author,
            author_url: value.author_url,
            tags: value.tags,
            colors: value.colors,
            category: value.category,
            width: value.width,
            height: value.height,
            ratio: value.ratio,
            size: value.size,
            sfw: value.sfw,
            kind: value.kind,
            extra_info: value.extra_info,
            file_id: value.file_id,
            created_at: value.created_at,
        })
    }
}

/// The insertable part of a wallpaper; `created_at` is always set by the server.
#[derive(Insertable, AsChangeset)]
#[diesel(table_name = super::schema::wallpapers)]
#[diesel(treat_none_as_null = true)]
pub(super) struct NewWallpaper<'a> {
    pub(super) id: &'a str,
    pub(super) src: &'a str,
    pub(super) source: &'a str,
    pub(super) source_src: Option<&'a str>,
    pub(super) description: Option<&'a str>,
    pub(super) author: Option<&'a str>,
    pub(super) author_url: Option<&'a str>,
    pub(super) tags: &'a [String],
    pub(super) colors: &'a [String],
    pub(super) category: Option<&'a str>,
    pub(super) width: i32,
    pub(super) height: i32,
    pub(super) ratio: f64,
    pub(super) size: i64,
    pub(super) sfw: bool,
    pub(super) kind: Option<&'a str>,
    pub(super) extra_info: &'a Value,
    pub(super) file_id: Option<&'a str>,
}

impl<'a> From<&'a Wallpaper> for NewWallpaper<'a> {
    fn from(value: &'a Wallpaper) -> Self {
        Self {
            id: &value.id,
            src: &value.src,
            source: &value.source,
            source_src: value.source_src.as_deref(),
            description: value.description.as_deref(),
            author: value.author.as_deref(),
            author_url: value.author_url.as_deref(),
            tags: &value.tags,
            colors: &value.colors,
            category: value.category.as_deref(),
            width: value.width,
            height: value.height,
            ratio: value.ratio,
            size: value.size,
            sfw: value.sfw,
            kind: value.kind.as_deref(),
            extra_info: &value.extra_info,
            file_id: value.file_id.as_deref(),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = super::schema::subscriptions)]
#[diesel(primary_key(chat_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(super) struct SubscriptionRow {
    pub(super) chat_id: i64,
    pub(super) chat_type: String,
    pub(super) title: String,
    pub(super) username: Option<String>,
    pub(super) is_admin: bool,
    pub(super) active: bool,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
    pub(super) extra_info: Value,
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
            created_at: value.created_at,
            updated_at: value.updated_at,
            extra_info: value.extra_info.clone(),
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
            chat_id: value.chat_id,
            title: value.title,
            username: value.username,
            is_admin: value.is_admin,
            active: value.active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            extra_info: value.extra_info,
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
    updated_at: Option<DateTime<Utc>>,
    extra_info: Option<Value>,
}

impl From<&SubscriptionUpdate> for SubscriptionChanges {
    fn from(value: &SubscriptionUpdate) -> Self {
        Self {
            chat_type: value.chat_type.map(|chat_type| chat_type.to_string()),
            title: value.title.clone(),
            username: value.username.clone(),
            is_admin: value.is_admin,
            active: value.active,
            updated_at: value.updated_at,
            extra_info: value.extra_info.clone(),
        }
    }
}
