// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

mod models;
mod schema;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{
    connection::SimpleConnection,
    prelude::*,
    sqlite::{Sqlite, SqliteConnection},
};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};

use self::{
    models::{SubscriptionChanges, SubscriptionRow, WallpaperRow},
    schema::{subscriptions, wallpapers},
};
use super::{SampleQuery, Store, convert_rows, random, run_migrations, with_connection};
use crate::model::{Subscription, SubscriptionUpdate, Wallpaper};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// Embedded single-file store.
#[derive(Debug, Clone)]
pub(crate) struct SqliteStore {
    path: Arc<str>,
}

fn connect(path: &str) -> Result<SqliteConnection> {
    let mut connection = SqliteConnection::establish(path)?;
    connection.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")?;

    Ok(connection)
}

impl SqliteStore {
    pub(crate) fn open(path: &str) -> Result<Self> {
        let mut connection = connect(path)?;
        connection.batch_execute("PRAGMA journal_mode = WAL;")?;
        run_migrations::<Sqlite>(&mut connection, MIGRATIONS)?;
        log::debug!("opened sqlite store at {path}");

        Ok(Self { path: path.into() })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_wallpaper(&self, wallpaper: &Wallpaper) -> bool {
        let row = WallpaperRow::from(wallpaper);
        with_connection(&self.path, connect, "upsert wallpaper", move |connection| {
            diesel::replace_into(wallpapers::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn wallpaper(&self, id: &str) -> Option<Wallpaper> {
        let id = id.to_string();
        let rows = with_connection(&self.path, connect, "get wallpaper", move |connection| {
            Ok(wallpapers::table
                .find(id)
                .select(WallpaperRow::as_select())
                .load::<WallpaperRow>(connection)?)
        })
        .await?;

        convert_rows(rows, "wallpaper").into_iter().next()
    }

    async fn wallpapers_by_src(&self, src: &str) -> Vec<Wallpaper> {
        let src = src.to_string();
        let rows = with_connection(&self.path, connect, "get wallpapers by src", move |connection| {
            Ok(wallpapers::table
                .filter(wallpapers::src.eq(src))
                .select(WallpaperRow::as_select())
                .load::<WallpaperRow>(connection)?)
        })
        .await
        .unwrap_or_default();

        convert_rows(rows, "wallpaper")
    }

    async fn sample_wallpapers(&self, query: &SampleQuery) -> Vec<Wallpaper> {
        if query.limit <= 0 {
            return Vec::new();
        }

        let query = query.clone();
        let rows = with_connection(&self.path, connect, "sample wallpapers", move |connection| {
            let mut statement = wallpapers::table
                .select(WallpaperRow::as_select())
                .into_boxed();

            if query.max_size > 0 {
                statement = statement.filter(wallpapers::size.le(query.max_size));
            }
            if query.max_width > 0 {
                statement = statement.filter(wallpapers::width.le(query.max_width));
            }
            if query.max_height > 0 {
                statement = statement.filter(wallpapers::height.le(query.max_height));
            }
            if let Some(sfw) = query.safety.sfw() {
                statement = statement.filter(wallpapers::sfw.eq(sfw));
            }
            if query.undelivered_only {
                statement = statement.filter(wallpapers::file_id.is_null());
            }

            Ok(statement
                .order(random())
                .limit(query.limit)
                .load::<WallpaperRow>(connection)?)
        })
        .await
        .unwrap_or_default();

        convert_rows(rows, "wallpaper")
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> bool {
        let row = SubscriptionRow::from(subscription);
        with_connection(&self.path, connect, "upsert subscription", move |connection| {
            diesel::replace_into(subscriptions::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn update_subscription(&self, chat_id: i64, update: &SubscriptionUpdate) -> bool {
        if update.is_empty() {
            return true;
        }

        let changes = SubscriptionChanges::from(update);
        with_connection(&self.path, connect, "update subscription", move |connection| {
            Ok(diesel::update(subscriptions::table.find(chat_id))
                .set(&changes)
                .execute(connection)?)
        })
        .await
        .is_some_and(|updated| updated > 0)
    }

    async fn subscription(&self, chat_id: i64) -> Option<Subscription> {
        let rows = with_connection(&self.path, connect, "get subscription", move |connection| {
            Ok(subscriptions::table
                .find(chat_id)
                .select(SubscriptionRow::as_select())
                .load::<SubscriptionRow>(connection)?)
        })
        .await?;

        convert_rows(rows, "subscription").into_iter().next()
    }

    async fn active_subscriptions(&self) -> Vec<Subscription> {
        let rows = with_connection(&self.path, connect, "get active subscriptions", |connection| {
            Ok(subscriptions::table
                .filter(subscriptions::active.eq(true))
                .select(SubscriptionRow::as_select())
                .load::<SubscriptionRow>(connection)?)
        })
        .await
        .unwrap_or_default();

        convert_rows(rows, "subscription")
    }
}
