// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(crate) mod postgres;
pub(crate) mod sqlite;

use std::{error::Error, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use diesel::{backend::Backend as DieselBackend, define_sql_function, sql_types::Integer};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tokio::task;

use crate::{
    config::{Backend, DatabaseConfiguration},
    model::{Safety, Subscription, SubscriptionUpdate, Wallpaper},
};

define_sql_function!(fn random() -> Integer);

/// Constraints for [`Store::sample_wallpapers`]; zero ceilings are not applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SampleQuery {
    pub(crate) limit: i64,
    pub(crate) max_size: i64,
    pub(crate) max_width: i32,
    pub(crate) max_height: i32,
    pub(crate) safety: Safety,
    /// only consider wallpapers without a delivery handle
    pub(crate) undelivered_only: bool,
}

impl SampleQuery {
    pub(crate) fn new(limit: i64, max_size: i64, max_width: i32, max_height: i32, safety: Safety) -> Self {
        Self {
            limit,
            max_size,
            max_width,
            max_height,
            safety,
            undelivered_only: false,
        }
    }

    pub(crate) fn undelivered(&self) -> Self {
        Self {
            undelivered_only: true,
            ..self.clone()
        }
    }
}

/// Persistence of wallpapers and subscriptions.
///
/// Implementations never surface backend errors: failures are logged and
/// reported as `false`, an empty result, or `None`. Every call uses its own
/// connection and every write is a single statement.
#[async_trait]
pub(crate) trait Store: Send + Sync {
    /// Inserts the wallpaper or replaces the one with the same `id`.
    async fn upsert_wallpaper(&self, wallpaper: &Wallpaper) -> bool;

    async fn wallpaper(&self, id: &str) -> Option<Wallpaper>;

    async fn wallpapers_by_src(&self, src: &str) -> Vec<Wallpaper>;

    /// Uniformly samples up to `query.limit` wallpapers matching the query.
    async fn sample_wallpapers(&self, query: &SampleQuery) -> Vec<Wallpaper>;

    /// Inserts the subscription or replaces the one with the same `chat_id`.
    async fn upsert_subscription(&self, subscription: &Subscription) -> bool;

    /// Applies a partial update; an empty update succeeds without touching the store.
    async fn update_subscription(&self, chat_id: i64, update: &SubscriptionUpdate) -> bool;

    async fn subscription(&self, chat_id: i64) -> Option<Subscription>;

    async fn active_subscriptions(&self) -> Vec<Subscription>;

    async fn deactivate_subscription(&self, chat_id: i64) -> bool {
        self.update_subscription(chat_id, &SubscriptionUpdate::deactivate())
            .await
    }
}

pub(crate) fn open(config: &DatabaseConfiguration) -> Result<Arc<dyn Store>> {
    Ok(match config.backend() {
        Backend::Sqlite => Arc::new(sqlite::SqliteStore::open(config.url())?),
        Backend::Postgres => Arc::new(postgres::PostgresStore::open(config.url())?),
    })
}

fn run_migrations<DB: DieselBackend>(
    connection: &mut impl MigrationHarness<DB>,
    migrations: EmbeddedMigrations,
) -> Result<()> {
    let applied = connection
        .run_pending_migrations(migrations)
        .map_err(|err: Box<dyn Error + Send + Sync + 'static>| anyhow!(err.to_string()))?;

    for migration in applied {
        log::info!("applied migration {migration}");
    }

    Ok(())
}

/// Runs `operation` on a blocking thread with a connection of its own.
///
/// Errors are logged here and turned into `None`.
async fn with_connection<C, T, F>(
    url: &Arc<str>,
    connect: fn(&str) -> Result<C>,
    what: &'static str,
    operation: F,
) -> Option<T>
where
    C: 'static,
    T: Send + 'static,
    F: FnOnce(&mut C) -> Result<T> + Send + 'static,
{
    let url = url.clone();
    let result = task::spawn_blocking(move || {
        let mut connection = connect(&url)?;
        operation(&mut connection)
    })
    .await;

    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            log::error!("failed to {what}: {err:#}");
            None
        }
        Err(err) => {
            log::error!("failed to {what}: {err}");
            None
        }
    }
}

/// Keeps the rows that convert cleanly, logging the others.
fn convert_rows<R, T>(rows: Vec<R>, what: &str) -> Vec<T>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("skipping malformed {what}: {err:#}");
                None
            }
        })
        .collect()
}
