// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use crate::{
    model::Wallpaper,
    store::{SampleQuery, Store},
};

/// Samples among never delivered wallpapers first, falling back to all
/// matching wallpapers when every one of them has been delivered already.
pub(crate) async fn prefer_undelivered(store: &dyn Store, query: &SampleQuery) -> Vec<Wallpaper> {
    let undelivered = store.sample_wallpapers(&query.undelivered()).await;
    if !undelivered.is_empty() || query.undelivered_only {
        return undelivered;
    }

    log::debug!("no undelivered wallpaper matches {query:?}, sampling delivered ones");
    store.sample_wallpapers(query).await
}

/// Picks a single candidate for delivery.
pub(crate) async fn candidate(store: &dyn Store, query: &SampleQuery) -> Option<Wallpaper> {
    let query = SampleQuery {
        limit: 1,
        ..query.clone()
    };

    prefer_undelivered(store, &query).await.into_iter().next()
}
