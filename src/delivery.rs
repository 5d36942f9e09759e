// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::fmt::Display;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::Wallpaper;

/// What to send: a handle returned by an earlier upload, or the image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Photo<'a> {
    Handle(&'a str),
    Url(&'a str),
}

impl Display for Photo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Photo::Handle(_) => f.write_str("cached handle"),
            Photo::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Sends a single photo to a single chat.
#[async_trait]
pub(crate) trait Delivery: Send + Sync {
    /// Renders the caption in whatever markup the platform expects.
    fn caption(&self, wallpaper: &Wallpaper) -> String;

    /// Returns the handle under which the platform stored the photo.
    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Photo<'_>,
        caption: &str,
        sensitive: bool,
    ) -> Result<String>;
}
