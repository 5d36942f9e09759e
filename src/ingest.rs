// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::fmt::Display;

use anyhow::{Context, Error, Result, ensure};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    model::{Wallpaper, aspect_ratio},
    store::Store,
};

/// A normalized wallpaper record, one JSON object per line.
///
/// Any `id` or `file_id` the record carries is ignored.
#[derive(Debug, Deserialize)]
struct WallpaperRecord {
    src: String,
    source: String,
    source_src: Option<String>,
    description: Option<String>,
    author: Option<String>,
    author_url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    colors: Vec<String>,
    category: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    ratio: Option<f64>,
    #[serde(default)]
    size: i64,
    sfw: Option<bool>,
    extra_info: Option<Value>,
}

impl TryFrom<WallpaperRecord> for Wallpaper {
    type Error = Error;

    fn try_from(value: WallpaperRecord) -> Result<Self, Self::Error> {
        ensure!(!value.src.is_empty(), "record has no src");
        ensure!(value.width >= 0, "negative width {}", value.width);
        ensure!(value.height >= 0, "negative height {}", value.height);
        ensure!(value.size >= 0, "negative size {}", value.size);

        Ok(Self {
            ratio: value
                .ratio
                .unwrap_or_else(|| aspect_ratio(value.width, value.height)),
            source_src: value.source_src,
            description: value.description,
            author: value.author,
            author_url: value.author_url,
            tags: value.tags.into_iter().unique().collect(),
            colors: value.colors,
            category: value.category,
            kind: value.kind,
            width: value.width,
            height: value.height,
            size: value.size,
            sfw: value.sfw.unwrap_or(false),
            extra_info: value
                .extra_info
                .unwrap_or_else(|| Value::Object(Default::default())),
            ..Wallpaper::new(&value.src, &value.source)
        })
    }
}

fn parse(line: &str) -> Result<Wallpaper> {
    let record: WallpaperRecord = serde_json::from_str(line).context("malformed record")?;
    record.try_into()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) stored: usize,
    pub(crate) rejected: usize,
    /// valid records the store did not accept
    pub(crate) failed: usize,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} stored, {} rejected, {} failed",
            self.stored, self.rejected, self.failed
        )
    }
}

/// Upserts every record in `input`; blank lines are skipped.
pub(crate) async fn import(store: &dyn Store, input: &str) -> Report {
    let mut report = Report::default();

    for (number, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match parse(line) {
            Ok(wallpaper) => {
                if store.upsert_wallpaper(&wallpaper).await {
                    report.stored += 1;
                } else {
                    report.failed += 1;
                }
            }
            Err(err) => {
                log::warn!("rejecting record on line {}: {err:#}", number + 1);
                report.rejected += 1;
            }
        }
    }

    report
}
