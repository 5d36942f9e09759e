// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use itertools::Itertools;
use teloxide::utils::markdown::{code_inline, escape, link};

use crate::model::Wallpaper;

fn linked(text: &str, url: Option<&str>) -> String {
    match url {
        Some(url) if !url.is_empty() => link(url, &escape(text)),
        _ => escape(text),
    }
}

pub(crate) fn file_size(bytes: i64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;

    let bytes = bytes as f64;
    if bytes >= MIB {
        format!("{:.1} MB", bytes / MIB)
    } else {
        format!("{:.0} KB", bytes / 1024.0)
    }
}

/// Turns a tag into a hashtag body, if it can be one.
fn hashtag(tag: &str) -> Option<String> {
    let tag = tag.replace([' ', '-'], "_");
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some(tag)
}

pub(crate) fn tags(tags: &[String]) -> String {
    let hashtags = tags
        .iter()
        .filter_map(|tag| hashtag(tag))
        .map(|tag| format!("\\#{}", escape(&tag)))
        .join(" ");

    if hashtags.is_empty() {
        "no tags".to_string()
    } else {
        hashtags
    }
}

pub(crate) fn caption(wallpaper: &Wallpaper) -> String {
    let mut lines = Vec::new();

    match wallpaper.description.as_deref().filter(|text| !text.is_empty()) {
        Some(description) => lines.push(format!("📸 *Wallpaper* _{}_", escape(description))),
        None => lines.push("📸 *Wallpaper*".to_string()),
    }
    lines.push(String::new());
    lines.push(format!(
        "🔗 _Source_: {}",
        linked(&wallpaper.source, wallpaper.source_src.as_deref())
    ));
    if let Some(author) = wallpaper.author.as_deref() {
        lines.push(format!(
            "👨‍🎨 _Author_: {}",
            linked(author, wallpaper.author_url.as_deref())
        ));
    }
    lines.push(format!(
        "📏 _Resolution_: {}",
        code_inline(&format!("{} × {}", wallpaper.width, wallpaper.height))
    ));
    lines.push(format!("💾 _Size_: {}", code_inline(&file_size(wallpaper.size))));
    lines.push(format!("🏷️ _Tags_: {}", tags(&wallpaper.tags)));

    lines.join("\n")
}
