//! Caption assembly from companion text and folder hashtags.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::{CaptionConfig, MarkerSpacing};
use crate::media::MediaItem;

/// Builds captions for delivered items. Construction never fails: missing or
/// empty companion text falls back to hashtags only.
#[derive(Debug, Clone)]
pub struct CaptionBuilder {
    max_length: usize,
    marker: Option<(Regex, String)>,
    categories: BTreeMap<String, String>,
}

impl CaptionBuilder {
    pub fn new(config: &CaptionConfig, categories: &BTreeMap<String, String>) -> Self {
        let marker = config
            .marker
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .and_then(|m| {
                let m = m.trim();
                let pattern = Regex::new(&format!(r"\s*{}\s*", regex::escape(m))).ok()?;
                let replacement = match config.marker_spacing {
                    MarkerSpacing::Before => format!(" {m}"),
                    MarkerSpacing::After => format!("{m} "),
                };
                Some((pattern, replacement))
            });
        Self {
            max_length: config.max_length,
            marker,
            categories: categories.clone(),
        }
    }

    /// Caption for `item`, using `companion` text when it has content.
    pub fn build(&self, item: &MediaItem, companion: Option<&str>) -> String {
        let tags = self.hashtags(&item.folder);
        let body = companion
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| self.body(text))
            .filter(|body| !body.is_empty());

        match body {
            Some(body) if tags.is_empty() => body,
            Some(body) => format!("{body} {tags}"),
            None => tags,
        }
    }

    /// Normalized and truncated companion text.
    fn body(&self, text: &str) -> String {
        let spaced = match &self.marker {
            Some((pattern, replacement)) => {
                pattern.replace_all(text, replacement.as_str()).into_owned()
            }
            None => text.to_owned(),
        };
        let truncated: String = spaced.trim().chars().take(self.max_length).collect();
        truncated.trim().to_owned()
    }

    /// `#folder` plus the folder's category hashtag when one is mapped.
    fn hashtags(&self, folder: &str) -> String {
        let mut tags = Vec::with_capacity(2);
        let folder_tag = sanitize_hashtag(folder);
        if !folder_tag.is_empty() {
            tags.push(format!("#{folder_tag}"));
        }
        if let Some(category) = self
            .categories
            .get(folder)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
        {
            if category.starts_with('#') {
                tags.push(category.to_owned());
            } else {
                tags.push(format!("#{category}"));
            }
        }
        tags.join(" ")
    }
}

/// Characters other than letters, digits and `_` would end a hashtag, so they become `_`.
fn sanitize_hashtag(folder: &str) -> String {
    folder
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
