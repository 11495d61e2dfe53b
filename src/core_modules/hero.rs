// THEORY:
// A hero is a page region that carries its media configuration as four data
// attributes: a background image, a comma-separated video source list, a poster
// and a focal position. This module reads that configuration once and resolves
// which media mode the hero runs in. It performs no I/O and touches no styling.
//
// Resolution order: a non-empty video list wins, even when a background image is
// also given; otherwise a non-empty background image selects image mode;
// otherwise the hero is unconfigured and stays on its stylesheet defaults.

use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_POSITION: &str = "center center";

/// Attribute names as they appear on the hero element.
pub const ATTR_BG: &str = "data-bg";
pub const ATTR_VIDEO: &str = "data-video";
pub const ATTR_POSTER: &str = "data-poster";
pub const ATTR_POSITION: &str = "data-position";

/// Per-instance configuration, read once.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct HeroConfig {
    /// Background image URL.
    pub bg: Option<String>,
    /// Comma-separated video source URLs.
    pub video: Option<String>,
    /// Video poster image URL.
    pub poster: Option<String>,
    /// Focal point, any CSS position string.
    pub position: Option<String>,
}

impl HeroConfig {
    /// Builds the configuration from an element's raw attribute map.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Self {
        Self {
            bg: attributes.get(ATTR_BG).cloned(),
            video: attributes.get(ATTR_VIDEO).cloned(),
            poster: attributes.get(ATTR_POSTER).cloned(),
            position: attributes.get(ATTR_POSITION).cloned(),
        }
    }

    /// The focal position, trimmed, falling back to `center center`.
    pub fn focal_position(&self) -> String {
        non_empty(&self.position)
            .unwrap_or(DEFAULT_POSITION)
            .to_string()
    }

    /// Video sources in declaration order; empty entries are dropped.
    pub fn video_sources(&self) -> Vec<VideoSource> {
        non_empty(&self.video)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(VideoSource::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Decides the media mode for this hero.
    pub fn resolve(&self) -> MediaMode {
        let sources = self.video_sources();
        if !sources.is_empty() {
            return MediaMode::Video(VideoPlayback::new(
                sources,
                non_empty(&self.poster).map(str::to_string),
            ));
        }
        match non_empty(&self.bg) {
            Some(src) => MediaMode::Image {
                src: src.to_string(),
            },
            None => MediaMode::Unconfigured,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// How a hero's background is driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaMode {
    Video(VideoPlayback),
    Image { src: String },
    Unconfigured,
}

impl MediaMode {
    pub fn name(&self) -> &'static str {
        match self {
            MediaMode::Video(_) => "video",
            MediaMode::Image { .. } => "image",
            MediaMode::Unconfigured => "unconfigured",
        }
    }
}

/// One `<source>` of the background video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub url: String,
    /// Container type hint; `None` lets the runtime probe the file.
    pub mime: Option<&'static str>,
}

impl VideoSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            mime: guess_type(url),
        }
    }
}

/// Infers the container type from the URL's file extension, ignoring any
/// query string or fragment.
pub fn guess_type(url: &str) -> Option<&'static str> {
    let path = url.split('?').next().unwrap_or(url);
    let path = path.split('#').next().unwrap_or(path);
    let ext = path.trim().rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

/// Description of the background video element the host has to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPlayback {
    pub sources: Vec<VideoSource>,
    pub poster: Option<String>,
    /// Autoplay requires muted playback.
    pub muted: bool,
    pub autoplay: bool,
    pub plays_inline: bool,
    pub looped: bool,
    pub preload: &'static str,
}

impl VideoPlayback {
    pub fn new(sources: Vec<VideoSource>, poster: Option<String>) -> Self {
        Self {
            sources,
            poster,
            muted: true,
            autoplay: true,
            plays_inline: true,
            looped: true,
            preload: "metadata",
        }
    }

    /// The source URLs joined back into one comma-separated list.
    pub fn source_list(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.url.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}
