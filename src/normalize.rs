use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::upstream::RawVideo;

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub views: String,
    pub likes: String,
    pub comments: String,
    pub shares: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MusicView {
    pub title: String,
    pub author: String,
    #[serde(rename = "isOriginal")]
    pub is_original: bool,
    pub download: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    pub name: String,
    pub nickname: String,
    pub profile_images: String,
}

/// Download links branch on the post kind: a slide post carries an ordered
/// image sequence, a plain video a watermark/no-watermark pair.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DownloadLinks {
    Images(Vec<String>),
    Video {
        watermark: String,
        no_watermark: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoView {
    pub id: String,
    pub title: String,
    pub region: String,
    #[serde(rename = "sizeMedia")]
    pub size_media: u64,
    pub created: String,
    pub duration: String,
    pub thumbnail: String,
    pub stats: StatsView,
    pub music: Option<MusicView>,
    pub author: Option<AuthorView>,
    #[serde(rename = "isSlide")]
    pub is_slide: bool,
    pub download: DownloadLinks,
}

/// Reduced view used in search listings: always a video link pair, with
/// relative upstream paths resolved against the service base URL.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultView {
    pub id: String,
    pub title: String,
    pub region: String,
    #[serde(rename = "sizeMedia")]
    pub size_media: u64,
    pub created: String,
    pub duration: String,
    pub thumbnail: String,
    pub stats: StatsView,
    pub music: Option<MusicView>,
    pub author: Option<AuthorView>,
    pub download: DownloadLinks,
}

pub fn normalize_video(raw: RawVideo) -> VideoView {
    let is_slide = raw.images.is_some();
    let download = match raw.images {
        Some(images) => DownloadLinks::Images(images),
        None => DownloadLinks::Video {
            watermark: raw.wmplay,
            no_watermark: raw.play,
        },
    };

    VideoView {
        id: raw.id,
        title: raw.title,
        region: raw.region,
        size_media: raw.size,
        created: created_display(raw.create_time),
        duration: format!("{}s", raw.duration),
        thumbnail: raw.cover,
        stats: StatsView {
            views: group_thousands(raw.play_count),
            likes: group_thousands(raw.digg_count),
            comments: group_thousands(raw.comment_count),
            shares: group_thousands(raw.share_count),
        },
        music: raw.music_info.map(|music| MusicView {
            title: music.title,
            author: music.author,
            is_original: music.original,
            download: music.play,
        }),
        author: raw.author.map(|author| AuthorView {
            name: author.nickname.clone(),
            nickname: author.nickname,
            profile_images: author.avatar,
        }),
        is_slide,
        download,
    }
}

pub fn normalize_search_result(raw: RawVideo, base_url: &str) -> SearchResultView {
    SearchResultView {
        id: raw.id,
        title: raw.title,
        region: raw.region,
        size_media: raw.size,
        created: created_display(raw.create_time),
        duration: format!("{}s", raw.duration),
        thumbnail: resolve_upstream_path(base_url, &raw.cover),
        stats: StatsView {
            views: group_thousands(raw.play_count),
            likes: group_thousands(raw.digg_count),
            comments: group_thousands(raw.comment_count),
            shares: group_thousands(raw.share_count),
        },
        music: raw.music_info.map(|music| MusicView {
            title: music.title,
            author: music.author,
            is_original: music.original,
            download: music.play,
        }),
        author: raw.author.map(|author| AuthorView {
            name: author.nickname.clone(),
            nickname: author.nickname,
            profile_images: resolve_upstream_path(base_url, &author.avatar),
        }),
        download: DownloadLinks::Video {
            watermark: resolve_upstream_path(base_url, &raw.wmplay),
            no_watermark: resolve_upstream_path(base_url, &raw.play),
        },
    }
}

/// Display string for the creation field.
///
/// Reproduces the source behavior literally: `create_time` (an epoch value
/// in seconds) is subtracted from the current time as if it were a
/// millisecond offset, then formatted as an absolute local date-time. That
/// conflates "time since creation" with "creation time"; kept as-is so the
/// rendered values match the original service.
fn created_display(create_time: i64) -> String {
    let now_ms = Utc::now().timestamp_millis();
    let display_ms = now_ms.saturating_sub(create_time);
    DateTime::from_timestamp_millis(display_ms)
        .map(|datetime| {
            datetime
                .with_timezone(&Local)
                .format("%-m/%-d/%Y, %-I:%M:%S %p")
                .to_string()
        })
        .unwrap_or_default()
}

/// Search payloads carry upstream-relative media paths; absolute URLs pass
/// through untouched.
fn resolve_upstream_path(base_url: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// Locale-style digit grouping, the `toLocaleString()` equivalent.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Compact counter for UI badges: 1500 -> "1.5K", 2500000 -> "2.5M".
pub fn format_number(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

/// Human file size, 1024-based, trailing zeros trimmed.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "Unknown".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = (bytes.ilog2() / 10).min(UNITS.len() as u32 - 1);
    let scaled = bytes as f64 / f64::powi(1024.0, exponent as i32);
    let rounded = format!("{scaled:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[exponent as usize])
}
