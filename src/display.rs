use chrono::{DateTime, Local, Utc};
use egui::Color32;
use md5::Digest;
use std::collections::HashMap;

use crate::excerpt;
use crate::sanitize::display_text;

/// Comment timestamps: relative for the first week, a date after that.
pub fn relative_time(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        plural(minutes, "minute")
    } else if hours < 24 {
        plural(hours, "hour")
    } else if days < 7 {
        plural(days, "day")
    } else {
        created.with_timezone(&Local).format("%Y/%m/%d").to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

pub fn post_date(created: DateTime<Utc>) -> String {
    created.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Stable avatar colour for a commenter, keyed on their email.
pub fn avatar_color(email: &str) -> Color32 {
    let digest = md5::compute(email.trim().to_lowercase().as_bytes());
    // Keep channels in the mid range so initials stay readable on both themes.
    let channel = |b: u8| 60 + b % 140;
    Color32::from_rgb(channel(digest[0]), channel(digest[1]), channel(digest[2]))
}

pub fn initial(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

const TEXT_CACHE_LIMIT: usize = 1024;

/// Parsed forms of post and comment HTML, keyed by the md5 of the source so
/// each body is parsed once instead of on every repaint.
#[derive(Default)]
pub struct TextCache {
    excerpts: HashMap<Digest, String>,
    blocks: HashMap<Digest, Vec<String>>,
    comments: HashMap<Digest, String>,
}

impl TextCache {
    pub fn excerpt(&mut self, content: &str) -> &str {
        memo::<String>(&mut self.excerpts, content, excerpt::excerpt)
    }

    pub fn article_blocks(&mut self, content: &str) -> &[String] {
        memo::<Vec<String>>(&mut self.blocks, content, excerpt::article_blocks)
    }

    pub fn comment(&mut self, content: &str) -> &str {
        memo::<String>(&mut self.comments, content, display_text)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.excerpts.len() + self.blocks.len() + self.comments.len()
    }
}

fn memo<'a, T>(map: &'a mut HashMap<Digest, T>, content: &str, parse: impl FnOnce(&str) -> T) -> &'a T {
    if map.len() >= TEXT_CACHE_LIMIT {
        map.clear();
    }
    map.entry(md5::compute(content)).or_insert_with(|| parse(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn relative_time_thresholds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(59), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(59), now), "59 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_time(now - Duration::days(6), now), "6 days ago");

        let old = now - Duration::days(30);
        assert_eq!(relative_time(old, now), old.with_timezone(&Local).format("%Y/%m/%d").to_string());
    }

    #[test]
    fn avatar_color_is_stable_per_email() {
        assert_eq!(avatar_color("Ann@Example.com"), avatar_color(" ann@example.com"));
        assert_ne!(avatar_color("ann@example.com"), avatar_color("bob@example.com"));
    }

    #[test]
    fn initial_handles_empty_names() {
        assert_eq!(initial(" émile"), "É");
        assert_eq!(initial(""), "?");
    }

    #[test]
    fn text_cache_parses_each_body_once() {
        let mut cache = TextCache::default();
        let body = "<p>First paragraph.</p><p>Second one.</p>";

        assert_eq!(cache.excerpt(body), excerpt::excerpt(body));
        assert_eq!(cache.excerpt(body), excerpt::excerpt(body));
        assert_eq!(cache.article_blocks(body), excerpt::article_blocks(body).as_slice());
        assert_eq!(cache.comment("a &lt; b"), "a < b");
        assert_eq!(cache.len(), 3);

        cache.excerpt("<p>Another post.</p>");
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn text_cache_is_bounded() {
        let mut cache = TextCache::default();
        for i in 0..=TEXT_CACHE_LIMIT {
            cache.comment(&format!("comment {}", i));
        }
        assert!(cache.len() <= TEXT_CACHE_LIMIT);
        assert_eq!(cache.comment("comment 3"), "comment 3");
    }
}
