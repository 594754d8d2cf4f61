//! Hero slideshow: slide type detection and autoplay timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Default autoplay interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".ogg", ".mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    Image,
    Video,
    Youtube,
}

impl SlideKind {
    /// Classify a slide by its URL, honouring an explicit `video` declaration.
    pub fn detect(url: &str, declared: Option<&str>) -> Self {
        if url.contains("youtube.com") || url.contains("youtu.be") {
            return SlideKind::Youtube;
        }
        let lower = url.to_lowercase();
        if VIDEO_EXTENSIONS.iter().any(|ext| lower.contains(ext)) || declared == Some("video") {
            SlideKind::Video
        } else {
            SlideKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlideKind::Image => "image",
            SlideKind::Video => "video",
            SlideKind::Youtube => "youtube",
        }
    }
}

/// Extract the video id from `watch?v=ID` and `youtu.be/ID` URLs.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let id = match (url.split_once("watch?v="), url.split_once("youtu.be/")) {
        (Some((_, rest)), _) => rest.split('&').next()?,
        (None, Some((_, rest))) => rest.split('?').next()?,
        (None, None) => return None,
    };

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Muted, looping, chrome-less autoplay embed for a YouTube video.
pub fn youtube_embed_url(video_id: &str) -> String {
    format!(
        "https://www.youtube.com/embed/{id}?autoplay=1&mute=1&loop=1&playlist={id}&controls=0&modestbranding=1&rel=0&showinfo=0",
        id = video_id
    )
}

/// Stamp every slide of a hero section with its detected `type`.
///
/// Slides come from `hero.slideshow`; when that is empty the legacy
/// `image_url` / `video_url` fields are promoted into a one-slide list.
/// YouTube slides also get an `embed_url`. Returns how many slides were
/// written.
pub fn normalize_slides(hero: &mut Value) -> usize {
    let Value::Object(hero_map) = hero else {
        return 0;
    };

    let mut slides: Vec<Value> = hero_map
        .get("slideshow")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if slides.is_empty() {
        for field in ["image_url", "video_url"] {
            if let Some(url) = hero_map.get(field).and_then(Value::as_str) {
                if !url.is_empty() {
                    slides.push(json!({ "url": url }));
                }
            }
        }
    }

    let normalized: Vec<Value> = slides
        .into_iter()
        .filter_map(normalize_slide)
        .collect();
    let count = normalized.len();

    hero_map.insert("slideshow".to_string(), Value::Array(normalized));
    hero_map
        .entry("slideshow_interval".to_string())
        .or_insert(json!(DEFAULT_INTERVAL_SECS));

    count
}

fn normalize_slide(slide: Value) -> Option<Value> {
    let mut map = match slide {
        Value::Object(map) => map,
        Value::String(url) => {
            let mut map = Map::new();
            map.insert("url".to_string(), Value::String(url));
            map
        }
        _ => return None,
    };

    let url = map.get("url").and_then(Value::as_str)?.trim().to_string();
    if url.is_empty() {
        return None;
    }

    let kind = SlideKind::detect(&url, map.get("type").and_then(Value::as_str));
    map.insert("type".to_string(), json!(kind.as_str()));
    if kind == SlideKind::Youtube {
        if let Some(id) = youtube_video_id(&url) {
            map.insert("embed_url".to_string(), json!(youtube_embed_url(&id)));
        }
    }

    Some(Value::Object(map))
}

/// Autoplay state for a slideshow, driven by elapsed time.
///
/// Time only accumulates while playing, not hovered, and with more than one
/// slide. Hovering or pausing drops the accumulated time, so the full
/// interval restarts once autoplay resumes.
#[derive(Debug, Clone)]
pub struct Slideshow {
    slide_count: usize,
    interval: Duration,
    current: usize,
    playing: bool,
    hovered: bool,
    elapsed: Duration,
}

impl Slideshow {
    pub fn new(slide_count: usize, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(DEFAULT_INTERVAL_SECS)
        } else {
            interval
        };
        Self {
            slide_count,
            interval,
            current: 0,
            playing: true,
            hovered: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    fn autoplay_active(&self) -> bool {
        self.playing && !self.hovered && self.slide_count > 1
    }

    /// Advance the clock by `dt`, returning how many slides were skipped.
    pub fn tick(&mut self, dt: Duration) -> usize {
        if !self.autoplay_active() {
            return 0;
        }

        self.elapsed += dt;
        let mut advanced = 0;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            self.next();
            advanced += 1;
        }
        advanced
    }

    pub fn next(&mut self) {
        if self.slide_count > 0 {
            self.current = (self.current + 1) % self.slide_count;
        }
    }

    pub fn prev(&mut self) {
        if self.slide_count > 0 {
            self.current = (self.current + self.slide_count - 1) % self.slide_count;
        }
    }

    /// Jump to `index`; out-of-range indices are ignored.
    pub fn go_to(&mut self, index: usize) {
        if index < self.slide_count {
            self.current = index;
            self.elapsed = Duration::ZERO;
        }
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        if hovered != self.hovered {
            self.hovered = hovered;
            self.elapsed = Duration::ZERO;
        }
    }

    pub fn toggle_play(&mut self) {
        self.playing = !self.playing;
        self.elapsed = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE: Duration = Duration::from_secs(5);

    #[test]
    fn test_detect_slide_kinds() {
        assert_eq!(
            SlideKind::detect("https://www.youtube.com/watch?v=abc", None),
            SlideKind::Youtube
        );
        assert_eq!(SlideKind::detect("https://youtu.be/abc", Some("image")), SlideKind::Youtube);
        assert_eq!(SlideKind::detect("/media/intro.MP4", None), SlideKind::Video);
        assert_eq!(SlideKind::detect("/media/clip", Some("video")), SlideKind::Video);
        assert_eq!(SlideKind::detect("/media/banner.png", None), SlideKind::Image);
    }

    #[test]
    fn test_youtube_video_id() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?si=x"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(youtube_video_id("https://www.youtube.com/channel/x"), None);
    }

    #[test]
    fn test_autoplay_cycles_every_interval() {
        let mut show = Slideshow::new(3, FIVE);
        let mut seen = vec![show.current()];
        for _ in 0..3 {
            assert_eq!(show.tick(FIVE), 1);
            seen.push(show.current());
        }
        assert_eq!(seen, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_partial_ticks_accumulate() {
        let mut show = Slideshow::new(3, FIVE);
        show.tick(Duration::from_secs(3));
        assert_eq!(show.current(), 0);
        show.tick(Duration::from_secs(2));
        assert_eq!(show.current(), 1);
    }

    #[test]
    fn test_hover_stops_advancing() {
        let mut show = Slideshow::new(3, FIVE);
        show.tick(FIVE);
        show.set_hovered(true);
        assert_eq!(show.tick(Duration::from_secs(60)), 0);
        assert_eq!(show.current(), 1);

        show.set_hovered(false);
        show.tick(Duration::from_secs(4));
        assert_eq!(show.current(), 1);
        show.tick(Duration::from_secs(1));
        assert_eq!(show.current(), 2);
    }

    #[test]
    fn test_paused_or_single_slide_never_advances() {
        let mut paused = Slideshow::new(3, FIVE);
        paused.toggle_play();
        assert!(!paused.is_playing());
        assert_eq!(paused.tick(Duration::from_secs(30)), 0);

        let mut single = Slideshow::new(1, FIVE);
        assert_eq!(single.tick(Duration::from_secs(30)), 0);
        assert_eq!(single.current(), 0);
    }

    #[test]
    fn test_prev_wraps_and_go_to_bounds() {
        let mut show = Slideshow::new(3, FIVE);
        show.prev();
        assert_eq!(show.current(), 2);
        show.go_to(7);
        assert_eq!(show.current(), 2);
        show.go_to(0);
        assert_eq!(show.current(), 0);
    }

    #[test]
    fn test_normalize_slides_stamps_types() {
        let mut hero = json!({
            "title": "Hero",
            "slideshow": [
                { "url": "/img/a.jpg" },
                { "url": "https://youtu.be/xyz", "type": "image" },
                "/videos/b.webm",
                { "alt": "missing url" }
            ]
        });
        assert_eq!(normalize_slides(&mut hero), 3);
        let slides = hero["slideshow"].as_array().unwrap();
        assert_eq!(slides[0]["type"], "image");
        assert_eq!(slides[1]["type"], "youtube");
        assert!(slides[1]["embed_url"].as_str().unwrap().contains("/embed/xyz"));
        assert_eq!(slides[2]["type"], "video");
        assert_eq!(hero["slideshow_interval"], 5);
    }

    #[test]
    fn test_normalize_promotes_legacy_image_url() {
        let mut hero = json!({ "image_url": "/img/hero.png", "slideshow_interval": 8 });
        assert_eq!(normalize_slides(&mut hero), 1);
        assert_eq!(hero["slideshow"][0]["url"], "/img/hero.png");
        assert_eq!(hero["slideshow_interval"], 8);
    }
}
