use serde::{Deserialize, Serialize};
use url::Url;

/// Platforms whose downloaders resolve page URLs into playable video URLs.
///
/// The downloaders themselves live upstream of this crate; the pipeline only
/// consumes the resolved `video_url` and uses the platform to pick request
/// headers the platform's CDN expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Instagram,
    Youtube,
    GoogleAds,
    Other,
}

impl Platform {
    /// Classify a video URL by its host.
    pub fn from_url(url: &str) -> Platform {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            Some(host) => host,
            None => return Platform::Other,
        };

        if host.contains("fbcdn") || host.contains("facebook") {
            Platform::Facebook
        } else if host.contains("cdninstagram") || host.contains("instagram") {
            Platform::Instagram
        } else if host.contains("googlevideo") || host.contains("youtube") || host == "youtu.be" {
            Platform::Youtube
        } else if host.contains("adstransparency.google") || host.contains("googleads") {
            Platform::GoogleAds
        } else {
            Platform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::GoogleAds => "google_ads",
            Platform::Other => "other",
        }
    }

    /// `(Referer, Origin)` pair the platform's CDN expects.
    ///
    /// Facebook and Instagram media hosts reject fetches that lack a Referer
    /// and Origin from their own domain. Returns `None` for hosts that serve
    /// anonymous requests.
    pub fn cdn_headers(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Platform::Facebook => Some(("https://www.facebook.com/", "https://www.facebook.com")),
            Platform::Instagram => Some(("https://www.instagram.com/", "https://www.instagram.com")),
            Platform::Youtube | Platform::GoogleAds | Platform::Other => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an upstream downloader hands to the transcription pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVideo {
    /// Directly playable media URL (progressive file or live playlist)
    pub video_url: String,

    /// Thumbnail image URL, when the platform exposes one
    pub thumbnail_url: Option<String>,

    /// Title or ad headline
    pub title: Option<String>,

    /// Platform the page URL was resolved on
    pub platform: Platform,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_classification() {
        assert_eq!(
            Platform::from_url("https://video.ffab1-1.fna.fbcdn.net/v/t42.1790-2/clip.mp4"),
            Platform::Facebook
        );
        assert_eq!(
            Platform::from_url("https://scontent.cdninstagram.com/o1/v/t16/reel.mp4"),
            Platform::Instagram
        );
        assert_eq!(
            Platform::from_url("https://rr3---sn-4g5e6nsz.googlevideo.com/videoplayback?id=abc"),
            Platform::Youtube
        );
        assert_eq!(
            Platform::from_url("https://adstransparency.google.com/creative/123"),
            Platform::GoogleAds
        );
        assert_eq!(
            Platform::from_url("https://example.com/video.mp4"),
            Platform::Other
        );
        assert_eq!(Platform::from_url("not a url"), Platform::Other);
    }

    #[test]
    fn test_cdn_headers_only_for_meta_platforms() {
        assert!(Platform::Facebook.cdn_headers().is_some());
        assert!(Platform::Instagram.cdn_headers().is_some());
        assert!(Platform::Youtube.cdn_headers().is_none());
        assert!(Platform::Other.cdn_headers().is_none());
    }

    #[test]
    fn test_referer_matches_platform_domain() {
        let (referer, origin) = Platform::Facebook.cdn_headers().unwrap();
        assert!(referer.contains("facebook.com"));
        assert!(origin.contains("facebook.com"));
    }
}
