use harvest_core::error::Result;
use harvest_core::record::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use url::Url;

use crate::extractor::{put, Extractor};
use crate::parsed::{element_text, ParsedContent};

const FIELDS: &[&str] = &["platform", "title", "description", "author"];

static PLATFORMS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("twitter", r"(^|\.)(twitter\.com|x\.com)$"),
        ("facebook", r"(^|\.)(facebook\.com|fb\.com)$"),
        ("instagram", r"(^|\.)instagram\.com$"),
        ("linkedin", r"(^|\.)linkedin\.com$"),
        ("youtube", r"(^|\.)(youtube\.com|youtu\.be)$"),
        ("tiktok", r"(^|\.)tiktok\.com$"),
        ("reddit", r"(^|\.)reddit\.com$"),
        ("pinterest", r"(^|\.)pinterest\.com$"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid platform regex")))
    .collect()
});

static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)#(\w+)").expect("valid hashtag regex"));

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)@(\w+)").expect("valid mention regex"));

const SOCIAL_OG_TYPES: &[&str] = &["profile", "article:author", "instapp:photo", "video"];

const SOCIAL_UI_SELECTORS: &[&str] = &[
    ".tweet",
    ".twitter-tweet",
    ".fb-post",
    ".facebook-post",
    ".instagram-media",
    ".reddit-card",
    ".tiktok-embed",
    ".social-post",
    ".social-embed",
    ".social-media-embed",
];

const POST_TEXT_SELECTORS: &[&str] = &[
    r#"[data-testid="tweetText"]"#,
    ".tweet-text",
    ".post-content",
    ".social-post",
    r#"[itemprop="articleBody"]"#,
];

/// Social media pages and pages embedding social media posts
#[derive(Debug, Default, Clone, Copy)]
pub struct SocialExtractor;

impl SocialExtractor {
    pub fn new() -> Self {
        Self
    }

    /// The platform a host belongs to, if it is a known one
    pub fn platform_for_host(host: &str) -> Option<&'static str> {
        let host = host.to_lowercase();
        PLATFORMS
            .iter()
            .find(|(_, pattern)| pattern.is_match(&host))
            .map(|(name, _)| *name)
    }

    fn detect_platform(&self, content: &ParsedContent, url: &Url) -> &'static str {
        if let Some(platform) = url.host_str().and_then(Self::platform_for_host) {
            return platform;
        }
        let tags = content.meta_tags();
        let hinted = tags.iter().find_map(|(name, value)| {
            let value = value.to_lowercase();
            if name.starts_with("twitter:") {
                Some("twitter")
            } else if name.starts_with("fb:") || name.starts_with("facebook:") {
                Some("facebook")
            } else if name.contains("instagram") {
                Some("instagram")
            } else if name.contains("linkedin") {
                Some("linkedin")
            } else {
                ["youtube", "tiktok", "reddit"]
                    .into_iter()
                    .find(|platform| value.contains(platform))
            }
        });
        hinted.unwrap_or("unknown")
    }

    fn embeds(&self, content: &ParsedContent) -> Vec<Value> {
        let mut embeds = Vec::new();

        for embed in content.select("blockquote.twitter-tweet, [data-tweet-id]") {
            let mut data = Map::new();
            data.insert("platform".into(), "twitter".into());
            if let Some(id) = embed.value().attr("data-tweet-id") {
                data.insert("post_id".into(), id.into());
            }
            if let Some(text) = first_text(&embed, "p") {
                data.insert("content".into(), text.into());
            }
            if data.len() > 1 {
                embeds.push(Value::Object(data));
            }
        }

        let url_embeds: [(&str, &str, &[&str]); 4] = [
            (
                "facebook",
                r#".fb-post, .fb-video, iframe[src*="facebook.com/plugins"]"#,
                &["data-href", "src"],
            ),
            (
                "instagram",
                r#"blockquote.instagram-media, iframe[src*="instagram.com"]"#,
                &["data-instgrm-permalink", "src"],
            ),
            (
                "youtube",
                r#"iframe[src*="youtube.com/embed"], iframe[src*="youtu.be"]"#,
                &["src"],
            ),
            (
                "tiktok",
                r#".tiktok-embed, iframe[src*="tiktok.com"]"#,
                &["cite", "src"],
            ),
        ];
        for (platform, css, attrs) in url_embeds {
            for embed in content.select(css) {
                let Some(url) = attrs.iter().find_map(|a| embed.value().attr(a)) else {
                    continue;
                };
                let mut data = json!({ "platform": platform, "url": url });
                if let Some(id) = embed_id(platform, url) {
                    data["post_id"] = id.into();
                }
                embeds.push(data);
            }
        }

        embeds
    }

    fn prefixed_meta(&self, content: &ParsedContent, prefix: &str) -> Map<String, Value> {
        content
            .meta_tags()
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(prefix)
                    .map(|key| (key.to_string(), Value::from(value)))
            })
            .collect()
    }
}

fn first_text(element: &scraper::ElementRef<'_>, css: &str) -> Option<String> {
    let selector = scraper::Selector::parse(css).ok()?;
    let text = element
        .select(&selector)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty());
    text
}

/// Post or video identifier embedded in an embed URL
fn embed_id(platform: &str, url: &str) -> Option<String> {
    let marker = match platform {
        "facebook" if url.contains("videos/") => "videos/",
        "facebook" => "posts/",
        "instagram" => "/p/",
        "youtube" if url.contains("youtu.be/") => "youtu.be/",
        "youtube" => "embed/",
        "tiktok" => "video/",
        _ => return None,
    };
    let rest = url.split_once(marker)?.1;
    let id = rest.split(['/', '?', '&']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn collect_tags(pattern: &Regex, text: &str) -> Vec<Value> {
    let mut tags: Vec<String> = Vec::new();
    for capture in pattern.captures_iter(text) {
        let tag = capture[1].to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.into_iter().map(Value::from).collect()
}

impl Extractor for SocialExtractor {
    fn name(&self) -> &str {
        "social"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    fn can_extract(&self, content: &ParsedContent, url: &Url) -> bool {
        if url.host_str().and_then(Self::platform_for_host).is_some() {
            return true;
        }

        if content
            .meta("og:type")
            .is_some_and(|t| SOCIAL_OG_TYPES.contains(&t.as_str()))
        {
            return true;
        }

        SOCIAL_UI_SELECTORS.iter().any(|css| content.exists(css))
            || content.exists(r#"iframe[src*="youtube.com/embed"], iframe[src*="facebook.com/plugins"]"#)
    }

    fn extract(&self, content: &ParsedContent, url: &Url) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("platform".into(), self.detect_platform(content, url).into());

        put(
            &mut fields,
            "title",
            content.meta("og:title").or_else(|| content.title()),
        );
        put(
            &mut fields,
            "description",
            content
                .meta("og:description")
                .or_else(|| content.meta("description")),
        );
        put(
            &mut fields,
            "author",
            content
                .meta("author")
                .or_else(|| content.meta("twitter:creator"))
                .or_else(|| content.meta("article:author")),
        );
        put(
            &mut fields,
            "image",
            content
                .meta("og:image")
                .and_then(|src| content.resolve(&src))
                .map(|u| u.to_string()),
        );

        let text = POST_TEXT_SELECTORS
            .iter()
            .find_map(|css| content.select_text(css))
            .or_else(|| content.meta("og:description"));
        if let Some(text) = &text {
            put(&mut fields, "hashtags", collect_tags(&HASHTAG, text));
            put(&mut fields, "mentions", collect_tags(&MENTION, text));
        }
        put(&mut fields, "post_text", text);

        put(&mut fields, "embeds", self.embeds(content));
        put(&mut fields, "og_data", self.prefixed_meta(content, "og:"));
        put(&mut fields, "twitter_card", self.prefixed_meta(content, "twitter:"));

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str, url: &str) -> (ParsedContent, Url) {
        let url = Url::parse(url).unwrap();
        (ParsedContent::parse(html, url.clone()), url)
    }

    #[test]
    fn test_platform_for_host() {
        assert_eq!(SocialExtractor::platform_for_host("x.com"), Some("twitter"));
        assert_eq!(SocialExtractor::platform_for_host("www.YouTube.com"), Some("youtube"));
        assert_eq!(SocialExtractor::platform_for_host("youtu.be"), Some("youtube"));
        assert_eq!(SocialExtractor::platform_for_host("old.reddit.com"), Some("reddit"));
        assert_eq!(SocialExtractor::platform_for_host("box.com"), None);
        assert_eq!(SocialExtractor::platform_for_host("notreddit.com.evil.test"), None);
    }

    #[test]
    fn test_platform_page() {
        let html = r#"<html><head>
            <meta property="og:title" content="Ferris on X">
            <meta property="og:description" content="Shipping it #rustlang with @rustfoundation">
            <meta name="twitter:creator" content="@ferris">
            </head><body></body></html>"#;
        let (content, url) = parse(html, "https://x.com/ferris/status/1");

        assert!(SocialExtractor.can_extract(&content, &url));
        let fields = SocialExtractor.extract(&content, &url).unwrap();
        assert_eq!(fields["platform"], "twitter");
        assert_eq!(fields["title"], "Ferris on X");
        assert_eq!(fields["author"], "@ferris");
        assert_eq!(fields["hashtags"], json!(["rustlang"]));
        assert_eq!(fields["mentions"], json!(["rustfoundation"]));
        assert_eq!(fields["og_data"]["title"], "Ferris on X");
        assert_eq!(fields["twitter_card"], json!({"creator": "@ferris"}));
    }

    #[test]
    fn test_embeds_on_ordinary_page() {
        let html = r#"<html><body>
            <blockquote class="twitter-tweet" data-tweet-id="42"><p>Hello world</p></blockquote>
            <iframe src="https://www.youtube.com/embed/abc123?autoplay=1"></iframe>
            </body></html>"#;
        let (content, url) = parse(html, "http://blog.test/post");

        assert!(SocialExtractor.can_extract(&content, &url));
        let fields = SocialExtractor.extract(&content, &url).unwrap();
        assert_eq!(fields["platform"], "unknown");
        assert_eq!(
            fields["embeds"],
            json!([
                {"platform": "twitter", "post_id": "42", "content": "Hello world"},
                {"platform": "youtube", "url": "https://www.youtube.com/embed/abc123?autoplay=1", "post_id": "abc123"}
            ])
        );
    }

    #[test]
    fn test_ordinary_page_is_not_social() {
        let (content, url) = parse("<html><body><p>hi</p></body></html>", "http://a.test/");
        assert!(!SocialExtractor.can_extract(&content, &url));
    }

    #[test]
    fn test_embed_ids() {
        assert_eq!(
            embed_id("facebook", "https://facebook.com/page/posts/987/").as_deref(),
            Some("987")
        );
        assert_eq!(embed_id("instagram", "https://instagram.com/p/XyZ/").as_deref(), Some("XyZ"));
        assert_eq!(embed_id("youtube", "https://youtu.be/q1?t=3").as_deref(), Some("q1"));
        assert!(embed_id("youtube", "https://youtube.com/watch").is_none());
    }
}
