//! Server-side HTML and XML for crawlers: the `/watch` page, the canonical
//! link on `video.html` and the sitemap.

use std::sync::LazyLock;

use axum::http::{HeaderMap, header};
use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::listing::parse_timestamp;
use crate::metadata::VideoRecord;

static ROBOTS_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name=['"]robots['"][^>]*>\s*"#).expect("robots meta regex")
});
static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title>.*?</title>").expect("title regex"));
static BODY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body([^>]*)>").expect("body regex"));
static LOCAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^localhost(:\d+)?$|^127\.0\.0\.1(:\d+)?$").expect("local host regex")
});

const HIDDEN_HEADING_STYLE: &str =
    "position:absolute;left:-9999px;clip:rect(1px,1px,1px,1px);width:1px;height:1px;overflow:hidden;";

/// Base letters for the accented Latin and Vietnamese lowercase letters.
const FOLDS: &[(char, &str)] = &[
    ('a', "àáảãạăằắẳẵặâầấẩẫậäåā"),
    ('c', "çćč"),
    ('d', "đď"),
    ('e', "èéẻẽẹêềếểễệëēę"),
    ('i', "ìíỉĩịîïī"),
    ('n', "ñńň"),
    ('o', "òóỏõọôồốổỗộơờớởỡợöøō"),
    ('r', "ř"),
    ('s', "śšş"),
    ('t', "ť"),
    ('u', "ùúủũụưừứửữựûüūů"),
    ('y', "ỳýỷỹỵÿ"),
    ('z', "źżž"),
];

fn fold_char(c: char) -> char {
    FOLDS
        .iter()
        .find(|(_, accented)| accented.contains(c))
        .map_or(c, |(base, _)| *base)
}

/// URL slug for a title: lowercase ASCII words joined by `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase).map(fold_char) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Scheme and host the visitor used, as seen through a reverse proxy.
///
/// Local hosts are assumed to be plain HTTP; everything else HTTPS.
pub fn site_origin(headers: &HeaderMap, fallback: &str) -> String {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match host {
        Some(host) => {
            let scheme = if LOCAL_HOST.is_match(host) { "http" } else { "https" };
            format!("{scheme}://{host}")
        }
        None => fallback.trim_end_matches('/').to_string(),
    }
}

pub fn watch_url(origin: &str, video_id: &str, title: &str) -> String {
    let slug = slugify(if title.is_empty() { video_id } else { title });
    format!("{origin}/watch/{video_id}/{slug}")
}

fn page_title(video: &VideoRecord, site_name: &str) -> String {
    format!("{} | {}", escape_html(&video.title), escape_html(site_name))
}

fn strip_robots(template: &str) -> String {
    ROBOTS_META.replace(template, "").into_owned()
}

fn replace_title(html: &str, title: &str) -> String {
    TITLE_TAG
        .replace(html, |_: &regex::Captures| format!("<title>{title}</title>"))
        .into_owned()
}

fn inject_before_head_close(html: &str, fragment: &str) -> String {
    html.replacen("</head>", &format!("{fragment}\n</head>"), 1)
}

fn video_object(video: &VideoRecord, canonical: &str) -> Value {
    let upload_date = video
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();
    let description = if video.title.is_empty() {
        "Watch video".to_string()
    } else {
        video.title.clone()
    };

    let mut object = Map::new();
    object.insert("@context".into(), json!("https://schema.org"));
    object.insert("@type".into(), json!("VideoObject"));
    object.insert("name".into(), json!(video.title));
    object.insert("description".into(), json!(description));
    if let Some(thumbnail) = &video.thumbnail {
        object.insert("thumbnailUrl".into(), json!([thumbnail]));
    }
    object.insert("uploadDate".into(), json!(upload_date));
    object.insert("embedUrl".into(), json!(canonical));
    if let Some(link) = video.download_link.as_deref().filter(|link| !link.is_empty()) {
        object.insert("contentUrl".into(), json!(link));
    }
    object.insert("url".into(), json!(canonical));
    Value::Object(object)
}

/// Patches the player template into a crawlable page for one video.
pub fn render_watch_page(
    template: &str,
    video: &VideoRecord,
    origin: &str,
    site_name: &str,
) -> String {
    let canonical = watch_url(origin, &video.id, &video.title);
    let title = page_title(video, site_name);
    let description = if video.title.is_empty() {
        "Watch now".to_string()
    } else {
        escape_html(&video.title)
    };
    let image = escape_html(video.thumbnail.as_deref().unwrap_or_default());
    let canonical_attr = escape_html(&canonical);
    // "</" inside a script block would end it early.
    let json_ld = video_object(video, &canonical)
        .to_string()
        .replace("</", "<\\/");

    let head = format!(
        r#"
<link rel="canonical" href="{canonical_attr}">
<meta property="og:type" content="video.other">
<meta property="og:site_name" content="{site}">
<meta property="og:title" content="{title}">
<meta property="og:description" content="{description}">
<meta property="og:url" content="{canonical_attr}">
<meta property="og:image" content="{image}">
<meta name="twitter:card" content="summary_large_image">
<meta name="twitter:title" content="{title}">
<meta name="twitter:description" content="{description}">
<meta name="twitter:image" content="{image}">
<script type="application/ld+json">{json_ld}</script>"#,
        site = escape_html(site_name),
    );

    let html = replace_title(&strip_robots(template), &title);
    let html = inject_before_head_close(&html, &head);
    let heading = format!(
        r#"<h1 style="{HIDDEN_HEADING_STYLE}">{}</h1>"#,
        escape_html(&video.title)
    );
    BODY_OPEN
        .replace(&html, |caps: &regex::Captures| {
            format!("<body{}>{heading}", &caps[1])
        })
        .into_owned()
}

/// `video.html?id=` keeps its client-side player but points crawlers at the
/// `/watch` URL. The title is only swapped when the video exists.
pub fn render_video_template(
    template: &str,
    video: Option<&VideoRecord>,
    id: &str,
    origin: &str,
    site_name: &str,
) -> String {
    let html = strip_robots(template);
    if id.is_empty() {
        return html;
    }

    let title = video.map(|video| video.title.as_str()).unwrap_or_default();
    let canonical = escape_html(&watch_url(origin, id, title));
    let html = match video.filter(|video| !video.title.is_empty()) {
        Some(video) => replace_title(&html, &page_title(video, site_name)),
        None => html,
    };
    inject_before_head_close(&html, &format!(r#"<link rel="canonical" href="{canonical}">"#))
}

fn day_of(value: Option<&str>) -> Option<String> {
    value
        .and_then(parse_timestamp)
        .map(|instant| instant.format("%Y-%m-%d").to_string())
}

fn last_modified(video: &VideoRecord) -> Option<&str> {
    video
        .updated_at
        .as_deref()
        .filter(|value| !value.is_empty())
        .or(video.created_at.as_deref())
}

fn lastmod_line(day: Option<String>, indent: &str) -> String {
    day.map(|day| format!("\n{indent}<lastmod>{day}</lastmod>"))
        .unwrap_or_default()
}

/// Sitemap with the home page and every published video.
pub fn render_sitemap(videos: &[VideoRecord], origin: &str) -> String {
    let newest = videos
        .iter()
        .filter_map(|video| last_modified(video).and_then(parse_timestamp))
        .max()
        .map(|instant| instant.format("%Y-%m-%d").to_string());

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    xml.push_str(&format!(
        "  <url>\n    <loc>{}/</loc>\n    <changefreq>daily</changefreq>{}\n  </url>\n",
        escape_html(origin),
        lastmod_line(newest, "    ")
    ));

    for video in videos.iter().filter(|video| video.published && !video.id.is_empty()) {
        xml.push_str(&format!(
            "  <url>\n    <loc>{}</loc>\n    <changefreq>weekly</changefreq>{}\n  </url>\n",
            escape_html(&watch_url(origin, &video.id, &video.title)),
            lastmod_line(day_of(last_modified(video)), "    ")
        ));
    }
    xml.push_str("</urlset>\n");
    xml
}
