use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore, distr::Alphanumeric};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::types::{ArtistRef, ArtistSimple, Image};

pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(128)
        .map(char::from)
        .collect()
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random bytes rendered as unpadded URL-safe base64, used for OAuth `state`.
pub fn random_url_safe(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// A desktop Chrome user agent with randomized version numbers.
pub fn random_user_agent() -> String {
    let mut rng = rand::rng();
    format!(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_{}_{}) AppleWebKit/{}.{} (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/{}.{}",
        rng.random_range(11..15),
        rng.random_range(4..9),
        rng.random_range(530..537),
        rng.random_range(30..37),
        rng.random_range(80..105),
        rng.random_range(3000..4500),
        rng.random_range(60..125),
        rng.random_range(530..537),
        rng.random_range(30..36),
    )
}

/// Parses a `Retry-After` header given in seconds.
///
/// One second is added to absorb rounding on the server side. Missing or
/// non-numeric values fall back to `default`.
pub fn parse_retry_after(value: Option<&str>, default: Duration) -> Duration {
    match value.map(str::trim).and_then(|v| v.parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs + 1),
        None => default,
    }
}

/// Collapses whitespace and truncates a response body for logs and errors.
pub fn preview_body(body: &[u8], max: usize) -> String {
    if max == 0 || body.is_empty() {
        return String::new();
    }
    let text = String::from_utf8_lossy(body);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > max {
        let mut cut: String = collapsed.chars().take(max).collect();
        cut.push('…');
        cut
    } else {
        collapsed
    }
}

/// Masks the one-time code in a token request URL.
pub fn redact_token_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| k == "totp") {
        return raw.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "totp" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

/// Lowercased `host[:port]` of a URL, empty when it cannot be parsed.
pub fn host_of(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{port}", host.to_ascii_lowercase()),
            (Some(host), None) => host.to_ascii_lowercase(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Normalizes a `next` link: drops the echoed `locale` parameter and maps
/// empty links to `None`.
pub fn strip_locale_param(next: Option<&str>) -> Option<String> {
    let raw = next.map(str::trim).filter(|s| !s.is_empty())?;
    let Ok(mut url) = Url::parse(raw) else {
        return Some(raw.to_string());
    };
    if !url.query_pairs().any(|(k, _)| k == "locale") {
        return Some(raw.to_string());
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "locale")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(url.to_string())
}

pub fn first_image_url(images: &[Image]) -> String {
    images.first().map(|i| i.url.clone()).unwrap_or_default()
}

/// Joins artist names with `", "`, skipping empty names.
pub fn join_artists(artists: &[ArtistRef]) -> String {
    artists
        .iter()
        .filter(|a| !a.name.is_empty())
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn artist_page_url(id: &str) -> String {
    format!("https://open.spotify.com/artist/{id}")
}

pub fn artists_data(artists: &[ArtistRef]) -> Vec<ArtistSimple> {
    artists
        .iter()
        .map(|a| ArtistSimple {
            id: a.id.clone(),
            name: a.name.clone(),
            external_urls: artist_page_url(&a.id),
        })
        .collect()
}

/// Id and page URL of the first artist, empty when there is none.
pub fn primary_artist(artists: &[ArtistRef]) -> (String, String) {
    match artists.first() {
        Some(a) => (a.id.clone(), artist_page_url(&a.id)),
        None => (String::new(), String::new()),
    }
}

pub fn first_non_empty(values: &[&str]) -> String {
    values
        .iter()
        .find(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .unwrap_or_default()
}
