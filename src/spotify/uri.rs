//! Turns Spotify links and URIs into a [`SpotifyReference`].
//!
//! Accepted forms:
//!
//! - `spotify:{type}:{id}` and `spotify:user:{user}:playlist:{id}`
//! - `https://open.spotify.com/{type}/{id}` (also `play.spotify.com`), with
//!   optional `intl-xx` and `embed` segments and any query string
//! - `https://open.spotify.com/user/{user}/playlist/{id}`
//! - `https://open.spotify.com/artist/{id}/discography[/{group}]`
//! - `https://embed.spotify.com/?uri=spotify:...`
//! - scheme-less paths such as `open.spotify.com/track/{id}` or `album/{id}`
//! - a single bare segment, taken as a playlist id

use reqwest::Url;

use crate::{
    error::{Error, Result},
    types::{DiscographyFilter, ReferenceKind, SpotifyReference},
};

const ACCEPTED_HOSTS: [&str; 2] = ["open.spotify.com", "play.spotify.com"];
const EMBED_HOST: &str = "embed.spotify.com";

/// Parses `input` into a reference.
///
/// # Errors
///
/// Every rejection is [`Error::InvalidReference`] carrying the trimmed input.
///
/// # Example
///
/// ```
/// use spotmeta::spotify::parse_spotify_reference;
///
/// let a = parse_spotify_reference("spotify:album:4aawyAB9vmqN3uQ7FjRGTy").unwrap();
/// let b = parse_spotify_reference("https://open.spotify.com/intl-de/album/4aawyAB9vmqN3uQ7FjRGTy?si=x").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_spotify_reference(input: &str) -> Result<SpotifyReference> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidReference(trimmed.to_string());
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = trimmed.strip_prefix("spotify:") {
        return parse_colon_form(rest).ok_or_else(invalid);
    }

    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host == EMBED_HOST {
            let embedded = url
                .query_pairs()
                .find(|(k, _)| k == "uri")
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(invalid)?;
            if embedded.trim() == trimmed {
                return Err(invalid());
            }
            return parse_spotify_reference(&embedded);
        }
        if !ACCEPTED_HOSTS.contains(&host.as_str()) {
            return Err(invalid());
        }
        return match_segments(&path_segments(url.path())).ok_or_else(invalid);
    }

    parse_schemeless(trimmed).ok_or_else(invalid)
}

fn parse_colon_form(rest: &str) -> Option<SpotifyReference> {
    let parts: Vec<&str> = rest.split(':').collect();
    match parts.as_slice() {
        [kind, id] if !id.is_empty() => simple_kind(kind).map(|k| SpotifyReference::new(k, *id)),
        ["user", _, "playlist", id] if !id.is_empty() => {
            Some(SpotifyReference::new(ReferenceKind::Playlist, *id))
        }
        ["artist", id, "discography"] if !id.is_empty() => {
            Some(SpotifyReference::discography(*id, DiscographyFilter::default()))
        }
        ["artist", id, "discography", group] if !id.is_empty() => Some(
            SpotifyReference::discography(*id, DiscographyFilter::from_segment(group)),
        ),
        _ => None,
    }
}

fn parse_schemeless(input: &str) -> Option<SpotifyReference> {
    // Drop any query or fragment before looking at the path.
    let path = input.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path_segments(path);

    if let Some(first) = segments.first() {
        let host = first.to_ascii_lowercase();
        if host == EMBED_HOST {
            return None;
        }
        if ACCEPTED_HOSTS.contains(&host.as_str()) {
            segments.remove(0);
            return match_segments(&segments);
        }
    }

    match segments.as_slice() {
        [] => None,
        [id] if !id.contains('.') => Some(SpotifyReference::new(ReferenceKind::Playlist, *id)),
        _ => match_segments(&segments),
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments(segments: &[&str]) -> Option<SpotifyReference> {
    let mut parts = segments;
    if parts.first().is_some_and(|p| p.starts_with("intl-")) {
        parts = &parts[1..];
    }
    if parts.first() == Some(&"embed") {
        parts = &parts[1..];
    }
    if parts.first().is_some_and(|p| p.starts_with("intl-")) {
        parts = &parts[1..];
    }

    match parts {
        [] => None,
        ["artist", id, "discography", rest @ ..] if !id.is_empty() => {
            let filter = rest
                .first()
                .map(|g| DiscographyFilter::from_segment(g))
                .unwrap_or_default();
            Some(SpotifyReference::discography(*id, filter))
        }
        ["artist", id, ..] if !id.is_empty() => {
            Some(SpotifyReference::new(ReferenceKind::Artist, *id))
        }
        ["user", _, "playlist", id] if !id.is_empty() => {
            Some(SpotifyReference::new(ReferenceKind::Playlist, *id))
        }
        [kind, id] if !id.is_empty() => simple_kind(kind).map(|k| SpotifyReference::new(k, *id)),
        _ => None,
    }
}

fn simple_kind(segment: &str) -> Option<ReferenceKind> {
    match segment {
        "track" => Some(ReferenceKind::Track),
        "album" => Some(ReferenceKind::Album),
        "playlist" => Some(ReferenceKind::Playlist),
        "artist" => Some(ReferenceKind::Artist),
        _ => None,
    }
}
