use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;

/// What a Spotify link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Track,
    Album,
    Playlist,
    Artist,
    ArtistDiscography,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Track => "track",
            ReferenceKind::Album => "album",
            ReferenceKind::Playlist => "playlist",
            ReferenceKind::Artist => "artist",
            ReferenceKind::ArtistDiscography => "artist_discography",
        };
        f.write_str(s)
    }
}

/// Release groups of an artist discography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscographyFilter {
    Album,
    Single,
    Compilation,
    #[default]
    All,
}

impl DiscographyFilter {
    /// Parses a path segment. Unknown groups fall back to [`DiscographyFilter::All`].
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "album" => DiscographyFilter::Album,
            "single" => DiscographyFilter::Single,
            "compilation" => DiscographyFilter::Compilation,
            _ => DiscographyFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscographyFilter::Album => "album",
            DiscographyFilter::Single => "single",
            DiscographyFilter::Compilation => "compilation",
            DiscographyFilter::All => "all",
        }
    }

    /// Value of the `include_groups` query parameter.
    pub fn include_groups(&self) -> &'static str {
        match self {
            DiscographyFilter::All => "album,single,compilation",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for DiscographyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed Spotify link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotifyReference {
    pub kind: ReferenceKind,
    pub id: String,
    /// Only set for [`ReferenceKind::ArtistDiscography`].
    pub discography_filter: Option<DiscographyFilter>,
}

impl SpotifyReference {
    pub fn new(kind: ReferenceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            discography_filter: None,
        }
    }

    pub fn discography(id: impl Into<String>, filter: DiscographyFilter) -> Self {
        Self {
            kind: ReferenceKind::ArtistDiscography,
            id: id.into(),
            discography_filter: Some(filter),
        }
    }
}

/// Where an access token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Totp,
    Legacy,
    AccessPoint,
    OAuth,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenSource::Totp => "totp",
            TokenSource::Legacy => "legacy",
            TokenSource::AccessPoint => "access_point",
            TokenSource::OAuth => "oauth",
        };
        f.write_str(s)
    }
}

/// A bearer token together with its effective expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub source: TokenSource,
}

impl AccessToken {
    pub fn is_fresh(&self) -> bool {
        !self.value.is_empty() && Utc::now() < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &format_args!("<{} chars>", self.value.len()))
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

/// One entry of the remote TOTP secret table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub version: i64,
    pub secret: Vec<i64>,
}

/// A generated one-time code and the inputs it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpCode {
    pub code: String,
    pub server_time: i64,
    pub version: i64,
}

/// Response body of the web-player token endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub access_token_expiration_timestamp_ms: Option<i64>,
}

// Raw API shapes. Spotify sends `null` for many fields (local playlist
// entries have no ids), so everything decodes to a default instead.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default, deserialize_with = "nullable")]
    pub spotify: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalIds {
    #[serde(default, deserialize_with = "nullable")]
    pub isrc: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistRef {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumSimplified {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub album_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub release_date: String,
    #[serde(default, deserialize_with = "nullable")]
    pub total_tracks: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "nullable")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "nullable")]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackSimplified {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub track_number: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub disc_number: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "nullable")]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackFull {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub track_number: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub disc_number: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "nullable")]
    pub external_ids: ExternalIds,
    #[serde(default, deserialize_with = "nullable")]
    pub album: AlbumSimplified,
    #[serde(default, deserialize_with = "nullable")]
    pub artists: Vec<ArtistRef>,
}

/// Only the ISRC part of a track detail response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackIsrc {
    #[serde(default, deserialize_with = "nullable")]
    pub external_ids: ExternalIds,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistTrackItem {
    #[serde(default)]
    pub track: Option<TrackFull>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    #[serde(default, deserialize_with = "nullable")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Total {
    #[serde(default, deserialize_with = "nullable")]
    pub total: u64,
}

/// A cursor page as returned by every listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "nullable_vec")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next: None,
            total: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "nullable")]
    pub owner: Owner,
    #[serde(default, deserialize_with = "nullable")]
    pub followers: Total,
    #[serde(default)]
    pub tracks: Page<PlaylistTrackItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub release_date: String,
    #[serde(default, deserialize_with = "nullable")]
    pub total_tracks: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "nullable")]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub tracks: Page<TrackSimplified>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub followers: Total,
    #[serde(default, deserialize_with = "nullable")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "nullable")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "nullable")]
    pub popularity: u32,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

// Normalized payloads handed to downstream consumers.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spotify_id: String,
    pub artists: String,
    pub name: String,
    pub album_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album_artist: String,
    pub duration_ms: u64,
    pub images: String,
    pub release_date: String,
    pub track_number: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_tracks: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub disc_number: u32,
    pub external_urls: String,
    pub isrc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackPayload {
    pub track: TrackMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistSimple {
    pub id: String,
    pub name: String,
    pub external_urls: String,
}

/// A track inside an album, playlist or discography listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumTrackMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spotify_id: String,
    pub artists: String,
    pub name: String,
    pub album_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album_artist: String,
    pub duration_ms: u64,
    pub images: String,
    pub release_date: String,
    pub track_number: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_tracks: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub disc_number: u32,
    pub external_urls: String,
    pub isrc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artist_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artist_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artists_data: Vec<ArtistSimple>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub total_tracks: u32,
    pub name: String,
    pub release_date: String,
    pub artists: String,
    pub images: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artist_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artist_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumPayload {
    pub album_info: AlbumInfo,
    pub track_list: Vec<AlbumTrackMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistOwner {
    pub display_name: String,
    pub name: String,
    pub images: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub tracks: Total,
    pub followers: Total,
    pub owner: PlaylistOwner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistPayload {
    pub playlist_info: PlaylistInfo,
    pub track_list: Vec<AlbumTrackMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub name: String,
    pub followers: u64,
    pub genres: Vec<String>,
    pub images: String,
    pub external_urls: String,
    pub discography_type: String,
    pub total_albums: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscographyAlbum {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub release_date: String,
    pub total_tracks: u32,
    pub artists: String,
    pub images: String,
    pub external_urls: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscographyPayload {
    pub artist_info: ArtistInfo,
    pub album_list: Vec<DiscographyAlbum>,
    pub track_list: Vec<AlbumTrackMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistDetails {
    pub name: String,
    pub followers: u64,
    pub genres: Vec<String>,
    pub images: String,
    pub external_urls: String,
    pub popularity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistPayload {
    pub artist: ArtistDetails,
}

/// The result of a metadata fetch, serialized without a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataPayload {
    Track(TrackPayload),
    Album(AlbumPayload),
    Playlist(PlaylistPayload),
    Discography(DiscographyPayload),
    Artist(ArtistPayload),
}

impl MetadataPayload {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            MetadataPayload::Track(_) => ReferenceKind::Track,
            MetadataPayload::Album(_) => ReferenceKind::Album,
            MetadataPayload::Playlist(_) => ReferenceKind::Playlist,
            MetadataPayload::Discography(_) => ReferenceKind::ArtistDiscography,
            MetadataPayload::Artist(_) => ReferenceKind::Artist,
        }
    }

    /// Track rows for tabular output. Single tracks are converted, artists have none.
    pub fn table_rows(&self) -> Vec<TrackTableRow> {
        match self {
            MetadataPayload::Track(t) => vec![TrackTableRow::new(
                t.track.track_number,
                &t.track.name,
                &t.track.artists,
                &t.track.album_name,
                t.track.duration_ms,
                &t.track.isrc,
            )],
            MetadataPayload::Album(a) => rows(&a.track_list),
            MetadataPayload::Playlist(p) => rows(&p.track_list),
            MetadataPayload::Discography(d) => rows(&d.track_list),
            MetadataPayload::Artist(_) => Vec::new(),
        }
    }
}

fn rows(tracks: &[AlbumTrackMetadata]) -> Vec<TrackTableRow> {
    tracks
        .iter()
        .map(|t| {
            TrackTableRow::new(
                t.track_number,
                &t.name,
                &t.artists,
                &t.album_name,
                t.duration_ms,
                &t.isrc,
            )
        })
        .collect()
}

#[derive(Debug, Clone, Tabled)]
pub struct TrackTableRow {
    #[tabled(rename = "#")]
    pub number: u32,
    pub name: String,
    pub artists: String,
    pub album: String,
    pub duration: String,
    pub isrc: String,
}

impl TrackTableRow {
    fn new(number: u32, name: &str, artists: &str, album: &str, ms: u64, isrc: &str) -> Self {
        let secs = ms / 1000;
        Self {
            number,
            name: name.to_string(),
            artists: artists.to_string(),
            album: album.to_string(),
            duration: format!("{}:{:02}", secs / 60, secs % 60),
            isrc: isrc.to_string(),
        }
    }
}

/// OAuth token persisted by the login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub client_id: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub last_updated_at: DateTime<Utc>,
}

/// Body of the accounts token endpoint for code exchange and refresh.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthTokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// State shared between the login flow and the callback handler.
#[derive(Debug, Clone)]
pub struct PkceSession {
    pub code_verifier: String,
    pub state: String,
    pub redirect_uri: String,
    /// Authorization code delivered to the callback.
    pub code: Option<String>,
    /// Failure reported by the provider or detected by the callback.
    pub error: Option<String>,
}

impl PkceSession {
    pub fn new(code_verifier: String, state: String, redirect_uri: String) -> Self {
        Self {
            code_verifier,
            state,
            redirect_uri,
            code: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Summary of the stored OAuth login.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OAuthStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}
