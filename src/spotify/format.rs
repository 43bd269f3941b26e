//! Maps raw API shapes to the normalized payloads.

use std::{collections::HashMap, sync::Mutex};

use futures::{StreamExt, stream};

use crate::{
    config::Endpoints,
    context::RequestContext,
    debug,
    error::Result,
    spotify::paging::{JsonSource, fetch_all_pages, get_json},
    types::{
        AlbumInfo, AlbumPayload, AlbumResponse, AlbumSimplified, AlbumTrackMetadata, ArtistDetails,
        ArtistInfo, ArtistPayload, ArtistResponse, DiscographyAlbum, DiscographyFilter,
        DiscographyPayload, PlaylistInfo, PlaylistOwner, PlaylistPayload, PlaylistResponse, Total,
        TrackFull, TrackIsrc, TrackMetadata, TrackPayload, TrackSimplified,
    },
    utils::{self, first_image_url, first_non_empty, join_artists},
    warning,
};

/// `batch` label for a listing fetched in batch mode.
fn batch_label(page_count: Option<usize>) -> Option<String> {
    page_count.map(|n| n.max(1).to_string())
}

pub fn format_track(raw: &TrackFull) -> TrackPayload {
    TrackPayload {
        track: TrackMetadata {
            spotify_id: raw.id.clone(),
            artists: join_artists(&raw.artists),
            name: raw.name.clone(),
            album_name: raw.album.name.clone(),
            album_artist: join_artists(&raw.album.artists),
            duration_ms: raw.duration_ms,
            images: first_image_url(&raw.album.images),
            release_date: raw.album.release_date.clone(),
            track_number: raw.track_number,
            total_tracks: raw.album.total_tracks,
            disc_number: raw.disc_number,
            external_urls: raw.external_urls.spotify.clone(),
            isrc: raw.external_ids.isrc.clone(),
        },
    }
}

pub fn format_artist(raw: &ArtistResponse) -> ArtistPayload {
    ArtistPayload {
        artist: ArtistDetails {
            name: raw.name.clone(),
            followers: raw.followers.total,
            genres: raw.genres.clone(),
            images: first_image_url(&raw.images),
            external_urls: raw.external_urls.spotify.clone(),
            popularity: raw.popularity,
        },
    }
}

/// Playlist entries whose `track` is null (removed or local files) are skipped.
/// Tracks without album artwork fall back to the playlist image.
pub fn format_playlist(raw: &PlaylistResponse, batch_pages: Option<usize>) -> PlaylistPayload {
    let owner = PlaylistOwner {
        display_name: raw.owner.display_name.clone(),
        name: raw.name.clone(),
        images: first_image_url(&raw.images),
    };

    let track_list = raw
        .tracks
        .items
        .iter()
        .filter_map(|item| item.track.as_ref())
        .map(|track| {
            let (artist_id, artist_url) = utils::primary_artist(&track.artists);
            AlbumTrackMetadata {
                spotify_id: track.id.clone(),
                artists: join_artists(&track.artists),
                name: track.name.clone(),
                album_name: track.album.name.clone(),
                album_artist: join_artists(&track.album.artists),
                duration_ms: track.duration_ms,
                images: first_non_empty(&[
                    first_image_url(&track.album.images).as_str(),
                    owner.images.as_str(),
                ]),
                release_date: track.album.release_date.clone(),
                track_number: track.track_number,
                total_tracks: track.album.total_tracks,
                disc_number: track.disc_number,
                external_urls: track.external_urls.spotify.clone(),
                isrc: track.external_ids.isrc.clone(),
                album_id: track.album.id.clone(),
                album_url: track.album.external_urls.spotify.clone(),
                artist_id,
                artist_url,
                artists_data: utils::artists_data(&track.artists),
                ..Default::default()
            }
        })
        .collect();

    PlaylistPayload {
        playlist_info: PlaylistInfo {
            tracks: Total {
                total: raw.tracks.total.unwrap_or(raw.tracks.items.len() as u64),
            },
            followers: raw.followers.clone(),
            owner,
            batch: batch_label(batch_pages),
        },
        track_list,
    }
}

fn discography_album(album: &AlbumSimplified) -> DiscographyAlbum {
    DiscographyAlbum {
        id: album.id.clone(),
        name: album.name.clone(),
        album_type: album.album_type.clone(),
        release_date: album.release_date.clone(),
        total_tracks: album.total_tracks,
        artists: join_artists(&album.artists),
        images: first_image_url(&album.images),
        external_urls: album.external_urls.spotify.clone(),
    }
}

/// Formatting steps that need further requests: per-track ISRC lookups and
/// per-album track listings.
///
/// ISRCs are memoized for the lifetime of the formatter, which is one
/// metadata request.
pub struct Formatter<'a, S: JsonSource + ?Sized> {
    source: &'a S,
    endpoints: &'a Endpoints,
    token: &'a str,
    concurrency: usize,
    isrc_memo: Mutex<HashMap<String, String>>,
}

impl<'a, S: JsonSource + ?Sized> Formatter<'a, S> {
    pub fn new(source: &'a S, endpoints: &'a Endpoints, token: &'a str, concurrency: usize) -> Self {
        Self {
            source,
            endpoints,
            token,
            concurrency: concurrency.max(1),
            isrc_memo: Mutex::new(HashMap::new()),
        }
    }

    /// The ISRC of `track_id`, empty when it cannot be resolved.
    ///
    /// Only cancellation is reported as an error.
    pub async fn isrc(&self, ctx: &RequestContext, track_id: &str) -> Result<String> {
        if track_id.is_empty() || self.token.is_empty() {
            return Ok(String::new());
        }
        if let Some(isrc) = self.memo_get(track_id) {
            return Ok(isrc);
        }

        let endpoint = self.endpoints.track_url(track_id);
        match get_json::<S, TrackIsrc>(self.source, ctx, &endpoint, self.token).await {
            Ok(detail) => {
                let isrc = detail.external_ids.isrc;
                self.isrc_memo
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(track_id.to_string(), isrc.clone());
                Ok(isrc)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                debug!("isrc lookup failed track={}: {}", track_id, e);
                Ok(String::new())
            }
        }
    }

    fn memo_get(&self, track_id: &str) -> Option<String> {
        self.isrc_memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(track_id)
            .cloned()
    }

    pub async fn format_album(
        &self,
        ctx: &RequestContext,
        raw: &AlbumResponse,
        batch_pages: Option<usize>,
    ) -> Result<AlbumPayload> {
        let album_image = first_image_url(&raw.images);
        let album_artist = join_artists(&raw.artists);
        let (artist_id, artist_url) = utils::primary_artist(&raw.artists);

        let mut track_list = Vec::with_capacity(raw.tracks.items.len());
        for track in &raw.tracks.items {
            let isrc = self.isrc(ctx, &track.id).await?;
            track_list.push(AlbumTrackMetadata {
                spotify_id: track.id.clone(),
                artists: join_artists(&track.artists),
                name: track.name.clone(),
                album_name: raw.name.clone(),
                album_artist: album_artist.clone(),
                duration_ms: track.duration_ms,
                images: album_image.clone(),
                release_date: raw.release_date.clone(),
                track_number: track.track_number,
                total_tracks: raw.total_tracks,
                disc_number: track.disc_number,
                external_urls: track.external_urls.spotify.clone(),
                isrc,
                ..Default::default()
            });
        }

        Ok(AlbumPayload {
            album_info: AlbumInfo {
                total_tracks: raw.total_tracks,
                name: raw.name.clone(),
                release_date: raw.release_date.clone(),
                artists: album_artist,
                images: album_image,
                batch: batch_label(batch_pages),
                artist_id,
                artist_url,
            },
            track_list,
        })
    }

    /// Builds the discography: one entry per album plus a flat track list.
    ///
    /// Album track listings are fetched with bounded concurrency and joined in
    /// album order. An album whose listing fails is reported and left out of
    /// the track list, except for cancellation, 401 and rate limiting, which
    /// fail the whole discography.
    pub async fn format_discography(
        &self,
        ctx: &RequestContext,
        artist: &ArtistResponse,
        albums: &[AlbumSimplified],
        filter: DiscographyFilter,
        batch_pages: Option<usize>,
    ) -> Result<DiscographyPayload> {
        let album_list: Vec<DiscographyAlbum> = albums.iter().map(discography_album).collect();

        let per_album: Vec<Result<Vec<AlbumTrackMetadata>>> = stream::iter(
            albums.iter().map(|album| self.album_tracks(ctx, album)),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut track_list = Vec::new();
        for tracks in per_album {
            track_list.extend(tracks?);
        }

        Ok(DiscographyPayload {
            artist_info: ArtistInfo {
                name: artist.name.clone(),
                followers: artist.followers.total,
                genres: artist.genres.clone(),
                images: first_image_url(&artist.images),
                external_urls: artist.external_urls.spotify.clone(),
                discography_type: filter.as_str().to_string(),
                total_albums: albums.len(),
                batch: batch_label(batch_pages),
            },
            album_list,
            track_list,
        })
    }

    async fn album_tracks(
        &self,
        ctx: &RequestContext,
        album: &AlbumSimplified,
    ) -> Result<Vec<AlbumTrackMetadata>> {
        let url = self.endpoints.album_tracks_url(&album.id);
        let walk = fetch_all_pages::<S, TrackSimplified>(
            self.source,
            ctx,
            &url,
            self.token,
            std::time::Duration::ZERO,
        )
        .await;
        let tracks = match walk.into_result() {
            Ok((tracks, _)) => tracks,
            Err(e) if e.is_cancelled() || e.is_unauthorized() || e.is_rate_limited() => {
                return Err(e);
            }
            Err(e) => {
                warning!("Error getting tracks for album {}: {}", album.name, e);
                return Ok(Vec::new());
            }
        };

        let album_image = first_image_url(&album.images);
        let album_artist = join_artists(&album.artists);
        let mut out = Vec::with_capacity(tracks.len());
        for track in tracks {
            let isrc = self.isrc(ctx, &track.id).await?;
            let (artist_id, artist_url) = utils::primary_artist(&track.artists);
            out.push(AlbumTrackMetadata {
                spotify_id: track.id.clone(),
                artists: join_artists(&track.artists),
                name: track.name,
                album_name: album.name.clone(),
                album_artist: album_artist.clone(),
                duration_ms: track.duration_ms,
                images: album_image.clone(),
                release_date: album.release_date.clone(),
                track_number: track.track_number,
                total_tracks: album.total_tracks,
                disc_number: track.disc_number,
                external_urls: track.external_urls.spotify,
                isrc,
                album_type: album.album_type.clone(),
                album_id: album.id.clone(),
                album_url: album.external_urls.spotify.clone(),
                artist_id,
                artist_url,
                artists_data: utils::artists_data(&track.artists),
            });
        }
        Ok(out)
    }
}
