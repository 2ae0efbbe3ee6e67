use anyhow::{bail, Context, Error};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::str::FromStr;

pub const API_BASE: &str = "https://api.spotify.com/v1";
pub const ME_URL: &str = "https://api.spotify.com/v1/me";

const FOLLOWED_LIMIT: u32 = 25;
const SEARCH_LIMIT: u32 = 5;

/// GET /v1/me
pub async fn fetch_profile(c: &HttpClient, token: &str) -> Result<UserProfile, Error> {
    let req = c
        .get(ME_URL)
        .bearer_auth(token)
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    rsp.json().await.context("json deserialize")
}

/// GET /v1/me/following?type=artist — the first page of followed artists.
pub async fn followed_artists(c: &HttpClient, token: &str) -> Result<Vec<Artist>, Error> {
    let limit = FOLLOWED_LIMIT.to_string();
    let req = c
        .get(format!("{}/me/following", API_BASE))
        .bearer_auth(token)
        .query(&[("type", "artist"), ("limit", limit.as_str())])
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    let rsp: FollowedArtistsResponse = rsp.json().await.context("json deserialize")?;
    Ok(rsp.artists.items)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchKind {
    Track,
    Artist,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Artist => "artist",
        }
    }
}

impl FromStr for SearchKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<SearchKind, Error> {
        match s {
            "track" => Ok(SearchKind::Track),
            "artist" => Ok(SearchKind::Artist),
            other => bail!("unsupported search type: {}", other),
        }
    }
}

/// GET /v1/search
pub async fn search(
    c: &HttpClient,
    token: &str,
    query: &str,
    kind: SearchKind,
) -> Result<SearchResponse, Error> {
    let limit = SEARCH_LIMIT.to_string();
    let req = c
        .get(format!("{}/search", API_BASE))
        .bearer_auth(token)
        .query(&[("q", query), ("type", kind.as_str()), ("limit", limit.as_str())])
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    rsp.json().await.context("json deserialize")
}

/// PUT /v1/me/following?type=artist&ids=...
pub async fn follow_artists(c: &HttpClient, token: &str, ids: &[String]) -> Result<(), Error> {
    following_request(c, reqwest::Method::PUT, token, ids).await
}

/// DELETE /v1/me/following?type=artist&ids=...
pub async fn unfollow_artists(c: &HttpClient, token: &str, ids: &[String]) -> Result<(), Error> {
    following_request(c, reqwest::Method::DELETE, token, ids).await
}

async fn following_request(
    c: &HttpClient,
    method: reqwest::Method,
    token: &str,
    ids: &[String],
) -> Result<(), Error> {
    let ids = ids.join(",");
    let req = c
        .request(method, format!("{}/me/following", API_BASE))
        .bearer_auth(token)
        .query(&[("type", "artist"), ("ids", ids.as_str())])
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    Ok(())
}

/// GET /v1/me/following/contains?type=artist&ids=... — one bool per input
/// id, in order.
pub async fn is_following(
    c: &HttpClient,
    token: &str,
    ids: &[String],
) -> Result<Vec<bool>, Error> {
    let ids = ids.join(",");
    let req = c
        .get(format!("{}/me/following/contains", API_BASE))
        .bearer_auth(token)
        .query(&[("type", "artist"), ("ids", ids.as_str())])
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    rsp.json().await.context("json deserialize")
}

#[derive(Debug, Deserialize)]
pub struct UserProfile {
    // null for accounts that never set one
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub id: String,
    pub uri: String,
    pub href: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    pub external_urls: ExternalUrls,
    pub followers: Followers,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalUrls {
    pub spotify: String,
}

#[derive(Debug, Deserialize)]
pub struct Followers {
    #[serde(default)]
    pub href: Option<String>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub followers: Followers,
    #[serde(default)]
    pub images: Vec<Image>,
    pub external_urls: ExternalUrls,
    pub uri: String,
    #[serde(default)]
    pub popularity: u32,
}

#[derive(Debug, Deserialize)]
struct FollowedArtistsResponse {
    artists: ArtistCursorPage,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ArtistCursorPage {
    items: Vec<Artist>,
    total: u32,
    #[serde(default)]
    next: Option<String>,
    cursors: Cursors,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<TrackArtist>,
    pub album: Album,
    pub duration_ms: u64,
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub popularity: u32,
}

#[derive(Debug, Deserialize)]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<Page<Track>>,
    #[serde(default)]
    pub artists: Option<Page<Artist>>,
}

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u32,
    pub limit: u32,
    pub offset: u32,
    #[serde(default)]
    pub next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_kind_from_str() {
        assert_eq!("track".parse::<SearchKind>().unwrap(), SearchKind::Track);
        assert_eq!("artist".parse::<SearchKind>().unwrap(), SearchKind::Artist);
        assert!("album".parse::<SearchKind>().is_err());
    }

    #[test]
    fn deserialize_profile() {
        let profile: UserProfile = serde_json::from_str(
            r#"{
                "country": "FR",
                "display_name": "Jo",
                "email": "jo@example.com",
                "explicit_content": {"filter_enabled": false, "filter_locked": false},
                "external_urls": {"spotify": "https://open.spotify.com/user/jo"},
                "followers": {"href": null, "total": 12},
                "href": "https://api.spotify.com/v1/users/jo",
                "id": "jo",
                "images": [{"url": "https://i.scdn.co/image/x", "height": 64, "width": 64}],
                "product": "premium",
                "type": "user",
                "uri": "spotify:user:jo"
            }"#,
        )
        .unwrap();

        assert_eq!(profile.display_name.as_deref(), Some("Jo"));
        assert_eq!(profile.email.as_deref(), Some("jo@example.com"));
        assert_eq!(profile.followers.total, 12);
        assert_eq!(profile.images.len(), 1);
    }

    #[test]
    fn deserialize_profile_with_null_display_name() {
        let profile: UserProfile = serde_json::from_str(
            r#"{
                "display_name": null,
                "external_urls": {"spotify": "https://open.spotify.com/user/jo"},
                "followers": {"href": null, "total": 0},
                "href": "https://api.spotify.com/v1/users/jo",
                "id": "jo",
                "uri": "spotify:user:jo"
            }"#,
        )
        .unwrap();

        assert_eq!(profile.display_name, None);
        assert_eq!(profile.email, None);
    }

    #[test]
    fn deserialize_followed_artists() {
        let rsp: FollowedArtistsResponse = serde_json::from_str(
            r#"{
                "artists": {
                    "href": "https://api.spotify.com/v1/me/following?type=artist",
                    "limit": 25,
                    "next": null,
                    "cursors": {"after": null},
                    "total": 1,
                    "items": [{
                        "external_urls": {"spotify": "https://open.spotify.com/artist/a1"},
                        "followers": {"href": null, "total": 1000},
                        "genres": ["psych rock", "indie", "pop"],
                        "href": "https://api.spotify.com/v1/artists/a1",
                        "id": "a1",
                        "images": [],
                        "name": "Tame Impala",
                        "popularity": 80,
                        "type": "artist",
                        "uri": "spotify:artist:a1"
                    }]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(rsp.artists.items.len(), 1);
        assert_eq!(rsp.artists.items[0].name, "Tame Impala");
        assert_eq!(rsp.artists.items[0].genres.len(), 3);
    }

    #[test]
    fn deserialize_track_search() {
        let rsp: SearchResponse = serde_json::from_str(
            r#"{
                "tracks": {
                    "href": "https://api.spotify.com/v1/search?q=x&type=track",
                    "items": [{
                        "id": "t1",
                        "name": "Let It Happen",
                        "artists": [{"id": "a1", "name": "Tame Impala"}],
                        "album": {"name": "Currents", "images": []},
                        "duration_ms": 467586,
                        "external_urls": {"spotify": "https://open.spotify.com/track/t1"},
                        "preview_url": null,
                        "popularity": 70
                    }],
                    "limit": 5,
                    "next": null,
                    "offset": 0,
                    "previous": null,
                    "total": 1
                }
            }"#,
        )
        .unwrap();

        let tracks = rsp.tracks.unwrap();
        assert!(rsp.artists.is_none());
        assert_eq!(tracks.items[0].name, "Let It Happen");
        assert_eq!(tracks.items[0].artists[0].name, "Tame Impala");
        assert_eq!(tracks.items[0].duration_ms, 467586);
    }

    #[test]
    fn deserialize_artist_search() {
        let rsp: SearchResponse = serde_json::from_str(
            r#"{
                "artists": {
                    "href": "https://api.spotify.com/v1/search?q=x&type=artist",
                    "items": [{
                        "external_urls": {"spotify": "https://open.spotify.com/artist/a1"},
                        "followers": {"href": null, "total": 42},
                        "genres": [],
                        "href": "https://api.spotify.com/v1/artists/a1",
                        "id": "a1",
                        "images": [],
                        "name": "Unknown Artist",
                        "popularity": 1,
                        "type": "artist",
                        "uri": "spotify:artist:a1"
                    }],
                    "limit": 5,
                    "next": null,
                    "offset": 0,
                    "previous": null,
                    "total": 1
                }
            }"#,
        )
        .unwrap();

        let artists = rsp.artists.unwrap();
        assert!(rsp.tracks.is_none());
        assert_eq!(artists.items[0].id, "a1");
        assert!(artists.items[0].genres.is_empty());
    }
}
