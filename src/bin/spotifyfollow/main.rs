use anyhow::{bail, Context, Error};
use futures::future;
use getopts::Options;
use log::*;
use logosaurus::{self, Logger, L_LEVEL, L_TIME};
use reqwest::Client as HttpClient;
use spotifyfollow::api::{self, Artist, SearchKind, Track, UserProfile};
use spotifyfollow::auth;
use spotifyfollow::cookies::CookieJar;
use spotifyfollow::token::{self, TokenManager};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    let logger = Logger::builder()
        .set_prefix("spotifyfollow: ")
        .set_flags(L_LEVEL | L_TIME)
        .set_level(LevelFilter::Info)
        .build();
    logosaurus::init(logger).unwrap();

    if let Err(e) = run().await {
        error!("{:#}", e);
        process::exit(1);
    }
}

const DEFAULT_PORT: u16 = 8888;

fn usage(prog: &str, opts: &Options) -> String {
    let brief = format!(
        "usage: {} [options] [command]\n\n\
         commands:\n\
         \x20 profile            show the signed-in user's profile and followed artists (default)\n\
         \x20 artists            list followed artists\n\
         \x20 search <query>     search tracks or artists\n\
         \x20 follow <id>...     follow artists by id\n\
         \x20 unfollow <id>...   unfollow artists by id\n\
         \x20 logout             forget the stored access token",
        prog
    );
    opts.usage(&brief)
}

async fn run() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();

    let mut opts = Options::new();
    opts.optopt("t", "type", "search result type: track or artist (default: track)", "TYPE");
    opts.optopt("p", "port", "loopback port for the authorization redirect", "PORT");
    opts.optflag("h", "help", "print this help");

    let matches = opts.parse(&args[1..]).context("parse arguments")?;
    if matches.opt_present("h") {
        print!("{}", usage(&args[0], &opts));
        return Ok(());
    }

    let port = match matches.opt_str("p") {
        Some(p) => p.parse().context("parse port")?,
        None => DEFAULT_PORT,
    };

    let jar = match CookieJar::default_path() {
        Some(p) => CookieJar::open(p),
        None => bail!("could not determine a data directory for the cookie jar"),
    };
    let tokens = TokenManager::new(jar);
    let http = HttpClient::new();

    let cmd = matches.free.first().map(String::as_str).unwrap_or("profile");

    // logout works offline and without a client id
    if cmd == "logout" {
        tokens.clear()?;
        info!("signed out");
        return Ok(());
    }

    let client_id = env::var("SPOTIFY_CLIENT_ID").context("SPOTIFY_CLIENT_ID must be set")?;
    let cfg = auth::Config {
        client_id,
        listen_port: port,
    };

    let access_token = ensure_token(&http, &cfg, &tokens).await?;

    match cmd {
        "profile" => show_profile(&http, &access_token, &tokens).await?,
        "artists" => {
            let artists = api::followed_artists(&http, &access_token)
                .await
                .context("load followed artists")?;
            print!("{}", render_artists(&artists));
        }
        "search" => {
            let query = matches.free[1..].join(" ");
            if query.trim().is_empty() {
                bail!("search needs a query");
            }
            let kind = match matches.opt_str("t") {
                Some(t) => t.parse()?,
                None => SearchKind::Track,
            };
            run_search(&http, &access_token, &query, kind).await?;
        }
        "follow" => {
            let ids = matches.free[1..].to_vec();
            if ids.is_empty() {
                bail!("follow needs at least one artist id");
            }
            api::follow_artists(&http, &access_token, &ids).await?;
            info!("now following {} artist(s)", ids.len());
        }
        "unfollow" => {
            let ids = matches.free[1..].to_vec();
            if ids.is_empty() {
                bail!("unfollow needs at least one artist id");
            }
            api::unfollow_artists(&http, &access_token, &ids).await?;
            info!("unfollowed {} artist(s)", ids.len());
        }
        other => bail!("unknown command: {}", other),
    }

    Ok(())
}

/// Reuses the stored token when it is still good, otherwise runs the
/// authorization flow and stores the result.
async fn ensure_token(
    http: &HttpClient,
    cfg: &auth::Config,
    tokens: &TokenManager,
) -> Result<String, Error> {
    if let Some(tok) = tokens.valid_token()? {
        if token::validate(http, &tok).await {
            debug!("reusing stored access token");
            return Ok(tok);
        }
        info!("stored access token no longer valid");
        tokens.clear()?;
    }

    let rsp = auth::login(http, cfg).await.context("authorization flow")?;
    tokens.save(&rsp.access_token, Some(rsp.expires_in))?;
    info!("signed in");
    Ok(rsp.access_token)
}

async fn show_profile(
    http: &HttpClient,
    access_token: &str,
    tokens: &TokenManager,
) -> Result<(), Error> {
    let (profile, artists) = future::join(
        api::fetch_profile(http, access_token),
        api::followed_artists(http, access_token),
    )
    .await;

    let profile = match profile {
        Ok(p) => p,
        Err(e) => {
            // a profile that no longer loads invalidates the session
            tokens.clear()?;
            return Err(e.context("load profile"));
        }
    };
    print!("{}", render_profile(&profile));

    match artists {
        Ok(list) => {
            println!();
            print!("{}", render_artists(&list));
        }
        Err(e) => error!("load followed artists: {:#}", e),
    }

    Ok(())
}

async fn run_search(
    http: &HttpClient,
    access_token: &str,
    query: &str,
    kind: SearchKind,
) -> Result<(), Error> {
    let results = api::search(http, access_token, query, kind)
        .await
        .context("search")?;

    match kind {
        SearchKind::Track => {
            let tracks = results.tracks.map(|p| p.items).unwrap_or_default();
            if tracks.is_empty() {
                println!("no tracks found");
                return Ok(());
            }
            print!("{}", render_tracks(&tracks));
        }
        SearchKind::Artist => {
            let artists = results.artists.map(|p| p.items).unwrap_or_default();
            if artists.is_empty() {
                println!("no artists found");
                return Ok(());
            }
            let ids: Vec<String> = artists.iter().map(|a| a.id.clone()).collect();
            let following = api::is_following(http, access_token, &ids)
                .await
                .context("check followed state")?;
            print!("{}", render_artist_results(&artists, &following));
        }
    }

    Ok(())
}

fn render_profile(p: &UserProfile) -> String {
    let name = p.display_name.as_deref().unwrap_or(&p.id);
    let mut buf = format!("{}\n", name);
    buf.push_str(&format!("  id:        {}\n", p.id));
    if let Some(email) = &p.email {
        buf.push_str(&format!("  email:     {}\n", email));
    }
    buf.push_str(&format!("  uri:       {}\n", p.uri));
    buf.push_str(&format!("  url:       {}\n", p.href));
    buf.push_str(&format!("  followers: {}\n", p.followers.total));
    buf
}

fn render_artists(artists: &[Artist]) -> String {
    if artists.is_empty() {
        return String::from("no followed artists\n");
    }
    let mut buf = String::from("followed artists:\n");
    for a in artists {
        buf.push_str(&format!("  {}\n", a.name));
        buf.push_str(&format!("    followers: {}\n", a.followers.total));
        push_genres(&mut buf, &a.genres, 2);
        buf.push_str(&format!("    {}\n", a.external_urls.spotify));
    }
    buf
}

fn render_artist_results(artists: &[Artist], following: &[bool]) -> String {
    let mut buf = String::new();
    for (i, a) in artists.iter().enumerate() {
        let followed = following.get(i).copied().unwrap_or(false);
        let marker = if followed { " [following]" } else { "" };
        buf.push_str(&format!("{}. {}{}\n", i + 1, a.name, marker));
        buf.push_str(&format!("    id: {}\n", a.id));
        buf.push_str(&format!("    followers: {}\n", a.followers.total));
        push_genres(&mut buf, &a.genres, 3);
        buf.push_str(&format!("    {}\n", a.external_urls.spotify));
    }
    buf
}

fn render_tracks(tracks: &[Track]) -> String {
    let mut buf = String::new();
    for (i, t) in tracks.iter().enumerate() {
        let artists = t
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<&str>>()
            .join(", ");
        buf.push_str(&format!("{}. {}\n", i + 1, t.name));
        buf.push_str(&format!("    by: {}\n", artists));
        buf.push_str(&format!(
            "    album: {} ({})\n",
            t.album.name,
            format_duration(t.duration_ms)
        ));
        buf.push_str(&format!("    {}\n", t.external_urls.spotify));
    }
    buf
}

fn push_genres(buf: &mut String, genres: &[String], max: usize) {
    if genres.is_empty() {
        return;
    }
    let shown = genres
        .iter()
        .take(max)
        .map(String::as_str)
        .collect::<Vec<&str>>()
        .join(", ");
    buf.push_str(&format!("    genres: {}\n", shown));
}

fn format_duration(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}
