use anyhow::{anyhow, bail, Context, Error};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::{debug, info};
use rand::Rng;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes the application needs: profile + email rendering and the
/// follow/unfollow operations.
pub const SCOPES: &str = "user-read-private user-read-email user-follow-read user-follow-modify";

pub struct Config {
    pub client_id: String,
    /// Loopback port the authorization redirect is caught on. Must match a
    /// redirect URI registered for the client id.
    pub listen_port: u16,
}

impl Config {
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.listen_port)
    }
}

/// A code_verifier and its S256 challenge (RFC 7636).
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> PkcePair {
        let verifier = random_urlsafe(32);
        let challenge = challenge_for(&verifier);
        PkcePair { verifier, challenge }
    }
}

fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_urlsafe(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random `state` parameter binding the redirect to this handshake.
pub fn generate_state() -> String {
    random_urlsafe(16)
}

pub fn authorize_url(cfg: &Config, challenge: &str, state: &str) -> String {
    let mut url = Url::parse(AUTHORIZE_URL).expect("authorize url");
    url.query_pairs_mut()
        .append_pair("client_id", &cfg.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &cfg.redirect_uri())
        .append_pair("scope", SCOPES)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", challenge)
        .append_pair("state", state);
    url.to_string()
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

/// Exchanges the authorization code for an access token. The token endpoint
/// takes a form-encoded body; a public client sends no secret, the verifier
/// stands in for it.
pub async fn exchange_code(
    c: &HttpClient,
    cfg: &Config,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse, Error> {
    let redirect_uri = cfg.redirect_uri();
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", cfg.client_id.as_str()),
        ("code_verifier", verifier),
    ];

    let req = c
        .post(TOKEN_URL)
        .form(&params)
        .build()
        .context("build request")?;

    let rsp = c.execute(req).await.context("execute request")?;
    if !rsp.status().is_success() {
        bail!("bad status code: {}", rsp.status());
    }

    rsp.json().await.context("json deserialize")
}

/// Runs the full authorization handshake: generate PKCE material, open the
/// provider's consent page in a browser, catch the redirect on the loopback
/// listener, exchange the returned code.
pub async fn login(c: &HttpClient, cfg: &Config) -> Result<TokenResponse, Error> {
    let pkce = PkcePair::generate();
    let state = generate_state();

    // Bind before opening the browser so the redirect cannot race the
    // listener.
    let addr = format!("127.0.0.1:{}", cfg.listen_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;

    let url = authorize_url(cfg, &pkce.challenge, &state);
    info!("opening authorization page in browser");
    if open::that(&url).is_err() {
        info!("could not open a browser; visit this URL to continue:\n{}", url);
    }

    info!("waiting for authorization redirect on {}", addr);
    let code = wait_for_callback(&listener, &state).await?;

    exchange_code(c, cfg, &code, &pkce.verifier).await
}

#[derive(Debug, PartialEq)]
struct CallbackParams {
    code: String,
    state: String,
}

/// Accepts connections until the `/callback` redirect arrives, then returns
/// the authorization code. Stray requests (favicon and friends) get a 404
/// and are ignored.
pub async fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
) -> Result<String, Error> {
    loop {
        let (mut stream, _) = listener.accept().await.context("accept connection")?;

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.context("read request")?;
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
        let line = request.lines().next().unwrap_or_default();

        if !line.contains("/callback") {
            debug!("ignoring request: {}", line);
            respond(&mut stream, "404 Not Found", "Not found.").await;
            continue;
        }

        match parse_callback(line) {
            Ok(params) if params.state == expected_state => {
                respond(&mut stream, "200 OK", "Signed in. You can close this window.").await;
                return Ok(params.code);
            }
            Ok(_) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed.").await;
                bail!("state mismatch in authorization redirect");
            }
            Err(e) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed.").await;
                return Err(e);
            }
        }
    }
}

fn parse_callback(request_line: &str) -> Result<CallbackParams, Error> {
    // e.g. GET /callback?code=...&state=... HTTP/1.1
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("malformed request line: {:?}", request_line))?;
    let url = Url::parse(&format!("http://127.0.0.1{}", target)).context("parse redirect url")?;

    let mut code = None;
    let mut state = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => bail!("authorization denied: {}", v),
            _ => {}
        }
    }

    Ok(CallbackParams {
        code: code.ok_or_else(|| anyhow!("redirect missing code parameter"))?,
        state: state.unwrap_or_default(),
    })
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let page = format!("<!DOCTYPE html><html><body><p>{}</p></body></html>", body);
    let rsp = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        page.len(),
        page
    );
    let _ = stream.write_all(rsp.as_bytes()).await;
    let _ = stream.shutdown().await;
}
