use anyhow::Error;
use log::LevelFilter;
use logosaurus::{self, Logger, L_LEVEL, L_TIME};
use reqwest::Client;
use spotifyfollow::auth;
use std::env;
use std::process;

const DEFAULT_PORT: u16 = 8888;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let logger = Logger::builder()
        .set_prefix("accesstoken: ")
        .set_flags(L_LEVEL | L_TIME)
        .set_level(LevelFilter::Info)
        .build();
    logosaurus::init(logger).unwrap();

    let args = env::args().collect::<Vec<String>>();

    if args.len() < 2 || args.len() > 3 {
        print_help(&args[0]);
        process::exit(2);
    }

    let listen_port = match args.get(2) {
        Some(p) => p.parse()?,
        None => DEFAULT_PORT,
    };
    let cfg = auth::Config {
        client_id: args[1].clone(),
        listen_port,
    };

    let c = Client::new();
    let tok = auth::login(&c, &cfg).await?;
    println!("{}", tok.access_token);
    Ok(())
}

const INSTRUCTIONS: &str = r"1. create an app at https://developer.spotify.com/dashboard
2. add http://127.0.0.1:8888/callback to the app's redirect URIs
3. copy the app's client id
4. run this program with the client id; a browser window opens
5. approve access; the token prints to stdout";

fn print_help(prog: &str) {
    eprint!("usage: {} <CLIENT_ID> [PORT]\n\n", prog);
    eprint!("To set up a client id:\n");
    eprint!("{}\n", INSTRUCTIONS);
}
