use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use crownkeeper::{unix_ms, Event, Keeper, KeeperConfig, PermissionStore, Reconnect, EVENT_QUEUE};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{error, info, warn, Level};

mod link;

#[derive(Clone, Debug)]
struct Config {
    url: String,
    rooms: Vec<String>,
    tokens_path: PathBuf,
    storage_path: PathBuf,
    prefix: String,
    name: String,
    color: String,
    log_chat: bool,
    announce: bool,
    seed_owner: Option<String>,
}

impl Config {
    fn keeper(&self) -> KeeperConfig {
        KeeperConfig {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            announce: self.announce,
            log_chat: self.log_chat,
            seed_owner: self.seed_owner.clone(),
        }
    }
}

fn usage_and_exit() -> ! {
    eprintln!(
        "crownkeeperd\n\n\
USAGE:\n  crownkeeperd [--url URL] [--rooms a,b,c] [--tokens PATH] [--storage PATH]\n\
               [--prefix P] [--name NAME] [--color #RRGGBB] [--seed-owner ID]\n\
               [--no-chat-log] [--no-announce]\n\n\
ENV:\n  CROWNKEEPER_URL           default wss://mppclone.com\n\
  CROWNKEEPER_ROOMS         comma list, default lobby\n\
  CROWNKEEPER_TOKENS_PATH   default tokens.json (JSON map of URL -> token)\n\
  CROWNKEEPER_STORAGE_PATH  default storage.json\n\
  CROWNKEEPER_PREFIX        default =\n\
  CROWNKEEPER_NAME          default Crownkeeper\n\
  CROWNKEEPER_COLOR         default #777777\n\
  CROWNKEEPER_LOG_CHAT      default 1\n\
  CROWNKEEPER_ANNOUNCE      default 1\n\
  CROWNKEEPER_SEED_OWNER    optional participant _id\n"
    );
    std::process::exit(2);
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_rooms(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_args() -> Config {
    let env = |k: &str, d: &str| std::env::var(k).unwrap_or_else(|_| d.to_string());

    let mut url = env("CROWNKEEPER_URL", "wss://mppclone.com");
    let mut rooms = parse_rooms(&env("CROWNKEEPER_ROOMS", "lobby"));
    let mut tokens_path = PathBuf::from(env("CROWNKEEPER_TOKENS_PATH", "tokens.json"));
    let mut storage_path = PathBuf::from(env("CROWNKEEPER_STORAGE_PATH", "storage.json"));
    let mut prefix = env("CROWNKEEPER_PREFIX", "=");
    let mut name = env("CROWNKEEPER_NAME", "Crownkeeper");
    let mut color = env("CROWNKEEPER_COLOR", "#777777");
    let mut log_chat = env_flag("CROWNKEEPER_LOG_CHAT", true);
    let mut announce = env_flag("CROWNKEEPER_ANNOUNCE", true);
    let mut seed_owner = std::env::var("CROWNKEEPER_SEED_OWNER")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--url" => url = it.next().unwrap_or_else(|| usage_and_exit()),
            "--rooms" => rooms = parse_rooms(&it.next().unwrap_or_else(|| usage_and_exit())),
            "--tokens" => tokens_path = it.next().unwrap_or_else(|| usage_and_exit()).into(),
            "--storage" => storage_path = it.next().unwrap_or_else(|| usage_and_exit()).into(),
            "--prefix" => prefix = it.next().unwrap_or_else(|| usage_and_exit()),
            "--name" => name = it.next().unwrap_or_else(|| usage_and_exit()),
            "--color" => color = it.next().unwrap_or_else(|| usage_and_exit()),
            "--seed-owner" => seed_owner = Some(it.next().unwrap_or_else(|| usage_and_exit())),
            "--no-chat-log" => log_chat = false,
            "--no-announce" => announce = false,
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    if rooms.is_empty() || prefix.trim().is_empty() {
        usage_and_exit();
    }

    Config {
        url,
        rooms,
        tokens_path,
        storage_path,
        prefix,
        name,
        color,
        log_chat,
        announce,
        seed_owner,
    }
}

fn check_url(url: &str) -> anyhow::Result<()> {
    let uri: Uri = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL {url:?}: {e}"))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        _ => anyhow::bail!("invalid URL {url:?}: scheme must be ws or wss"),
    }
    if uri.authority().is_none() {
        anyhow::bail!("invalid URL {url:?}: missing host");
    }
    Ok(())
}

fn load_tokens(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read token file {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse token file {}", path.display()))
}

/// Token for `url`, tolerating a trailing slash on either side.
fn token_for(tokens: &HashMap<String, String>, url: &str) -> Option<String> {
    let bare = url.trim_end_matches('/');
    tokens
        .get(url)
        .or_else(|| tokens.get(bare))
        .or_else(|| tokens.get(&format!("{bare}/")))
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crownkeeper=info,crownkeeperd=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    if let Err(e) = run(cfg).await {
        error!(err = %format!("{e:#}"), "crownkeeperd failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    info!(url = %cfg.url, rooms = ?cfg.rooms, "initializing");

    check_url(&cfg.url)?;
    let tokens = load_tokens(&cfg.tokens_path)?;
    let token = token_for(&tokens, &cfg.url);
    if token.is_none() {
        warn!(url = %cfg.url, "no token for this url; connecting without one");
    }

    let mut store = PermissionStore::open(&cfg.storage_path)
        .with_context(|| format!("open storage {}", cfg.storage_path.display()))?;
    store.ensure_defaults()?;

    let (events_tx, mut events_rx) = mpsc::channel::<Event>(EVENT_QUEUE);
    let mut keeper = Keeper::new(cfg.keeper(), store, &cfg.rooms, events_tx.clone(), unix_ms());

    let links = cfg
        .rooms
        .iter()
        .enumerate()
        .map(|(conn, room)| link::Link {
            conn,
            url: cfg.url.clone(),
            room: room.clone(),
            token: token.clone(),
        })
        .collect::<Vec<_>>();
    for l in &links {
        tokio::spawn(link::run(l.clone(), events_tx.clone()));
    }
    info!(rooms = links.len(), "initialized");

    loop {
        tokio::select! {
            ev = events_rx.recv() => {
                let Some(ev) = ev else { break; };
                match keeper.handle(ev, unix_ms()) {
                    Some(Reconnect::After(conn, delay)) => {
                        let Some(l) = links.get(conn).cloned() else { continue; };
                        keeper.redialing(conn);
                        let tx = events_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            link::run(l, tx).await;
                        });
                    }
                    Some(Reconnect::Abandon(conn)) => {
                        let room = links.get(conn).map(|l| l.room.as_str()).unwrap_or("?");
                        error!(room, "reconnect attempts exhausted");
                        if keeper.all_failed() {
                            anyhow::bail!("every room connection gave up");
                        }
                    }
                    None => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
