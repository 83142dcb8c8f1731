//! platecache - browse the restaurant directory from the command line.
//!
//! Reads go through the local store once it is populated, so most commands
//! keep working with `--offline`. Reviews written offline are parked and
//! sent on a later online run.

use std::io;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use platecache_core::data::query::ALL;
use platecache_core::{
    AssetCacheManager, Config, Connectivity, DataAccessLayer, NewReview, ReviewSubmission,
};

/// Directory for daily rolling log files; stderr only when unset
const ENV_LOG_DIR: &str = "PLATECACHE_LOG_DIR";
const LOG_FILE_PREFIX: &str = "platecache.log";

const USAGE: &str = "\
Usage: platecache [--offline] <command>

Commands:
  restaurants [--cuisine C] [--neighborhood N]
  restaurant <id>
  cuisines
  neighborhoods
  reviews <restaurant_id>
  review <restaurant_id> <name> <rating> <comments>
  favorite <restaurant_id> <true|false>
  assets install|activate|list
  assets fetch <url>
  config show|save";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let offline = take_flag(&mut args, "--offline");
    if args.is_empty() {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    info!(api = %config.api_base_url, offline, "platecache starting");

    match args[0].as_str() {
        "assets" => return run_assets(&config, &args[1..]).await,
        "config" => return run_config(&config, &args[1..]),
        _ => {}
    }

    let connectivity = Connectivity::new(!offline);
    let dal = DataAccessLayer::from_config(&config, connectivity)?;
    let result = run_data(&dal, &args).await;

    dal.flush_background().await;
    if dal.connectivity().is_online() {
        // Lets a review pending from an earlier offline run finish sending
        dal.queue().wait_idle().await;
    }
    result
}

async fn run_data(dal: &DataAccessLayer, args: &[String]) -> Result<()> {
    match args[0].as_str() {
        "restaurants" => {
            let mut rest = args[1..].to_vec();
            let cuisine = take_option(&mut rest, "--cuisine")?.unwrap_or_else(|| ALL.to_string());
            let neighborhood = take_option(&mut rest, "--neighborhood")?.unwrap_or_else(|| ALL.to_string());
            let restaurants = dal.fetch_by_cuisine_and_neighborhood(&cuisine, &neighborhood).await?;
            for r in &restaurants {
                println!("{:>4}  {}  ({}, {})  {}", r.id, r.name, r.cuisine_type, r.neighborhood, r.page_url());
            }
            eprintln!("{} restaurants", restaurants.len());
        }
        "restaurant" => {
            let id = parse_id(args.get(1))?;
            let restaurant = dal.fetch_restaurant_by_id(id).await?;
            println!("{}", serde_json::to_string_pretty(&restaurant)?);
            println!("image: {}", restaurant.image_url());
            println!("marker: {}", serde_json::to_string(&restaurant.map_marker())?);
        }
        "cuisines" => {
            for cuisine in dal.fetch_cuisines().await? {
                println!("{}", cuisine);
            }
        }
        "neighborhoods" => {
            for neighborhood in dal.fetch_neighborhoods().await? {
                println!("{}", neighborhood);
            }
        }
        "reviews" => {
            let id = parse_id(args.get(1))?;
            let reviews = dal.fetch_reviews_for_restaurant(id).await?;
            println!("{}", serde_json::to_string_pretty(&reviews)?);
        }
        "review" => {
            let [_, id, name, rating, comments] = args else {
                bail!("review needs <restaurant_id> <name> <rating> <comments>\n\n{}", USAGE);
            };
            let rating: u8 = rating
                .parse()
                .with_context(|| format!("Invalid rating: {}", rating))?;
            let review = NewReview::new(parse_id(Some(id))?, name.as_str(), rating, comments.as_str());

            match dal.submit_review(review).await {
                ReviewSubmission::Created(created) => println!("Review {} created", created.id),
                ReviewSubmission::Acknowledged => println!("Review accepted"),
                ReviewSubmission::Queued => println!("Offline: review saved and will be sent when back online"),
                ReviewSubmission::Failed => bail!("Review could not be submitted"),
            }
        }
        "favorite" => {
            let id = parse_id(args.get(1))?;
            let favorite = match args.get(2).map(String::as_str) {
                Some("true") => true,
                Some("false") => false,
                _ => bail!("favorite needs <restaurant_id> <true|false>"),
            };
            dal.update_favorite_status(id, favorite).await?;
            println!("Restaurant {} favorite: {}", id, favorite);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

async fn run_assets(config: &Config, args: &[String]) -> Result<()> {
    let assets = AssetCacheManager::from_config(config)?;

    match args.first().map(String::as_str) {
        Some("install") => {
            let count = assets.install().await?;
            println!("Installed {} assets into {}", count, assets.generation());
        }
        Some("activate") => {
            let deleted = assets.activate().await?;
            println!("Active generation: {}", assets.generation());
            for name in deleted {
                println!("Deleted {}", name);
            }
        }
        Some("fetch") => {
            let url = args.get(1).ok_or_else(|| anyhow!("assets fetch needs <url>"))?;
            let response = assets.fetch(url).await?;
            println!(
                "{} {} {:?} {} bytes ({})",
                response.status,
                response.url,
                response.source,
                response.body.len(),
                response.content_type.as_deref().unwrap_or("unknown type"),
            );
        }
        Some("list") => {
            println!("State: {:?}", assets.state());
            for name in assets.cache_names()? {
                let marker = if name == assets.generation() { "*" } else { " " };
                println!("{} {}", marker, name);
            }
            for url in assets.cached_urls()? {
                println!("    {}", url);
            }
        }
        _ => bail!("assets needs install, activate, fetch <url> or list\n\n{}", USAGE),
    }
    Ok(())
}

fn run_config(config: &Config, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("show") | None => println!("{}", serde_json::to_string_pretty(config)?),
        // Writes the effective settings, environment overrides included
        Some("save") => {
            config.save()?;
            println!("Configuration saved");
        }
        Some(other) => bail!("Unknown config command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} needs a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn parse_id(arg: Option<&String>) -> Result<i64> {
    let arg = arg.ok_or_else(|| anyhow!("Missing restaurant id\n\n{}", USAGE))?;
    arg.parse()
        .with_context(|| format!("Invalid restaurant id: {}", arg))
}
