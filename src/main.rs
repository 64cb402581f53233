use anyhow::{bail, Context, Result};
use clap::Parser;
use redis_explorer::config::{Config, ConnectionProfile};
use redis_explorer::explorer::Explorer;
use redis_explorer::seed;
use redis_explorer::shell::{parse_line, Outcome, Shell, HELP};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

/// Browse and edit the keys of a Redis database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Profile name to connect on startup, or to select for seeding/purging
    #[arg(long, value_name = "PROFILE")]
    profile: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed the Redis instance with test data
    #[arg(long)]
    seed: bool,

    /// Purge (delete) all keys in the Redis instance
    #[arg(long)]
    purge: bool,
}

fn is_local(profile: &ConnectionProfile) -> bool {
    Url::parse(&profile.url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host == "localhost" || host == "127.0.0.1"))
        .unwrap_or(false)
}

fn pick_profile<'a>(
    config: &'a Config,
    name: Option<&str>,
    prefer_dev: bool,
) -> Result<&'a ConnectionProfile> {
    if let Some(name) = name {
        return config
            .find_profile(name)
            .with_context(|| format!("Profile '{}' not found in configuration.", name));
    }
    let preferred = if prefer_dev {
        config.profiles.iter().find(|p| p.is_dev() || is_local(p))
    } else {
        None
    };
    preferred
        .or_else(|| config.profiles.first())
        .context("No connection profile configured.")
}

async fn seed_or_purge(args: &CliArgs, config: &Config) -> Result<()> {
    let action = if args.purge { "purge" } else { "seed" };
    let profile = pick_profile(config, args.profile.as_deref(), true)?;
    if !profile.is_dev() {
        bail!(
            "Profile '{}' is not marked dev=true; refusing to {}.",
            profile.name,
            action
        );
    }

    let db = profile.db.unwrap_or(0);
    println!("Targeting profile: {} ({}) for {}.", profile.name, profile.url, action);
    if args.purge {
        println!("This will delete ALL KEYS in database {} on {}.", db, profile.url);
    } else {
        println!(
            "This will delete ALL KEYS in database {} on {} and add a large amount of test data.",
            db, profile.url
        );
    }
    println!("Are you sure you want to proceed? (yes/no)");
    let mut confirmation = String::new();
    io::stdin().read_line(&mut confirmation)?;
    if confirmation.trim().to_lowercase() != "yes" {
        println!("{} cancelled by user.", if args.purge { "Purge" } else { "Seeding" });
        return Ok(());
    }

    if args.purge {
        seed::purge_redis_data(&profile.url, db).await?;
        println!("Redis purged successfully for profile '{}'.", profile.name);
    } else {
        seed::seed_redis_data(&profile.url, db).await?;
        println!("Redis seeded successfully for profile '{}'.", profile.name);
    }
    Ok(())
}

async fn run_shell(explorer: Explorer) -> Result<()> {
    let mut shell = Shell::new(explorer);
    if let Err(e) = shell.explorer().keys().load().await {
        println!("Error: {}", e);
    }
    println!("{}", shell.render_keys());
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{}\n{}", message, HELP);
                continue;
            }
        };
        match shell.handle(command).await {
            Outcome::Print(out) => println!("{}", out),
            Outcome::Quit => break,
        }
    }
    shell.explorer().shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();
    let config = Config::load(args.config.as_deref());

    if args.seed || args.purge {
        return seed_or_purge(&args, &config).await;
    }

    let profile = pick_profile(&config, args.profile.as_deref(), false)?;
    let explorer = Explorer::connect(profile, &config.explorer)
        .await
        .with_context(|| format!("Could not connect to '{}' ({})", profile.name, profile.url))?;
    run_shell(explorer).await
}
