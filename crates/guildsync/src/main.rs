use clap::Parser;
use guildsync::{Cli, Commands, GuildQuery, GuildService, GuildSyncConfig};
use guildsync_core::{NormalizedGuild, ResultEnvelope};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    guildsync_core::init_tracing(cli.verbose, false)?;

    let config = match &cli.config {
        Some(path) => GuildSyncConfig::from_file(path)?,
        None => GuildSyncConfig::load()?,
    };

    match cli.command {
        Commands::Guilds {
            user_id,
            token,
            shared,
            concurrency,
            json,
        } => {
            let service = GuildService::from_config(&config)?;
            let mut query = GuildQuery::new(token, user_id);
            if let Some(concurrency) = concurrency {
                query = query.with_concurrency(concurrency);
            }

            let result = if shared {
                service.get_shared_guilds_for_user(&query).await?
            } else {
                service.get_all_user_guilds_with_bot_status(&query).await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_table(&result);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

fn print_table(result: &ResultEnvelope<Vec<NormalizedGuild>>) {
    let meta = result.meta();
    println!(
        "source: {}  stale: {}  rate limited: {}",
        meta.source(),
        meta.stale(),
        meta.rate_limited()
    );
    if let Some(retry_after_ms) = meta.retry_after_ms() {
        println!("retry after: {}ms", retry_after_ms);
    }
    println!();

    if result.data().is_empty() {
        println!("No guilds.");
        return;
    }

    println!("{:<20} {:<6} {:<8} {:<12} NAME", "ID", "BOT", "ROLE", "SOURCE");
    for guild in result.data() {
        println!(
            "{:<20} {:<6} {:<8} {:<12} {}{}",
            guild.id(),
            if *guild.bot_installed() { "yes" } else { "no" },
            guild.role_label().to_string(),
            guild.role_source().to_string(),
            guild.name(),
            if *guild.is_primary() { " (primary)" } else { "" },
        );
    }
}
