use std::env;

use anyhow::{bail, Context, Result};
use bullpen_service::Bullpen;
use bullpen_types::{
    config::BullpenConfig,
    events::GameUpdate,
    game::{Bases, InningHalf},
    matchup::{MatchupComponent, MatchupQuery, MatchupResult},
    stats::StatKey,
    GameId, PlayerId,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;

#[derive(Parser)]
#[command(name = "bullpen", about = "Live game tracking and batter/pitcher matchups")]
struct Cli {
    /// Config file; falls back to $BULLPEN_CONFIG, then configs/dev.toml.
    #[arg(long, short)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll games and print every accepted update until they finish.
    Track {
        /// Games to track in addition to `tracker.game_ids`.
        games: Vec<GameId>,
    },
    /// Resolve one batter/pitcher matchup.
    Matchup {
        batter: PlayerId,
        pitcher: PlayerId,
        /// Pin the resolver clock (RFC 3339, not in the future); answers from
        /// stored data only.
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
        /// Print the raw result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show every stored head-to-head snapshot for a pair.
    History { batter: PlayerId, pitcher: PlayerId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);
    let bullpen = Bullpen::from_config(config).await?;
    let data_dir = bullpen.boot().await?;

    match cli.command {
        Command::Track { games } => {
            for game_id in games {
                bullpen.tracker().track(game_id).await;
            }
            if bullpen.tracker().tracked_games().await.is_empty() {
                bail!("no games to track; pass ids or set tracker.game_ids");
            }
            track(&bullpen, data_dir).await?;
        }
        Command::Matchup {
            batter,
            pitcher,
            as_of,
            json,
        } => {
            let mut query = MatchupQuery::new(batter, pitcher);
            if let Some(at) = as_of {
                query = query.as_of(at);
            }
            let enriched = bullpen.matchup(&query).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&enriched).context("encode matchup")?
                );
            } else {
                print_matchup(&enriched.result);
                if let Some(insight) = enriched.insight {
                    println!("\n{insight}");
                }
            }
        }
        Command::History { batter, pitcher } => {
            let history = bullpen
                .store()
                .history(&StatKey::head_to_head(batter, pitcher))
                .await?;
            if history.is_empty() {
                println!("no stored head-to-head data for {batter} vs {pitcher}");
            }
            for snapshot in history {
                println!(
                    "{}  {:?}  {}",
                    snapshot.fetched_at.to_rfc3339(),
                    snapshot.source_tier,
                    serde_json::to_string(&snapshot.payload).context("encode payload")?
                );
            }
        }
    }
    Ok(())
}

async fn track(bullpen: &Bullpen, data_dir: std::path::PathBuf) -> Result<()> {
    let mut updates = bullpen.hub().subscribe();
    let journal = bullpen.spawn_journal(data_dir);
    let poller = bullpen.spawn_poller();

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else { break };
                print_update(&update);
                if bullpen.tracker().pollable_games().await.is_empty() {
                    info!("all tracked games are final");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    poller.shutdown().await?;
    journal.abort();
    Ok(())
}

fn print_update(update: &GameUpdate) {
    let s = &update.state;
    let half = match s.inning_half {
        InningHalf::Top => "Top",
        InningHalf::Bottom => "Bot",
    };
    println!(
        "game {} [{:?}] {half} {} | {} out | {}-{} | {} | away {} home {}",
        s.game_id,
        s.status,
        s.inning,
        s.outs,
        s.count.balls,
        s.count.strikes,
        bases(&s.bases),
        s.score.away,
        s.score.home,
    );
    for event in &update.events {
        println!(
            "  #{:<4} batter {:<7} vs pitcher {:<7} {:?}",
            event.event_id, event.batter_id, event.pitcher_id, event.outcome
        );
    }
}

fn bases(bases: &Bases) -> String {
    [(bases.first, "1B"), (bases.second, "2B"), (bases.third, "3B")]
        .iter()
        .map(|(on, label)| if *on { *label } else { "--" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_matchup(result: &MatchupResult) {
    println!(
        "batter {} vs pitcher {}  (tier: {:?})",
        result.batter_id, result.pitcher_id, result.tier
    );
    if result.tier.is_degraded() {
        println!("warning: some components are served from stale or placeholder data");
    }
    let rows: [(&str, &MatchupComponent); 4] = [
        ("batter season", &result.batter_season),
        ("pitcher season", &result.pitcher_season),
        ("recent form", &result.recent_form),
        ("head-to-head", &result.head_to_head),
    ];
    for (label, component) in rows {
        println!(
            "  {label:<15} {:<11} fetched {}",
            format!("{:?}", component.tier),
            component.snapshot.fetched_at.to_rfc3339()
        );
    }
    let d = &result.derived;
    println!("  BABIP {}  wOBA {}  wRC+ {}  WAR {}", d.babip, d.woba, d.wrc_plus, d.batter_war);
    println!("  FIP {}  FIP- {}  WAR {}", d.fip, d.fip_minus, d.pitcher_war);
    println!("  recent OPS {}  OPS vs pitcher {}", d.recent_ops, d.head_to_head_ops);
}

fn load_config(explicit: Option<String>) -> BullpenConfig {
    let from_env = env::var("BULLPEN_CONFIG").ok();
    let path = explicit
        .or(from_env)
        .unwrap_or_else(|| "configs/dev.toml".into());
    match BullpenConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                BullpenConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            BullpenConfig::default()
        }
    }
}
