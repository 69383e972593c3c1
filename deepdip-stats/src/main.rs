mod api;
mod cache;
mod config;
mod reports;
mod twitch;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use deepdip_core::{
    AttemptEvent, DayFilter, DayLabel, EventDetector, FallCounter, PlayerScan, ScanOptions,
    load_merged_history, stream_links,
};
use env_logger::{Env, Target};
use log::{error, info};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use api::DeepDipApi;
use cache::CacheDir;
use config::{StatsConfig, load_streamer_map};
use twitch::{TwitchClient, TwitchCredentials};

const DEFAULT_LOG_FILTER: &str = "info,deepdip_core=debug,deepdip_stats=debug";

#[derive(Debug, Parser)]
#[command(name = "deepdip-stats", version)]
#[command(about = "Derive Deep Dip floor attempts from player progress history")]
struct Args {
    /// Players to analyze (space or comma separated)
    #[arg(short, long, num_args = 1.., value_delimiter = ',')]
    players: Vec<String>,

    /// Look up stream recordings to flag on-stream attempts
    #[arg(long)]
    enable_twitch_url: bool,

    /// JSON configuration file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of saved API responses [default: cache]
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory receiving result.csv and aggregated.csv [default: result]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log file, truncated on every run [default: debug.log]
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Player to streamer mapping [default: tmuser_to_twitchuser.json]
    #[arg(long)]
    streamer_map: Option<PathBuf>,

    /// Skip days ordered before this label [default: "Day 26"]
    #[arg(long, conflicts_with = "all_days")]
    from_day: Option<String>,

    /// Scan every day, ignoring the configured starting day
    #[arg(long)]
    all_days: bool,

    /// Only scan these days (repeatable)
    #[arg(long = "day")]
    days: Vec<String>,

    /// Year the source timestamps belong to [default: current year]
    #[arg(long)]
    year: Option<i32>,

    /// Abort a player's scan on a malformed timestamp instead of skipping it
    #[arg(long)]
    strict_timestamps: bool,

    /// Use only the local cache, never the stats API
    #[arg(long)]
    offline: bool,

    /// Print a summary line per player
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    init_logging(&config.log_file)?;

    announce_banner();
    let start_time = Instant::now();

    let detector = EventDetector::new(config.floors.clone(), config.detector.clone())
        .context("invalid detector configuration")?;
    let options = scan_options(&config, &args);
    let streamers = load_streamers(&config)?;
    let mut twitch = connect_twitch(&config)?;
    let api = if args.offline {
        info!("Offline run, using the local cache only");
        None
    } else {
        Some(
            DeepDipApi::new(&config.api_url, request_timeout(&config))
                .context("failed to set up the stats API client")?,
        )
    };
    let cache = CacheDir::new(&config.cache_dir);

    let run = analyze_players(
        &config.players,
        &detector,
        &options,
        api.as_ref(),
        &cache,
        twitch.as_mut(),
        &streamers,
        args.verbose,
    );

    let (events_path, pivot_path) = reports::write_outputs(&config.output_dir, &run.events())?;
    reports::log_fall_counter(&run.falls);
    reports::print_run_summary(&run.scans, &run.failures, &run.falls, start_time.elapsed());
    println!();
    println!("📝 {}", events_path.display());
    println!("📝 {}", pivot_path.display());

    if run.scans.is_empty() {
        bail!("no player could be scanned");
    }
    Ok(())
}

fn announce_banner() {
    println!("{}", "🏔️  Deep Dip Attempt Stats".bright_cyan().bold());
    println!("{}", "==========================".cyan());
}

fn resolve_config(args: &Args) -> Result<StatsConfig> {
    let mut config = match &args.config {
        Some(path) => StatsConfig::from_path(path)?,
        None => StatsConfig::default(),
    };

    if !args.players.is_empty() {
        config.players = args
            .players
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(path) = &args.log_file {
        config.log_file = path.clone();
    }
    if let Some(path) = &args.streamer_map {
        config.streamer_map = path.clone();
    }
    if args.all_days {
        config.from_day = None;
    } else if let Some(day) = &args.from_day {
        config.from_day = Some(day.clone());
    }
    config.enable_twitch_url |= args.enable_twitch_url;
    config.strict_timestamps |= args.strict_timestamps;

    config.validate()?;
    Ok(config)
}

fn init_logging(path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {} {}",
                Local::now().format("%H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .try_init()
        .context("failed to initialize logging")?;
    Ok(())
}

fn scan_options(config: &StatsConfig, args: &Args) -> ScanOptions {
    let defaults = ScanOptions::default();
    ScanOptions {
        year: args.year.unwrap_or(defaults.year),
        strict_timestamps: config.strict_timestamps,
        days: DayFilter {
            from_day: config.from_day.as_deref().map(DayLabel::new),
            only_days: args.days.iter().map(|d| DayLabel::new(d)).collect(),
        },
    }
}

const fn request_timeout(config: &StatsConfig) -> Duration {
    Duration::from_secs(config.request_timeout_secs)
}

fn load_streamers(config: &StatsConfig) -> Result<BTreeMap<String, String>> {
    if !config.enable_twitch_url {
        return Ok(BTreeMap::new());
    }
    let streamers = load_streamer_map(&config.streamer_map)?;
    for player in &config.players {
        if !streamers.contains_key(player) {
            info!("{player} has no streamer mapping, attempts stay off stream");
        }
    }
    Ok(streamers)
}

fn connect_twitch(config: &StatsConfig) -> Result<Option<TwitchClient>> {
    if !config.enable_twitch_url {
        return Ok(None);
    }
    let credentials = TwitchCredentials::from_env()?;
    let client = TwitchClient::connect(credentials, &config.token_file, request_timeout(config))
        .context("failed to connect to the video platform")?;
    Ok(Some(client))
}

/// Outcome of a run over every configured player.
#[derive(Debug, Default)]
struct RunSummary {
    scans: Vec<PlayerScan>,
    failures: Vec<(String, String)>,
    falls: FallCounter,
}

impl RunSummary {
    fn events(&self) -> Vec<AttemptEvent> {
        self.scans
            .iter()
            .flat_map(|scan| scan.events.iter().cloned())
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze_players(
    players: &[String],
    detector: &EventDetector,
    options: &ScanOptions,
    api: Option<&DeepDipApi>,
    cache: &CacheDir,
    mut twitch: Option<&mut TwitchClient>,
    streamers: &BTreeMap<String, String>,
    verbose: bool,
) -> RunSummary {
    let mut run = RunSummary::default();
    if verbose {
        println!("{}", "🧗 Scanning players".bright_yellow().bold());
        println!("{}", "-".repeat(30).yellow());
    }

    for player in players {
        let streamer = streamers.get(player).map(String::as_str);
        match analyze_player(
            player,
            detector,
            options,
            api,
            cache,
            twitch.as_deref_mut(),
            streamer,
        ) {
            Ok(scan) => {
                info!(
                    "[{player}] {} events over {} days",
                    scan.events.len(),
                    scan.days_scanned
                );
                if verbose {
                    reports::print_player_summary(&scan);
                }
                run.falls.merge(&scan.falls);
                run.scans.push(scan);
            }
            Err(err) => {
                error!("[{player}] {err:#}");
                eprintln!("⚠️  Skipping {}: {err:#}", player.yellow());
                run.failures.push((player.clone(), format!("{err:#}")));
            }
        }
    }
    run
}

fn analyze_player(
    player: &str,
    detector: &EventDetector,
    options: &ScanOptions,
    api: Option<&DeepDipApi>,
    cache: &CacheDir,
    twitch: Option<&mut TwitchClient>,
    streamer: Option<&str>,
) -> Result<PlayerScan> {
    let history = load_merged_history(api, cache, player)
        .with_context(|| format!("failed to load history for {player}"))?;
    let scan = detector.scan_player(player, &history, options, stream_links(twitch, streamer))?;
    Ok(scan)
}
