use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ev_board::breakdown::{match_breakdown, stat_lines, stat_market_lines};
use ev_board::config::{Config, ConfigOverrides};
use ev_board::criteria::{FilterCriteria, MarketFilter, SortField, SortOrder};
use ev_board::output::csv::{leagues_to_csv, matches_to_csv, opportunities_to_csv};
use ev_board::output::format::{format_ev, summary_line, to_rows, OpportunityRow, EMPTY_STATE};
use ev_board::output::json::{render_json, render_json_line};
use ev_board::output::table::{
    render_breakdown_table, render_h2h_table, render_health_table, render_leagues_table,
    render_match_header, render_matches_table, render_odds_table, render_opportunities_table,
    render_stats_table,
};
use ev_board::poller::{spawn_poller, PollUpdate, PollerConfig};
use ev_board::preferences::{PreferenceStore, Preferences, SqlitePreferenceStore};
use ev_board::provider::{
    ApiClient, CacheTtl, CachedProvider, DataProvider, FetchState, DEFAULT_UPCOMING_LIMIT,
};
use ev_board::ranking::rank;
use ev_board::server::{run_server, ApiState};
use ev_board::types::{EntityId, MatchModel, MatchSummary, Opportunity};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "ev-board",
    about = "Football expected-value opportunities from the terminal"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long = "api-base")]
    api_base: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone, Default)]
struct CriteriaArgs {
    #[arg(long)]
    market: Option<String>,
    #[arg(long = "min-ev")]
    min_ev: Option<f64>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    order: Option<String>,
}

impl CriteriaArgs {
    fn is_empty(&self) -> bool {
        self.market.is_none() && self.min_ev.is_none() && self.sort.is_none() && self.order.is_none()
    }

    fn parsed(&self) -> Result<ParsedCriteria> {
        let min_ev = match self.min_ev {
            Some(value) if !value.is_finite() => bail!("--min-ev must be a finite number"),
            other => other,
        };
        Ok(ParsedCriteria {
            market: self.market.as_deref().map(MarketFilter::from_str).transpose()?,
            min_ev,
            sort: self.sort.as_deref().map(SortField::from_str).transpose()?,
            order: self.order.as_deref().map(SortOrder::from_str).transpose()?,
        })
    }
}

struct ParsedCriteria {
    market: Option<MarketFilter>,
    min_ev: Option<f64>,
    sort: Option<SortField>,
    order: Option<SortOrder>,
}

impl ParsedCriteria {
    fn overlay(&self, base: &FilterCriteria) -> FilterCriteria {
        FilterCriteria {
            selected_market: self
                .market
                .clone()
                .unwrap_or_else(|| base.selected_market.clone()),
            min_ev_percent: self.min_ev.unwrap_or(base.min_ev_percent),
            sort_by: self.sort.unwrap_or(base.sort_by),
            sort_order: self.order.unwrap_or(base.sort_order),
        }
    }

    fn save<S: PreferenceStore>(&self, prefs: &mut Preferences<S>) -> Result<()> {
        if let Some(market) = &self.market {
            prefs.set_market(market.clone())?;
        }
        if let Some(min_ev) = self.min_ev {
            let kept = prefs.set_min_ev(min_ev)?;
            if kept != min_ev {
                warn!("minimum EV {min_ev} stored as {kept}");
            }
        }
        if self.sort.is_some() || self.order.is_some() {
            let current = prefs.criteria().clone();
            prefs.set_sorting(
                self.sort.unwrap_or(current.sort_by),
                self.order.unwrap_or(current.sort_order),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Leagues {
        #[arg(long)]
        favorites: bool,
    },
    Matches {
        league: String,
        #[arg(long, default_value_t = DEFAULT_UPCOMING_LIMIT)]
        limit: usize,
    },
    Match {
        id: String,
    },
    Odds {
        id: String,
    },
    H2h {
        id: String,
    },
    Opportunities {
        id: String,
        #[command(flatten)]
        criteria: CriteriaArgs,
        #[arg(long)]
        save: bool,
    },
    Watch {
        id: String,
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        iterations: Option<u64>,
        #[command(flatten)]
        criteria: CriteriaArgs,
    },
    Filters {
        #[command(flatten)]
        criteria: CriteriaArgs,
        #[arg(long)]
        reset: bool,
    },
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    Health,
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Subcommand)]
enum FavoritesAction {
    Add { league: String },
    Remove { league: String },
    Toggle { league: String },
    List,
}

#[derive(Debug, Serialize)]
struct OpportunitiesView<'a> {
    match_id: &'a EntityId,
    criteria: &'a FilterCriteria,
    summary: String,
    opportunities: Vec<OpportunityRow>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let mut overrides = ConfigOverrides::from_env();
    if let Some(api_base) = &cli.api_base {
        overrides.api_base = Some(api_base.clone());
    }
    config.apply_overrides(overrides);

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }

    let client = ApiClient::new(&config.api)?;
    let provider = CachedProvider::new(client.clone(), CacheTtl::from(&config.cache));

    match &cli.command {
        Commands::Leagues { favorites } => {
            let prefs = open_preferences(&config)?;
            let mut leagues = provider.fetch_leagues().await?;
            if *favorites {
                leagues.retain(|league| prefs.is_favorite(&league.league_id));
            }
            match cli.output {
                OutputFormat::Table => {
                    println!("{}", render_leagues_table(&leagues, prefs.favorites()))
                }
                OutputFormat::Json => println!("{}", render_json(&leagues)?),
                OutputFormat::Csv => print!("{}", leagues_to_csv(&leagues, prefs.favorites())?),
            }
        }
        Commands::Matches { league, limit } => {
            let league_id = parse_id(league)?;
            let matches = provider
                .fetch_upcoming_matches(&league_id, (*limit).max(1))
                .await?;
            match cli.output {
                OutputFormat::Table if matches.is_empty() => {
                    println!("No upcoming matches for league {league_id}.")
                }
                OutputFormat::Table => println!("{}", render_matches_table(&matches)),
                OutputFormat::Json => println!("{}", render_json(&matches)?),
                OutputFormat::Csv => print!("{}", matches_to_csv(&matches)?),
            }
        }
        Commands::Match { id } => {
            let match_id = parse_id(id)?;
            let summary = provider.fetch_match_summary(&match_id).await?;
            let model = FetchState::from_result(provider.fetch_match_model(&match_id).await);
            print_match(&summary, &model, cli.output)?;
        }
        Commands::Odds { id } => {
            let odds = provider.fetch_match_odds(&parse_id(id)?).await?;
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(&odds)?),
                OutputFormat::Table => println!("{}", render_odds_table(&odds)),
                OutputFormat::Csv => {
                    warn!("CSV output for odds not implemented, using JSON");
                    println!("{}", render_json(&odds)?);
                }
            }
        }
        Commands::H2h { id } => {
            let h2h = provider.fetch_match_h2h(&parse_id(id)?).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_h2h_table(&h2h)),
                OutputFormat::Json | OutputFormat::Csv => println!("{}", render_json(&h2h)?),
            }
        }
        Commands::Opportunities { id, criteria, save } => {
            let match_id = parse_id(id)?;
            let parsed = criteria.parsed()?;
            let mut prefs = open_preferences(&config)?;
            let effective = if *save {
                parsed.save(&mut prefs)?;
                prefs.criteria().clone()
            } else {
                parsed.overlay(prefs.criteria())
            };
            let state = FetchState::from_result(provider.fetch_opportunities(&match_id).await);
            let fetched = match state {
                FetchState::Ready(fetched) => fetched,
                other => bail!(other
                    .status_message()
                    .unwrap_or_else(|| "no data".to_string())),
            };
            print_opportunities(&match_id, &fetched, &effective, cli.output)?;
        }
        Commands::Watch {
            id,
            interval_secs,
            iterations,
            criteria,
        } => {
            let match_id = parse_id(id)?;
            let prefs = open_preferences(&config)?;
            let effective = criteria.parsed()?.overlay(prefs.criteria());
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.polling.interval_secs).max(1));
            run_watch(Arc::new(client), match_id, interval, *iterations, effective, cli.output)
                .await?;
        }
        Commands::Filters { criteria, reset } => {
            let mut prefs = open_preferences(&config)?;
            if *reset {
                prefs.reset_filters()?;
                info!("filters reset to defaults");
            }
            if !criteria.is_empty() {
                criteria.parsed()?.save(&mut prefs)?;
            }
            print_criteria(prefs.criteria(), cli.output)?;
        }
        Commands::Favorites { action } => {
            let mut prefs = open_preferences(&config)?;
            match action {
                FavoritesAction::Add { league } => {
                    if !prefs.add_favorite(&parse_id(league)?)? {
                        println!("League {league} is already a favorite");
                    }
                }
                FavoritesAction::Remove { league } => {
                    if !prefs.remove_favorite(&parse_id(league)?)? {
                        println!("League {league} was not a favorite");
                    }
                }
                FavoritesAction::Toggle { league } => {
                    let now = prefs.toggle_favorite(&parse_id(league)?)?;
                    println!(
                        "League {league} {}",
                        if now { "added to favorites" } else { "removed from favorites" }
                    );
                }
                FavoritesAction::List => {}
            }
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(prefs.favorites())?),
                _ => {
                    if prefs.favorites().is_empty() {
                        println!("No favorite leagues yet.");
                    }
                    for league in prefs.favorites() {
                        println!("★ {league}");
                    }
                }
            }
        }
        Commands::Health => {
            let health = provider.fetch_health().await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_health_table(&health)),
                _ => println!("{}", render_json(&health)?),
            }
            if !health.ok {
                bail!("backend at {} reports unhealthy", client.base_url());
            }
        }
        Commands::Serve { host, port } => {
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            let store: Box<dyn PreferenceStore> =
                Box::new(SqlitePreferenceStore::open(&config.resolved_db_path())?);
            let prefs = Preferences::load(store, config.default_min_ev())?;
            let state = ApiState::new(Arc::new(provider), Arc::new(Mutex::new(prefs)));
            return run_server(state, addr).await;
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn open_preferences(config: &Config) -> Result<Preferences<SqlitePreferenceStore>> {
    let store = SqlitePreferenceStore::open(&config.resolved_db_path())?;
    Preferences::load(store, config.default_min_ev())
}

fn parse_id(raw: &str) -> Result<EntityId> {
    let id = EntityId::from(raw);
    if id.is_empty() {
        bail!("identifier must not be empty");
    }
    Ok(id)
}

fn print_opportunities(
    match_id: &EntityId,
    fetched: &[Opportunity],
    criteria: &FilterCriteria,
    output: OutputFormat,
) -> Result<()> {
    let ranked = rank(fetched, criteria);
    match output {
        OutputFormat::Table => {
            println!("{}", summary_line(ranked.len(), criteria));
            if ranked.is_empty() {
                println!("{EMPTY_STATE}");
            } else {
                println!("{}", render_opportunities_table(&ranked));
            }
        }
        OutputFormat::Json => {
            let view = OpportunitiesView {
                match_id,
                criteria,
                summary: summary_line(ranked.len(), criteria),
                opportunities: to_rows(&ranked),
            };
            println!("{}", render_json(&view)?);
        }
        OutputFormat::Csv => print!("{}", opportunities_to_csv(&ranked)?),
    }
    Ok(())
}

fn print_match(
    summary: &MatchSummary,
    model: &FetchState<MatchModel>,
    output: OutputFormat,
) -> Result<()> {
    let markets = model.ready().map(|m| &m.markets);
    match output {
        OutputFormat::Table => {
            println!("{}", render_match_header(summary));
            if let Some(message) = model.status_message() {
                println!("{message}");
            }
            if let Some(metadata) = markets.and_then(|m| m.metadata.as_ref()) {
                println!("{}", render_breakdown_table(&match_breakdown(metadata)));
            }
            if let Some(predictions) = markets.and_then(|m| m.stats_predictions.as_ref()) {
                println!("{}", render_stats_table(predictions));
            }
        }
        OutputFormat::Json | OutputFormat::Csv => {
            let value = serde_json::json!({
                "summary": summary,
                "breakdown": markets
                    .and_then(|m| m.metadata.as_ref())
                    .map(match_breakdown),
                "stats": markets
                    .and_then(|m| m.stats_predictions.as_ref())
                    .map(|p| serde_json::json!({
                        "lines": stat_lines(p),
                        "markets": stat_market_lines(p),
                    })),
                "model": model,
            });
            println!("{}", render_json(&value)?);
        }
    }
    Ok(())
}

fn print_criteria(criteria: &FilterCriteria, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", render_json(criteria)?),
        _ => println!(
            "market={} min_ev={}% sort={} order={}",
            criteria.selected_market.label(),
            criteria.min_ev_percent,
            criteria.sort_by,
            criteria.sort_order
        ),
    }
    Ok(())
}

fn print_update(update: &PollUpdate, criteria: &FilterCriteria, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", render_json_line(update)?),
        _ => {
            println!(
                "[{}] refresh #{}",
                update.fetched_at.format("%H:%M:%S"),
                update.iteration
            );
            match &update.state {
                FetchState::Ready(ranked) => {
                    let refs: Vec<&Opportunity> = ranked.iter().collect();
                    println!("{}", summary_line(refs.len(), criteria));
                    if let Some(best) = refs.first() {
                        println!(
                            "Top: {} {} @ {:.2} ({})",
                            best.market,
                            best.outcome,
                            best.bookmaker_odds,
                            format_ev(best.ev_percent)
                        );
                    }
                    if refs.is_empty() {
                        println!("{EMPTY_STATE}");
                    } else if matches!(output, OutputFormat::Csv) {
                        print!("{}", opportunities_to_csv(&refs)?);
                    } else {
                        println!("{}", render_opportunities_table(&refs));
                    }
                }
                other => {
                    if let Some(message) = other.status_message() {
                        println!("{message}");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_watch(
    provider: Arc<dyn DataProvider>,
    match_id: EntityId,
    interval: Duration,
    iterations: Option<u64>,
    criteria: FilterCriteria,
    output: OutputFormat,
) -> Result<()> {
    let (handle, mut updates) = spawn_poller(
        provider,
        match_id,
        PollerConfig {
            interval,
            criteria: criteria.clone(),
            max_iterations: iterations,
        },
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };
                print_update(&update, &criteria, output)?;
            }
        }
    }
    handle.stop().await;
    Ok(())
}
