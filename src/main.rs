//! Oche terminal scorer: line-oriented score entry wired to local persistence and, when
//! configured, the remote match API.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oche::{
    AppConfig, MatchController, ScoreOutcome, SharedController,
    dao::{kv_store::FileStore, local::LocalPersistence},
    remote::MatchApi,
    state::game::{MatchSetup, MatchState, MatchStatus, Side},
};

const HELP: &str = "\
commands:
  <score>               enter a visit score (0-180) for the active cell
  edit <round> <p|o>    select a cell to correct
  darts <1-3>           darts used for the checkout
  leg                   start the next leg
  pause | resume        halt or continue entry
  stats [leg]           server-side statistics
  end                   complete the match
  exit                  leave the match and clear saved state
  quit                  leave the scorer, keeping saved state";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = FileStore::open(&config.storage_dir).context("opening match storage")?;
    let persistence = LocalPersistence::new(Arc::new(store));
    let session_id = persistence
        .get_or_create_session_id()
        .context("reading session id")?;

    let controller = MatchController::new(
        config.context(session_id),
        persistence,
        remote_api(&config),
    );

    let state = match controller.restore().await {
        Ok(Some(state)) if state.match_status == MatchStatus::Setup => {
            controller.start_match().await?
        }
        Ok(Some(state)) => state,
        Ok(None) => start_from_args(&controller, &config).await?,
        Err(err) => {
            warn!(error = %err, "could not restore saved match; starting a new one");
            start_from_args(&controller, &config).await?
        }
    };
    print_state(&state);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match handle_line(&controller, line.trim()).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => println!("error: {err:#}"),
        }
        if let Some(state) = controller.snapshot().await {
            print_state(&state);
        }
    }

    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

async fn handle_line(controller: &MatchController, line: &str) -> anyhow::Result<Flow> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Flow::Continue);
    };

    if let Ok(score) = command.parse::<u32>() {
        match controller.enter_score(score).await? {
            ScoreOutcome::Ignored => println!("entry ignored"),
            ScoreOutcome::Failed(err) => println!("saved locally; server write failed: {err}"),
            ScoreOutcome::LocalOnly | ScoreOutcome::Reconciled(_) | ScoreOutcome::Superseded => {}
        }
        return Ok(Flow::Continue);
    }

    match command {
        "edit" => {
            let round: usize = words
                .next()
                .context("missing round number")?
                .parse()
                .context("round must be a number")?;
            let side = match words.next() {
                Some("p") => Side::Player,
                Some("o") => Side::Opponent,
                _ => bail!("side must be `p` or `o`"),
            };
            let index = round.checked_sub(1).context("rounds start at 1")?;
            if !controller.handle_cell_click(index, side).await? {
                println!("cell cannot be edited now");
            }
        }
        "darts" => {
            let darts: u8 = words
                .next()
                .context("missing dart count")?
                .parse()
                .context("dart count must be a number")?;
            controller.record_checkout_darts(darts).await?;
        }
        "leg" => {
            controller.start_new_leg().await?;
        }
        "pause" => {
            controller.pause_match().await?;
        }
        "resume" => {
            controller.resume_match().await?;
        }
        "stats" => {
            let leg = words.next().map(str::parse::<u32>).transpose()?;
            let stats = controller.fetch_stats(leg).await?;
            if stats.is_empty() {
                println!("no statistics available");
            }
            for entry in stats {
                println!(
                    "{:?}: avg {:.2}, darts {}, high {}, 180s {}, checkout {:.1}%",
                    entry.player,
                    entry.three_dart_average,
                    entry.darts_thrown,
                    entry.highest_score,
                    entry.one_eighties,
                    entry.checkout_percentage()
                );
            }
        }
        "end" => {
            controller.complete_match().await?;
        }
        "exit" => {
            controller.exit_match().await;
            return Ok(Flow::Quit);
        }
        "quit" => return Ok(Flow::Quit),
        "help" => println!("{HELP}"),
        other => bail!("unknown command `{other}`"),
    }

    Ok(Flow::Continue)
}

/// Set up and start a match from `oche <player> <opponent> [starting score]`.
async fn start_from_args(
    controller: &SharedController,
    config: &AppConfig,
) -> anyhow::Result<MatchState> {
    let mut args = env::args().skip(1);
    let player = args.next().unwrap_or_else(|| "Player".into());
    let opponent = args.next().unwrap_or_else(|| "Opponent".into());
    let starting_score = match args.next() {
        Some(value) => value.parse().context("starting score must be a number")?,
        None => config.default_starting_score,
    };

    controller
        .setup_match(MatchSetup::new(player, opponent, starting_score))
        .await?;
    let state = controller.start_match().await?;
    info!(match_id = ?state.match_id, has_lock = state.has_lock, "match ready");
    Ok(state)
}

#[cfg(feature = "http-api")]
fn remote_api(app: &AppConfig) -> Option<Arc<dyn MatchApi>> {
    use std::time::Duration;

    use oche::remote::http::{ApiConfig, HttpMatchApi};

    let mut config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            info!(reason = %err, "remote API not configured; scoring locally");
            return None;
        }
    };
    if let Some(ms) = app.remote_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    match HttpMatchApi::new(config) {
        Ok(api) => Some(Arc::new(api)),
        Err(err) => {
            warn!(error = %err, "failed to build API client; scoring locally");
            None
        }
    }
}

#[cfg(not(feature = "http-api"))]
fn remote_api(_app: &AppConfig) -> Option<Arc<dyn MatchApi>> {
    None
}

fn print_state(state: &MatchState) {
    let setup = &state.setup;
    println!();
    println!(
        "{} {} - {} {}   leg {}{}",
        setup.player_name,
        state.player_legs,
        state.opponent_legs,
        setup.opponent_name,
        state.current_leg,
        if state.is_local_only() { "  (local)" } else { "" },
    );
    let (active_index, active_side) = state.active_cell();
    for (index, round) in state.rounds.iter().enumerate() {
        let cell = |side: Side| {
            let marker = if !state.leg_finished && index == active_index && side == active_side {
                '>'
            } else {
                ' '
            };
            let scored = round
                .scored(side)
                .map(|score| score.to_string())
                .unwrap_or_else(|| "-".into());
            format!("{marker}{scored:>4} {:>4}", round.to_go(side))
        };
        println!("{:>3} |{} |{}", round.round, cell(Side::Player), cell(Side::Opponent));
    }
    if state.leg_finished {
        match state.winner {
            Some(side) => println!("leg won by {}", setup.name_of(side)),
            None => println!("leg drawn at the round limit"),
        }
    }
    match state.match_status {
        MatchStatus::Paused => println!("match paused"),
        MatchStatus::Completed => println!("match completed"),
        MatchStatus::Setup | MatchStatus::InProgress => {}
    }
}

/// Configure tracing subscribers; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
