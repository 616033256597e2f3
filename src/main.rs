pub mod app_dirs;
pub mod config;
pub mod game;
pub mod runtime;
pub mod store;
pub mod ui;
pub mod util;

use crate::{
    config::{Config, ConfigStore, FileConfigStore},
    game::{GameSession, SaveBest},
    runtime::{EventSource, FixedTicker, GameEvent, Runner, Ticker},
    store::{BestTimeStore, Persister},
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    time::{Duration, Instant},
};

const TICK_RATE_MS: u64 = 33;

/// minimal reaction-time tui with persistent personal bests
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Wait for the green GO!, hit Space as fast as you can, and chase your personal best. Best times persist across sessions."
)]
pub struct Cli {
    /// minimum random delay before the screen arms, in milliseconds
    #[clap(long)]
    min_delay_ms: Option<u64>,

    /// maximum random delay before the screen arms, in milliseconds
    #[clap(long)]
    max_delay_ms: Option<u64>,

    /// reaction window before a round counts as too slow, in milliseconds
    #[clap(long)]
    reaction_timeout_ms: Option<u64>,

    /// how long the too-early penalty screen is held, in milliseconds
    #[clap(long)]
    penalty_ms: Option<u64>,

    /// how long the result screen is held, in milliseconds
    #[clap(long)]
    result_ms: Option<u64>,

    /// skip the sqlite backend and persist bests to the plain JSON store
    #[clap(long)]
    plain_store: bool,
}

impl Cli {
    /// Layer CLI overrides on top of the loaded config.
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(ms) = self.min_delay_ms {
            cfg.min_delay_ms = ms;
        }
        if let Some(ms) = self.max_delay_ms {
            cfg.max_delay_ms = ms;
        }
        if let Some(ms) = self.reaction_timeout_ms {
            cfg.reaction_timeout_ms = ms;
        }
        if let Some(ms) = self.penalty_ms {
            cfg.penalty_duration_ms = ms;
        }
        if let Some(ms) = self.result_ms {
            cfg.result_duration_ms = ms;
        }
        cfg
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config = cli.apply(FileConfigStore::new().load());
    let mut session = GameSession::new(config.timing());

    let (tx, event_source) = runtime::event_channel();
    runtime::spawn_input_reader(tx.clone());
    let persister = Persister::spawn(
        BestTimeStore::new(store::open_default(cli.plain_store)),
        tx,
    );
    let runner = Runner::new(
        event_source,
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_game(&mut terminal, &runner, &mut session, &persister);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // flush any queued best-time writes before exiting
    persister.shutdown();

    result
}

/// Drive the session until a quit key arrives. The runner is the single
/// thread of control: triggers, timer ticks and the hydration result are
/// handled strictly one at a time.
fn run_game<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    runner: &Runner<E, T>,
    session: &mut GameSession,
    persister: &Persister,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| f.render_widget(&*session, f.area()))?;

        match runner.step() {
            GameEvent::Tick => {
                session.on_tick(Instant::now());
            }
            GameEvent::Resize => {}
            GameEvent::BestLoaded(best) => {
                if let Some(SaveBest(ms)) = session.absorb_loaded_best(best) {
                    persister.save(ms);
                }
            }
            GameEvent::Key(key) => {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                match key.code {
                    KeyCode::Esc | KeyCode::Char('q') => break,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                    KeyCode::Char(' ') | KeyCode::Enter => {
                        if let Some(SaveBest(ms)) = session.on_trigger(Instant::now()) {
                            persister.save(ms);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
