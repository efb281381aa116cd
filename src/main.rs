use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{
    io::{Stdout, stdout},
    sync::Arc,
    time::Instant,
};
use tokio::time;

use clap::Parser;
use eyre::Result;
use tracing::info;

use ethfee_dash::api::{FeeApiClient, Fetch};
use ethfee_dash::app::App;
use ethfee_dash::config::{Args, Config, EVENTS_PATH, FRAME_PERIOD, GAS_PATH};
use ethfee_dash::countdown::Countdown;
use ethfee_dash::logger::init_logger;
use ethfee_dash::model::{EventsSnapshot, GasSnapshot};
use ethfee_dash::poller::PollHandle;
use ethfee_dash::ui::Dashboard;

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_logger(&config.log_file)?;

    println!("Starting ethfee dashboard...");
    println!("API: {}", config.api_base);
    println!("Logs: {}", config.log_file.display());
    println!("Press 'q' to quit");

    info!(
        api = %config.api_base,
        interval_ms = config.refresh_interval.as_millis() as u64,
        countdown = ?config.countdown_mode,
        "dashboard starting"
    );

    let fetcher: Arc<dyn Fetch> = Arc::new(FeeApiClient::new(config.api_base.clone()));
    // Handles abort their schedules and in-flight fetches when dropped.
    let gas = PollHandle::<GasSnapshot>::spawn(fetcher.clone(), GAS_PATH, config.refresh_interval);
    let events =
        PollHandle::<EventsSnapshot>::spawn(fetcher, EVENTS_PATH, config.refresh_interval);

    let countdown = Countdown::new(
        config.countdown_mode,
        config.refresh_interval,
        chrono::Utc::now(),
    );
    let mut app = App::new(
        gas.subscribe(),
        events.subscribe(),
        countdown,
        config.api_base.clone(),
    );

    let mut terminal = setup_terminal()?;
    let outcome = run(&mut terminal, &mut app).await;
    cleanup_terminal(&mut terminal)?;

    gas.stop();
    events.stop();
    info!("dashboard stopped");
    println!("Goodbye!");
    outcome
}

async fn run(terminal: &mut CrosstermTerminal, app: &mut App) -> Result<()> {
    let dashboard = Dashboard::new();

    loop {
        app.sync(Instant::now(), chrono::Utc::now());
        terminal.draw(|frame| dashboard.render(frame, app))?;

        if event::poll(std::time::Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        _ => {}
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }

        time::sleep(FRAME_PERIOD).await;
    }
}

fn setup_terminal() -> Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn cleanup_terminal(terminal: &mut CrosstermTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
