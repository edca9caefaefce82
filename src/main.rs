use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use heartwatch::format::format_time;
use heartwatch::{
    events, ui, App, ClientSettings, ClientSource, Overrides, Role, ServerSettings, ServerSource,
    StatusSource,
};
use heartwatch_sdk::{Client, Server};

#[derive(Parser, Debug)]
#[command(name = "heartwatch")]
#[command(about = "Track which client programs are alive from a central server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registry server
    Server(CommonArgs),
    /// Run a heartbeat client
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server hostname
    #[arg(long)]
    hostname: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Tick interval in milliseconds
    #[arg(short, long)]
    tick_ms: Option<u64>,

    /// Log file, or "-" for stderr
    #[arg(long)]
    log_file: Option<String>,

    /// Log one status line per tick instead of drawing the terminal UI
    #[arg(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Name to register under
    #[arg(short, long)]
    name: Option<String>,

    /// Retry the connection on every tick that finds it down
    #[arg(long)]
    reconnect: bool,
}

impl CommonArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            hostname: self.hostname.clone(),
            port: self.port,
            tick_interval_ms: self.tick_ms,
            log_file: self.log_file.clone(),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => run_server(args),
        Command::Client(args) => run_client(args),
    }
}

fn run_server(args: CommonArgs) -> Result<()> {
    let settings = ServerSettings::load(args.config.as_deref(), &args.overrides())?;
    init_logging(settings.log_path())?;
    info!("heartwatch server starting");

    let rt = Runtime::new()?;
    let server = rt
        .block_on(
            Server::builder()
                .hostname(settings.hostname.clone())
                .port(settings.port)
                .tick_interval(settings.tick_interval())
                .probe_timeout(settings.probe_timeout())
                .bind(),
        )
        .with_context(|| format!("Failed to listen on {}:{}", settings.hostname, settings.port))?;

    let source = ServerSource::new(server.handle());
    let result = if args.headless {
        rt.block_on(run_headless(source, settings.tick_interval()))
    } else {
        run_tui(Box::new(source), settings.tick_interval(), || String::new())
    };

    rt.block_on(server.shutdown());
    result
}

fn run_client(args: ClientArgs) -> Result<()> {
    let overrides = Overrides {
        name: args.name.clone(),
        reconnect: args.reconnect.then_some(true),
        ..args.common.overrides()
    };
    let settings = ClientSettings::load(args.common.config.as_deref(), &overrides)?;
    init_logging(settings.log_path())?;
    info!(client = %settings.name, "heartwatch client starting");

    let rt = Runtime::new()?;
    let client = rt.block_on(
        Client::builder(settings.name.clone())
            .hostname(settings.hostname.clone())
            .port(settings.port)
            .tick_interval(settings.tick_interval())
            .probe_timeout(settings.probe_timeout())
            .connect_timeout(settings.connect_timeout())
            .reconnect(settings.reconnect)
            .start(),
    );

    let source = ClientSource::new(client.heartbeat().clone(), &settings.server_address());
    let result = if args.common.headless {
        rt.block_on(run_headless(source, settings.tick_interval()))
    } else {
        run_tui(Box::new(source), settings.tick_interval(), || {
            rt.block_on(client.reconnect());
            format!("Reconnect: {}", client.heartbeat().status())
        })
    };

    rt.block_on(client.shutdown());
    result
}

/// Install the tracing subscriber. Logs go to a file unless `path` is `None`.
fn init_logging(path: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

/// Log one status line per tick until interrupted
async fn run_headless<S: StatusSource>(mut source: S, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let view = source.poll();
                match view.role {
                    Role::Server => {
                        info!(
                            registered = view.clients().count(),
                            "{} up since {}",
                            source.description(),
                            view.rows.first().map(|r| format_time(r.start_time)).unwrap_or_default(),
                        );
                        for row in view.clients() {
                            debug!(
                                client = %row.name,
                                state = row.status_label(),
                                "last updated {}",
                                format_time(row.last_time)
                            );
                        }
                    }
                    Role::Client => {
                        if let Some(row) = view.rows.first() {
                            info!(client = %row.name, state = row.status_label(), "{}", source.description());
                        }
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

/// Run the TUI until the user quits.
///
/// `on_reconnect` runs on the UI thread when the user asks for a reconnect
/// and returns the status message to show.
fn run_tui<F>(source: Box<dyn StatusSource>, refresh_interval: Duration, on_reconnect: F) -> Result<()>
where
    F: FnMut() -> String,
{
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    let mut app = App::new(source);
    app.reload_data();

    let result = run_app(&mut terminal, &mut app, refresh_interval, on_reconnect);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app<F>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    refresh_interval: Duration,
    mut on_reconnect: F,
) -> Result<()>
where
    F: FnMut() -> String,
{
    let mut last_refresh = Instant::now();

    // Minimum terminal size for usable display
    const MIN_WIDTH: u16 = 50;
    const MIN_HEIGHT: u16 = 8;

    while app.running {
        terminal.draw(|frame| {
            let area = frame.area();

            if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
                let msg = format!(
                    "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
                    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
                );
                let paragraph = ratatui::widgets::Paragraph::new(msg)
                    .alignment(ratatui::layout::Alignment::Center)
                    .style(ratatui::style::Style::default().fg(ratatui::style::Color::Yellow));
                let centered = ratatui::layout::Rect::new(
                    0,
                    (area.height / 2).saturating_sub(2),
                    area.width,
                    5.min(area.height),
                );
                frame.render_widget(paragraph, centered);
                return;
            }

            ui::draw(frame, app);
        })?;

        // Poll for events with a short timeout
        if let Some(event) = events::poll_event(Duration::from_millis(100))? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Mouse(mouse) => events::handle_mouse_event(app, mouse),
                _ => {}
            }
        }

        if app.take_reconnect_request() {
            let message = on_reconnect();
            app.set_status_message(message);
            app.reload_data();
        }

        // Redraw on the tick interval
        if last_refresh.elapsed() >= refresh_interval {
            app.reload_data();
            last_refresh = Instant::now();
        }
    }

    Ok(())
}
