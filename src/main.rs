use std::io;
use std::panic;
use std::sync::mpsc as std_mpsc;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use log::info;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc as tokio_mpsc;

use mesh_console::tui::app::App;
use mesh_console::tui::event::{AppEvent, EventHandler};
use mesh_console::tui::message::{RadioCommand, RadioEvent};
use mesh_console::tui::radio_task;
use mesh_console::tui::ui;
use mesh_console::{ConnectionManager, InboundQueue, SerialConnector};
use mesh_link::LinkConfig;

fn main() {
    // The TUI owns stdout; redirect stderr to keep log output, e.g.
    // `RUST_LOG=debug mesh-console 2>console.log`.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let inbound = InboundQueue::new();
        let manager = ConnectionManager::new(SerialConnector::new(LinkConfig::default()), inbound.clone());

        // Create channels.
        // TUI → Radio: std::sync::mpsc (radio thread is blocking).
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        // Radio → TUI: tokio unbounded (async-compatible).
        let (radio_event_tx, radio_event_rx) = tokio_mpsc::unbounded_channel::<RadioEvent>();

        // Spawn blocking radio task.
        let radio = tokio::task::spawn_blocking(move || {
            radio_task::radio_loop(manager, cmd_rx, radio_event_tx);
        });

        // Run the TUI.
        let result = run_tui(cmd_tx, radio_event_rx, inbound).await;

        // Wait for the radio task to close the port.
        if let Err(e) = radio.await {
            eprintln!("radio task failed: {e}");
        }
        if let Err(e) = result {
            eprintln!("TUI error: {e}");
            std::process::exit(1);
        }
    });
    info!("exiting");
}

async fn run_tui(
    cmd_tx: std_mpsc::Sender<RadioCommand>,
    radio_event_rx: tokio_mpsc::UnboundedReceiver<RadioEvent>,
    inbound: InboundQueue,
) -> io::Result<()> {
    // Setup terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Install panic hook to restore terminal on panic.
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(info);
    }));

    let mut app = App::new(cmd_tx, inbound);
    let mut events = EventHandler::new(radio_event_rx);

    // Main event loop.
    let result = loop {
        if let Err(e) = terminal.draw(|frame| ui::draw(frame, &app)) {
            break Err(e);
        }

        match events.next().await {
            Some(AppEvent::Key(key)) => {
                // crossterm 0.28 sends both Press and Release on some platforms.
                if key.kind == crossterm::event::KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
            Some(AppEvent::Radio(radio_event)) => app.handle_radio_event(radio_event),
            Some(AppEvent::Tick) => app.on_tick(),
            Some(AppEvent::Resize(_, _)) => {
                // Terminal auto-resizes on next draw.
            }
            None => break Ok(()),
        }

        if app.should_quit {
            break Ok(());
        }
    };

    // Restore terminal.
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}
