use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, info, warn};

use crate::app::{AppState, UiAction};
use crate::config::{ShellConfig, Theme};
use crate::runner::{self, OutputEvent, OutputStream};
use crate::ui::draw_ui;

/// How long to wait for terminal input before checking for command output.
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Where the loop reads keys and resizes from.
trait EventSource {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;
    fn read(&mut self) -> io::Result<Event>;
}

struct CrosstermEvents;

impl EventSource for CrosstermEvents {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        event::poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        event::read()
    }
}

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

enum LoopEvent {
    Terminal(Event),
    Output(OutputEvent),
}

pub fn run_tui(app: &mut AppState, theme: &Theme, shell: &ShellConfig) -> Result<()> {
    let mut terminal = init_terminal()?;
    let result = run_loop(&mut terminal, app, theme, shell);
    app.shutdown();

    match result {
        Ok(()) => restore_terminal(&mut terminal),
        Err(err) => {
            let _ = restore_terminal(&mut terminal);
            Err(err)
        }
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed to create terminal")
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")
}

fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut AppState,
    theme: &Theme,
    shell: &ShellConfig,
) -> Result<()> {
    let mut events = CrosstermEvents;
    loop {
        let mut output_rows = 0;
        terminal.draw(|frame| output_rows = draw_ui(frame, app, theme))?;
        app.set_output_rows(output_rows);

        match next_event(app.output_stream(), &mut events)? {
            LoopEvent::Output(output) => app.on_output(output),
            // Layout is recomputed from the new size on the next draw.
            LoopEvent::Terminal(Event::Resize(width, height)) => {
                debug!(width, height, "terminal resized");
            }
            LoopEvent::Terminal(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                match app.on_key(key) {
                    UiAction::None => {}
                    UiAction::Quit => {
                        info!("quit requested");
                        return Ok(());
                    }
                    UiAction::Execute(command_line) => {
                        let stream = runner::start(&command_line, shell);
                        app.attach_stream(stream);
                    }
                    UiAction::Copy(text) => app.on_copy_result(copy_to_clipboard(text)),
                }
            }
            LoopEvent::Terminal(_) => {}
        }
    }
}

/// Waits for the next key, resize or command output event.
///
/// Blocks on terminal input alone when nothing is running. While a command
/// runs, pending input is always taken before the next output line, so a
/// command that never stops writing cannot lock out the keyboard.
fn next_event(
    stream: Option<&OutputStream>,
    events: &mut impl EventSource,
) -> Result<LoopEvent> {
    let Some(stream) = stream else {
        return Ok(LoopEvent::Terminal(events.read()?));
    };

    loop {
        if events.poll(Duration::ZERO)? {
            return Ok(LoopEvent::Terminal(events.read()?));
        }
        if let Some(output) = stream.try_recv() {
            return Ok(LoopEvent::Output(output));
        }
        if events.poll(OUTPUT_POLL_INTERVAL)? {
            return Ok(LoopEvent::Terminal(events.read()?));
        }
    }
}

fn copy_to_clipboard(text: String) -> Result<(), String> {
    let mut clipboard = arboard::Clipboard::new().map_err(|err| err.to_string())?;

    #[cfg(target_os = "linux")]
    {
        use arboard::SetExtLinux;
        // X11 and Wayland serve the selection from the owning process, so the
        // clipboard has to stay alive until a manager takes it over.
        std::thread::spawn(move || {
            if let Err(err) = clipboard.set().wait().text(text) {
                warn!(error = %err, "clipboard copy failed");
            }
        });
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        clipboard.set_text(text).map_err(|err| {
            warn!(error = %err, "clipboard copy failed");
            err.to_string()
        })
    }
}
