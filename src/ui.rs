//! Terminal dashboard rendering.
//!
//! Owns the raw-mode alternate-screen lifecycle and draws the latest
//! [`TickUpdate`] on demand. The quit listener runs on a blocking thread so
//! a keypress can interrupt the refresh loop at any time; it watches the
//! sender side of the cancellation channel and exits on its own once the
//! refresh loop is gone.

use crate::error::Error;
use crate::surface::{DisplaySurface, TickUpdate};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Axis, BarChart, Block, Borders, Chart, Dataset, Gauge, List, ListItem, Paragraph,
};
use ratatui::{Frame, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Live dashboard bound to the process terminal.
pub struct Dashboard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    latest: TickUpdate,
}

impl Dashboard {
    /// Puts the terminal into raw alternate-screen mode.
    pub fn new() -> Result<Self, Error> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            latest: TickUpdate::placeholder(),
        })
    }

    /// Restores the terminal to its normal state.
    pub fn teardown(&mut self) -> Result<(), Error> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl DisplaySurface for Dashboard {
    fn update(&mut self, update: TickUpdate) {
        self.latest = update;
    }

    fn render(&mut self) -> Result<(), Error> {
        let Self { terminal, latest } = self;
        terminal.draw(|frame| draw_dashboard(frame, latest))?;
        Ok(())
    }
}

/// Watches the keyboard from a blocking thread and fires the cancellation
/// sender on q, Esc or Ctrl-C.
pub fn spawn_quit_listener(tx: oneshot::Sender<()>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || loop {
        // Receiver closed or dropped means the refresh loop already ended.
        if tx.is_closed() {
            return;
        }

        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                        || (key.code == KeyCode::Char('c')
                            && key.modifiers.contains(KeyModifiers::CONTROL));
                    if quit {
                        let _ = tx.send(());
                        return;
                    }
                }
            }
            Ok(false) => {}
            Err(_) => return,
        }
    })
}

fn draw_dashboard(frame: &mut Frame, update: &TickUpdate) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Min(8),
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], update);
    draw_gauges(frame, chunks[1], update);
    draw_meta(frame, chunks[2], update);
    draw_pools(frame, chunks[3], update);
    draw_pool_charts(frame, chunks[4], update);
}

fn draw_header(frame: &mut Frame, area: Rect, update: &TickUpdate) {
    let status = if update.waiting {
        "waiting for first poll...".to_string()
    } else if update.poll_offset_seconds > 0 {
        format!(
            "last data: {} ({}s behind)",
            update.captured_at, update.poll_offset_seconds
        )
    } else {
        format!("updated: {}", update.captured_at)
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("metriscope", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::raw(status),
        Span::raw("  (q to quit)"),
    ]))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(header, area);
}

/// The widget ratio is clamped to its valid range; the label keeps the true
/// percentage so an overloaded gauge still reads honestly.
fn percent_gauge(title: &str, percent: f64) -> Gauge<'_> {
    let ratio = if percent.is_finite() {
        (percent / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(format!("{percent:.1}%"))
}

fn draw_gauges(frame: &mut Frame, area: Rect, update: &TickUpdate) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(33),
            Constraint::Percentage(33),
            Constraint::Percentage(34),
        ])
        .split(area);

    frame.render_widget(
        percent_gauge("Storage", update.gauges.free_storage_percent),
        columns[0],
    );
    frame.render_widget(
        percent_gauge("Free heap", update.gauges.free_heap_percent),
        columns[1],
    );
    frame.render_widget(
        percent_gauge("DB connections", update.gauges.db_active_percent as f64),
        columns[2],
    );
}

fn draw_meta(frame: &mut Frame, area: Rect, update: &TickUpdate) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let gauges = &update.gauges;
    let meta = vec![
        Line::from(format!("CPU time: {}s", gauges.cpu_total_time_seconds)),
        Line::from(format!("Processors: {}", gauges.processors)),
        Line::from(format!(
            "Heap: {} free / {} total / {} max",
            format_bytes(gauges.heap_free_bytes),
            format_bytes(gauges.heap_total_bytes),
            format_bytes(gauges.heap_max_bytes),
        )),
        Line::from(format!(
            "Disk: {} free / {} total",
            format_bytes(gauges.disk_free_bytes),
            format_bytes(gauges.disk_total_bytes),
        )),
    ];
    frame.render_widget(
        Paragraph::new(meta).block(Block::default().borders(Borders::ALL).title("System")),
        columns[0],
    );

    let gc = &gauges.gc;
    let gc_lines = vec![
        Line::from(format!(
            "Last run: {}s {} {}",
            gc.duration_seconds, gc.kind, gc.status
        )),
        Line::from(format!("Binaries cleaned: {}", gc.binaries_cleaned)),
        Line::from(format!(
            "Space reclaimed: {}",
            format_bytes(gc.bytes_cleaned)
        )),
        Line::from(format!(
            "Current size: {}",
            format_bytes(gc.current_size_bytes)
        )),
    ];
    frame.render_widget(
        Paragraph::new(gc_lines)
            .block(Block::default().borders(Borders::ALL).title("Garbage collection")),
        columns[1],
    );
}

fn draw_pools(frame: &mut Frame, area: Rect, update: &TickUpdate) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let totals = update.gauges.pool_totals;
    let bars = [
        ("Leased", totals.leased.max(0) as u64),
        ("Pending", totals.pending.max(0) as u64),
        ("Max", totals.max.max(0) as u64),
        ("Avail", totals.available.max(0) as u64),
    ];
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title("Connection totals"))
        .data(&bars)
        .bar_width(7)
        .bar_style(Style::default().fg(Color::Green))
        .value_style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(chart, columns[0]);

    let items: Vec<ListItem> = update
        .gauges
        .pool_rows
        .iter()
        .map(|row| ListItem::new(row.display.clone()))
        .collect();
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(update.gauges.pool_totals.display()),
    );
    frame.render_widget(list, columns[1]);
}

fn draw_pool_charts(frame: &mut Frame, area: Rect, update: &TickUpdate) {
    let palette = [
        Color::Cyan,
        Color::Yellow,
        Color::Green,
        Color::Magenta,
        Color::Blue,
        Color::Red,
    ];

    let datasets: Vec<Dataset> = update
        .pool_charts
        .iter()
        .enumerate()
        .map(|(i, (name, points))| {
            Dataset::default()
                .name(name.as_str())
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(palette[i % palette.len()]))
                .data(points)
        })
        .collect();

    let max_y = update
        .pool_charts
        .iter()
        .flat_map(|(_, points)| points.iter().map(|(_, y)| *y))
        .fold(0.0_f64, f64::max)
        .max(10.0);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Leased connections, last 60s"),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, 59.0])
                .labels(["0", "30", "59"]),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, max_y])
                .labels(["0".to_string(), format!("{max_y:.0}")]),
        );

    frame.render_widget(chart, area);
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
