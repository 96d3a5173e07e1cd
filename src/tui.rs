use crate::analysis::{self, AnalysisReport, ComparisonAnalysis, SingleAnalysis};
use crate::comfy_table::{NO_DATA, format_pct, format_price};
use crate::request::TickerRequest;
use crate::storage_utils::AppConfig;
use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    text::Line,
    widgets::{
        Axis, BarChart, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row,
        Table,
    },
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

// --- Views ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    CloseWithAverages,
    DailyReturns,
    Volume,
    Candles,
    Kpis,
    CloseComparison,
    ReturnsComparison,
}

impl View {
    fn title(&self) -> &'static str {
        match self {
            View::CloseWithAverages => "Close & Moving Averages",
            View::DailyReturns => "Daily Return %",
            View::Volume => "Trading Volume",
            View::Candles => "Candles (OHLC)",
            View::Kpis => "KPIs",
            View::CloseComparison => "Closing Price Comparison",
            View::ReturnsComparison => "Daily Returns Comparison",
        }
    }

    fn for_report(report: &AnalysisReport) -> Vec<View> {
        match report {
            AnalysisReport::Empty => Vec::new(),
            AnalysisReport::Single(_) => vec![
                View::CloseWithAverages,
                View::DailyReturns,
                View::Volume,
                View::Candles,
                View::Kpis,
            ],
            AnalysisReport::Comparison(_) => {
                vec![View::CloseComparison, View::ReturnsComparison]
            }
        }
    }
}

const LINE_COLORS: &[Color] = &[Color::Cyan, Color::Yellow, Color::Magenta, Color::Green];

// --- App State ---

struct App {
    request: TickerRequest,
    config: AppConfig,
    report: AnalysisReport,
    is_refreshing: bool,
    last_error: Option<String>,
    views: Vec<View>,
    selected_view_index: usize,
}

impl App {
    fn new(request: TickerRequest, config: AppConfig, report: AnalysisReport) -> Self {
        let views = View::for_report(&report);
        Self {
            request,
            config,
            report,
            is_refreshing: false,
            last_error: None,
            views,
            selected_view_index: 0,
        }
    }

    fn set_report(&mut self, report: AnalysisReport) {
        self.views = View::for_report(&report);
        self.selected_view_index = self
            .selected_view_index
            .min(self.views.len().saturating_sub(1));
        self.report = report;
        self.last_error = None;
        self.is_refreshing = false;
    }

    fn selected_view(&self) -> Option<View> {
        self.views.get(self.selected_view_index).copied()
    }
}

// --- TUI ---

pub async fn run_tui(request: TickerRequest, config: AppConfig, report: AnalysisReport) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, App::new(request, config, report)).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (data_tx, mut data_rx) = mpsc::channel::<Result<AnalysisReport>>(1);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(result) = data_rx.try_recv() {
            match result {
                Ok(report) => app.set_report(report),
                Err(e) => {
                    warn!(error = %e, "refresh failed");
                    app.last_error = Some(e.to_string());
                    app.is_refreshing = false;
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            // Resize needs no handling: the next draw picks up the new size.
            if let Event::Key(key) = event::read()? {
                if !handle_key_event(key, &mut app, &data_tx) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `false` when the user asked to quit.
fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<Result<AnalysisReport>>) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) if !app.is_refreshing => {
            app.is_refreshing = true;
            let tx_clone = tx.clone();
            let request = app.request.clone();
            let config = app.config.clone();
            tokio::spawn(async move {
                let result = analysis::run_analysis_pipeline(&request, &config).await;
                let _ = tx_clone.send(result).await;
            });
        }
        KeyCode::Up => {
            if !app.views.is_empty() {
                app.selected_view_index = app
                    .selected_view_index
                    .checked_sub(1)
                    .unwrap_or(app.views.len() - 1);
            }
        }
        KeyCode::Down => {
            if !app.views.is_empty() {
                app.selected_view_index = (app.selected_view_index + 1) % app.views.len();
            }
        }
        KeyCode::Char(c) => {
            if let Some(digit) = c.to_digit(10) {
                if digit > 0 && digit as usize <= app.views.len() {
                    app.selected_view_index = (digit - 1) as usize;
                }
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(f.size());
    let right_chunks =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);

    // Render the sidebar
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Views")
        .title_alignment(Alignment::Center);
    let inner_sidebar_area = sidebar_block.inner(main_layout[0]);
    f.render_widget(sidebar_block, main_layout[0]);

    let sidebar_chunks = Layout::vertical([
        Constraint::Min(1),    // For the view list
        Constraint::Length(1), // For the "F5 refetches data" instruction
    ])
    .split(inner_sidebar_area);

    let view_lines: Vec<Line> = app
        .views
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let mut line = Line::from(format!("{} {}", i + 1, view.title()));
            if i == app.selected_view_index {
                line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
            }
            line
        })
        .collect();
    f.render_widget(Paragraph::new(view_lines), sidebar_chunks[0]);
    f.render_widget(
        Paragraph::new("F5 refetches data").alignment(Alignment::Center),
        sidebar_chunks[1],
    );

    let header = match &app.last_error {
        Some(err) => Paragraph::new(format!("Refresh failed: {}", err))
            .style(Style::default().fg(Color::Red)),
        None => Paragraph::new(format!(
            "{}  {} to {}",
            app.request.tickers().join(" vs "),
            app.request.start(),
            app.request.end()
        )),
    };
    f.render_widget(
        header.block(
            Block::default()
                .borders(Borders::ALL)
                .title("Stock Market Analyzer")
                .title_alignment(Alignment::Center),
        ),
        right_chunks[0],
    );

    let body = right_chunks[1];
    match (&app.report, app.selected_view()) {
        (AnalysisReport::Single(single), Some(view)) => render_single(f, body, single, view),
        (AnalysisReport::Comparison(cmp), Some(view)) => render_comparison(f, body, cmp, view),
        _ => f.render_widget(
            Paragraph::new(NO_DATA)
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL)),
            body,
        ),
    }

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Fetching prices and rerunning analysis...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_single(f: &mut Frame, area: Rect, single: &SingleAnalysis, view: View) {
    let dates = single.table.dates();
    let column = |key: &str| single.table.column(key).unwrap_or_default();

    match view {
        View::CloseWithAverages => {
            let lines = [
                (single.columns.close.as_str(), column(&single.columns.close)),
                (single.short_ma.name.as_str(), single.short_ma.values.as_slice()),
                (single.long_ma.name.as_str(), single.long_ma.values.as_slice()),
            ];
            let title = format!("{} Closing Price with Moving Averages", single.ticker);
            render_line_chart(f, area, &title, dates, &lines);
        }
        View::DailyReturns => {
            let lines = [(single.returns.name.as_str(), single.returns.values.as_slice())];
            let title = format!("{} Daily Return %", single.ticker);
            render_line_chart(f, area, &title, dates, &lines);
        }
        View::Volume => {
            let title = format!("{} Trading Volume", single.ticker);
            render_volume(f, area, &title, column(&single.columns.volume));
        }
        View::Candles => render_candles(f, area, single),
        View::Kpis => render_kpis(f, area, single),
        View::CloseComparison | View::ReturnsComparison => {}
    }
}

fn render_comparison(f: &mut Frame, area: Rect, cmp: &ComparisonAnalysis, view: View) {
    let dates = cmp.table.dates();
    let [a, b] = &cmp.tickers;

    match view {
        View::CloseComparison => {
            let lines: Vec<(&str, &[Option<f64>])> = cmp
                .close_columns
                .iter()
                .map(|key| (key.as_str(), cmp.table.column(key).unwrap_or_default()))
                .collect();
            let title = format!("Closing Price Comparison: {} vs {}", a, b);
            render_line_chart(f, area, &title, dates, &lines);
        }
        View::ReturnsComparison => {
            let lines = [
                (
                    cmp.comparison.returns_a.name.as_str(),
                    cmp.comparison.returns_a.values.as_slice(),
                ),
                (
                    cmp.comparison.returns_b.name.as_str(),
                    cmp.comparison.returns_b.values.as_slice(),
                ),
            ];
            render_line_chart(f, area, "Daily Returns (%) Comparison", dates, &lines);
        }
        _ => {}
    }
}

/// `(index, value)` pairs for the defined points only.
fn chart_points(values: &[Option<f64>]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect()
}

fn y_bounds(series: &[Vec<(f64, f64)>]) -> [f64; 2] {
    let (min, max) = series
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    if !min.is_finite() {
        return [0.0, 1.0];
    }
    let padding = ((max - min) * 0.1).max(max.abs() * 0.01).max(0.01);
    [min - padding, max + padding]
}

fn date_labels(dates: &[NaiveDate]) -> Vec<Span<'static>> {
    match (dates.first(), dates.get(dates.len() / 2), dates.last()) {
        (Some(first), Some(mid), Some(last)) => [first, mid, last]
            .iter()
            .map(|d| Span::raw(d.format("%Y-%m-%d").to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn render_line_chart(
    f: &mut Frame,
    area: Rect,
    title: &str,
    dates: &[NaiveDate],
    lines: &[(&str, &[Option<f64>])],
) {
    let points: Vec<Vec<(f64, f64)>> = lines.iter().map(|(_, v)| chart_points(v)).collect();
    let [y_min, y_max] = y_bounds(&points);

    let datasets: Vec<Dataset> = lines
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(i, ((name, _), data))| {
            Dataset::default()
                .name(name.to_string())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(LINE_COLORS[i % LINE_COLORS.len()]))
                .data(data)
        })
        .collect();

    let y_labels = vec![
        Span::raw(format!("{:.2}", y_min)),
        Span::raw(format!("{:.2}", (y_min + y_max) / 2.0)),
        Span::raw(format!("{:.2}", y_max)),
    ];
    let x_max = dates.len().saturating_sub(1) as f64;

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Date")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max.max(1.0)])
                .labels(date_labels(dates)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );

    f.render_widget(chart, area);
}

fn render_volume(f: &mut Frame, area: Rect, title: &str, volume: &[Option<f64>]) {
    // one column per session; keep the most recent ones that fit
    let fits = area.width.saturating_sub(2) as usize;
    let start = volume.len().saturating_sub(fits);
    let bars: Vec<(&str, u64)> = volume[start..]
        .iter()
        .map(|v| ("", v.map_or(0, |v| v.max(0.0) as u64)))
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL),
        )
        .bar_width(1)
        .bar_gap(0)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Cyan))
        .data(bars.as_slice());

    f.render_widget(chart, area);
}

fn render_candles(f: &mut Frame, area: Rect, single: &SingleAnalysis) {
    let c = &single.columns;
    let keys = [&c.open, &c.high, &c.low, &c.close];
    let columns: Vec<&[Option<f64>]> = keys
        .iter()
        .map(|k| single.table.column(k).unwrap_or_default())
        .collect();

    let header = Row::new(["Date", "Open", "High", "Low", "Close"].map(Cell::from))
        .style(Style::default().bg(Color::DarkGray));

    let visible = area.height.saturating_sub(3) as usize;
    let start = single.table.len().saturating_sub(visible);

    let rows = single.table.dates()[start..]
        .iter()
        .enumerate()
        .rev()
        .map(|(offset, date)| {
            let row = start + offset;
            let open = columns[0].get(row).copied().flatten();
            let close = columns[3].get(row).copied().flatten();
            let color = match (open, close) {
                (Some(o), Some(c)) if c >= o => Color::Green,
                (Some(_), Some(_)) => Color::Red,
                _ => Color::DarkGray,
            };

            let mut cells = vec![Cell::from(date.format("%Y-%m-%d").to_string())
                .style(Style::default().fg(Color::DarkGray))];
            cells.extend(columns.iter().map(|col| {
                Cell::from(format_price(col.get(row).copied().flatten()))
                    .style(Style::default().fg(color))
            }));
            Row::new(cells).height(1)
        });

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Length(12),
                Constraint::Percentage(22),
                Constraint::Percentage(22),
                Constraint::Percentage(22),
                Constraint::Percentage(22),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} Candles (newest first)", single.ticker)),
        ),
        area,
    );
}

fn render_kpis(f: &mut Frame, area: Rect, single: &SingleAnalysis) {
    let lines: Vec<Line> = single
        .kpis
        .entries()
        .into_iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let text = if i < 3 {
                format_price(value)
            } else {
                format_pct(value)
            };
            Line::from(vec![
                Span::styled(format!("{:<26}", label), Style::default().fg(Color::Cyan)),
                Span::styled(text, Style::default().fg(Color::Green)),
            ])
        })
        .collect();

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} Key Performance Indicators", single.ticker)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_utils::AnalysisConfig;
    use crate::table::PriceTable;
    use chrono::Duration as Days;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    fn table(suffix: &str, closes: &[f64]) -> PriceTable {
        let dates = (0..closes.len()).map(|i| start() + Days::days(i as i64)).collect();
        let values: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
        let mut table = PriceTable::new(dates).unwrap();
        for field in ["Open", "High", "Low", "Close", "Volume"] {
            let key = if suffix.is_empty() {
                field.to_string()
            } else {
                format!("{}_{}", field, suffix)
            };
            table.insert_column(key, values.clone()).unwrap();
        }
        table
    }

    fn app(secondary: Option<&str>) -> App {
        let request =
            TickerRequest::new("AAPL", secondary, start(), start() + Days::days(90)).unwrap();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let data = match secondary {
            None => table("", &closes),
            Some(t) => table("AAPL", &closes).outer_join(&table(t, &closes)).unwrap(),
        };
        let report = analysis::analyze(&request, &data, &AnalysisConfig::default()).unwrap();
        App::new(request, AppConfig::default(), report)
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        let (tx, _rx) = mpsc::channel(1);
        handle_key_event(KeyEvent::new(code, KeyModifiers::NONE), app, &tx)
    }

    #[test]
    fn test_every_single_view_renders() {
        let mut app = app(None);
        assert_eq!(app.views.len(), 5);
        for i in 0..app.views.len() {
            app.selected_view_index = i;
            let text = screen(&app);
            assert!(text.contains("Stock Market Analyzer"));
            assert!(text.contains("AAPL"));
        }
    }

    #[test]
    fn test_comparison_views_render() {
        let mut app = app(Some("MSFT"));
        assert_eq!(app.views, vec![View::CloseComparison, View::ReturnsComparison]);
        app.selected_view_index = 1;
        let text = screen(&app);
        assert!(text.contains("Daily Returns (%) Comparison"));
    }

    #[test]
    fn test_empty_report_shows_no_data() {
        let request = TickerRequest::new("AAPL", None, start(), start()).unwrap();
        let app = App::new(request, AppConfig::default(), AnalysisReport::Empty);
        assert!(screen(&app).contains("No data found"));
    }

    #[test]
    fn test_key_navigation() {
        let mut app = app(None);
        assert!(press(&mut app, KeyCode::Up));
        assert_eq!(app.selected_view_index, 4);
        assert!(press(&mut app, KeyCode::Down));
        assert_eq!(app.selected_view_index, 0);
        assert!(press(&mut app, KeyCode::Char('3')));
        assert_eq!(app.selected_view(), Some(View::Volume));
        assert!(press(&mut app, KeyCode::Char('9')));
        assert_eq!(app.selected_view(), Some(View::Volume));
        assert!(!press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn test_y_bounds_pad_range() {
        let [lo, hi] = y_bounds(&[vec![(0.0, 10.0), (1.0, 20.0)]]);
        assert!(lo < 10.0 && hi > 20.0);
        assert_eq!(y_bounds(&[]), [0.0, 1.0]);
    }
}
