use chrono::{DateTime, Local, Utc};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
};

use crate::app::{App, GasField, Status};
use crate::delta::Classification;
use crate::model::{GasSnapshot, ThresholdState, Tier, Timestamp, fmt_gwei};

const ACCENT: Color = Color::Cyan;

pub struct Dashboard;

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, frame: &mut Frame, app: &App) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // status
                Constraint::Length(7), // gas table
                Constraint::Length(6), // block / base fee
                Constraint::Min(5),    // events
                Constraint::Length(3), // help
            ])
            .split(frame.area());

        self.render_status(frame, chunks[0], app);
        self.render_gas_table(frame, chunks[1], app);
        self.render_gas_details(frame, chunks[2], app);
        self.render_events(frame, chunks[3], app);
        self.render_help(frame, chunks[4], app);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, app: &App) {
        let state = match app.status() {
            Status::Refreshing => Span::styled("Refreshing...", Style::default().fg(Color::Yellow)),
            Status::Error(err) => Span::styled(
                format!("Error loading data ({})", err),
                Style::default().fg(Color::Red),
            ),
            Status::NextRefresh(secs) => Span::styled(
                format!("Next refresh in {}s", secs),
                Style::default().fg(Color::Green),
            ),
        };

        let content = vec![Line::from(vec![
            state,
            Span::raw(" | API: "),
            Span::styled(&app.api_base, Style::default().fg(ACCENT)),
        ])];
        let paragraph = Paragraph::new(content)
            .block(Block::default().title("ethfee.info").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_gas_table(&self, frame: &mut Frame, area: Rect, app: &App) {
        let block = Block::default()
            .title("Ethereum Gas Fees")
            .borders(Borders::ALL);

        let Some(gas) = app.gas() else {
            let waiting = Paragraph::new(Line::from(Span::styled(
                "(waiting for first snapshot)",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block);
            frame.render_widget(waiting, area);
            return;
        };

        let header = Row::new(vec!["Type", "Gas (Gwei)", "ETH Tx ($)", "USDT Tx ($)"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = Tier::ALL
            .iter()
            .map(|&tier| {
                Row::new(vec![
                    Cell::from(Span::styled(
                        tier.label(),
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                    Cell::from(flash_span(gas.gwei(tier), app.flash(tier.into()))),
                    Cell::from(fmt_usd(gas.eth_transfer_cost(tier))),
                    Cell::from(fmt_usd(gas.usdt_transfer_cost(tier))),
                ])
            })
            .collect();

        let widths = [
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ];
        let table = Table::new(rows, widths).header(header).block(block);
        frame.render_widget(table, area);
    }

    fn render_gas_details(&self, frame: &mut Frame, area: Rect, app: &App) {
        let mut lines: Vec<Line> = Vec::new();
        if let Some(gas) = app.gas() {
            lines.push(Line::from(vec![
                Span::raw("Base fee: "),
                flash_span(gas.base_fee_gwei, app.flash(GasField::BaseFee)),
                Span::raw(" Gwei  |  Block #"),
                Span::styled(gas.last_block.to_string(), Style::default().fg(Color::Green)),
            ]));
            lines.push(Line::from(vec![
                Span::raw("Updated: "),
                local_time_span(&gas.last_updated),
            ]));
            lines.push(price_line(gas));
        } else {
            lines.push(Line::from(Span::styled(
                "N/A",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Block").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_events(&self, frame: &mut Frame, area: Rect, app: &App) {
        let mut lines: Vec<Line> = Vec::new();
        if let Some(snapshot) = app.events() {
            for event in &snapshot.events {
                let (arrow, style) = match event.state {
                    ThresholdState::Above => ("▲", Style::default().fg(Color::Red)),
                    ThresholdState::Below => ("▼", Style::default().fg(Color::Green)),
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("{} ", arrow), style),
                    Span::styled(
                        format!("{} {} Gwei", event.state.label(), event.threshold_gwei),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    local_time_span(&event.changed_at),
                ]));
            }
        }

        if lines.is_empty() {
            lines.push(Line::from(Span::styled(
                "(no events yet)",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title("Threshold Events").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect, app: &App) {
        let max = app.countdown().max_secs();
        let help = Line::from(vec![
            Span::raw("Press "),
            Span::styled("'q'", Style::default().fg(Color::Yellow)),
            Span::raw(" to quit  |  Updates every "),
            Span::styled(format!("{} seconds", max), Style::default().fg(ACCENT)),
        ]);
        let paragraph =
            Paragraph::new(help).block(Block::default().title("Help").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }
}

/// Number colored by its most recent movement: red up, green down.
fn flash_span(value: f64, change: Classification) -> Span<'static> {
    let style = match change {
        Classification::Up => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Classification::Down => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        Classification::None => Style::default().fg(ACCENT),
    };
    Span::styled(format!("{:.4}", value), style)
}

fn fmt_usd(v: Option<f64>) -> String {
    format!("${:.4}", v.unwrap_or(0.0))
}

fn price_line(gas: &GasSnapshot) -> Line<'static> {
    let Some(price) = gas.eth_price_usd else {
        return Line::from(Span::styled(
            "ETH price: N/A",
            Style::default().fg(Color::DarkGray),
        ));
    };
    let mut spans = vec![
        Span::raw("ETH price: "),
        Span::styled(format!("${:.2}", price), Style::default().fg(Color::Yellow)),
    ];
    if let Some(eth) = gas.eth_transfer_usd {
        spans.push(Span::raw(format!("  |  Base ETH Tx: ${:.4}", eth)));
    }
    if let Some(usdt) = gas.usdt_transfer_usd {
        spans.push(Span::raw(format!("  |  Base USDT Tx: ${:.4}", usdt)));
    }
    spans.push(Span::styled(
        format!("  ({} Gwei base)", fmt_gwei(gas.base_fee_gwei)),
        Style::default().fg(Color::Gray),
    ));
    Line::from(spans)
}

fn local_time_span(ts: &Timestamp) -> Span<'static> {
    match ts {
        Ok(dt) => Span::styled(local_time(dt), Style::default().fg(Color::Yellow)),
        Err(err) => Span::styled(format!("({})", err), Style::default().fg(Color::Red)),
    }
}

/// 24h wall-clock time in the local timezone.
pub fn local_time(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%H:%M:%S").to_string()
}
