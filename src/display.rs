use std::io;

use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Constraint,
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Block, Borders, Cell, Row, Table},
    Frame, Terminal, TerminalOptions, Viewport,
};

use crate::types::{Candidate, DeadScoreIndex};

// ---------------------------------------------------------------------------
// Run summary table
// ---------------------------------------------------------------------------

const HEADERS: [&str; 5] = ["ID", "Symbol", "Dead", "24h", "Exchanges"];

/// Print the analysed candidates as a table below the log output.
pub fn print_summary(candidates: &[Candidate], dead_scores: &DeadScoreIndex) -> io::Result<()> {
    // borders + header
    let height = candidates.len() as u16 + 3;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(height),
        },
    )?;
    draw(&mut terminal, candidates, dead_scores)?;
    println!();
    Ok(())
}

fn draw<B: Backend>(
    terminal: &mut Terminal<B>,
    candidates: &[Candidate],
    dead_scores: &DeadScoreIndex,
) -> Result<(), B::Error> {
    terminal.draw(|f| render_summary(f, candidates, dead_scores))?;
    Ok(())
}

fn render_summary(f: &mut Frame, candidates: &[Candidate], dead_scores: &DeadScoreIndex) {
    let header_cells = HEADERS
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = candidates
        .iter()
        .map(|c| {
            let score = dead_scores.get(&c.record.id).copied();
            let score_color = score.map_or(Color::DarkGray, |s| {
                if s <= 3.0 {
                    Color::Green
                } else if s <= 7.0 {
                    Color::Yellow
                } else {
                    Color::Red
                }
            });

            Row::new(vec![
                Cell::from(c.record.id.clone()),
                Cell::from(c.record.symbol.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(score.map_or("-".to_string(), |s| s.to_string()))
                    .style(Style::default().fg(score_color)),
                Cell::from(format!("{}%", c.record.price_change_pct_24h))
                    .style(Style::default().fg(change_color(c.record.price_change_pct_24h))),
                Cell::from(c.exchanges.joined()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " DIVERS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, f.area());
}

/// White fading to red as the drop deepens.
fn change_color(change_pct: i64) -> Color {
    let fade = (255.0 + change_pct as f64 * 2.5).clamp(0.0, 255.0) as u8;
    Color::Rgb(255, fade, fade)
}
