use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Paragraph, Widget},
};

use crate::game::{GameSession, GameState};
use crate::util::format_best;

const VERTICAL_MARGIN: u16 = 2;

impl Widget for &GameSession {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let fields = self.display();

        let accent = if fields.highlight {
            Color::Green
        } else if self.state() == GameState::Penalty {
            Color::Red
        } else {
            Color::Gray
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let status_style = bold.fg(accent);
        let readout_style = bold.fg(accent).add_modifier(Modifier::REVERSED);
        let dim_italic = Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints(
                [
                    Constraint::Min(0),
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Min(0),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(area);

        Paragraph::new(Span::styled(fields.status, status_style))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        // the readout only carries the reversed block style while armed or
        // showing a scored result, so the "go" moment reads as a color flip
        let readout_style = if fields.highlight {
            readout_style
        } else {
            status_style
        };
        Paragraph::new(Span::styled(fields.readout, readout_style))
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        Paragraph::new(Span::styled(format_best(self.best_ms()), dim_italic))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);

        Paragraph::new(Span::styled("(space) trigger / (esc) quit", dim_italic))
            .alignment(Alignment::Center)
            .render(chunks[6], buf);
    }
}
