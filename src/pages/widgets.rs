use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph, Wrap};

use super::{Notice, NoticeKind};
use crate::form::Form;

/// Rows taken by one field: a bordered input and an error line.
const FIELD_HEIGHT: u16 = 4;

/// Rows [`render_form`] needs for `form`.
pub fn form_height(form: &Form) -> u16 {
    let fields = u16::try_from(form.schema().fields().len()).unwrap_or(u16::MAX);
    fields.saturating_mul(FIELD_HEIGHT).saturating_add(1)
}

/// Draws every field of `form` with its visible error, then the submit line.
///
/// `active` is whether keyboard focus is inside the form; only then is the
/// focused field highlighted. While `pending` the submit line shows progress
/// instead of the key hint.
pub fn render_form(
    frame: &mut Frame<'_>,
    area: Rect,
    form: &Form,
    active: bool,
    submit_label: &str,
    pending: bool,
) {
    let fields = form.schema().fields();
    let mut constraints: Vec<Constraint> = fields
        .iter()
        .flat_map(|_| [Constraint::Length(3), Constraint::Length(1)])
        .collect();
    constraints.push(Constraint::Length(1));
    let rows = Layout::vertical(constraints).split(area);

    for (index, field) in fields.iter().enumerate() {
        let value = form.value(field.name());
        let shown = if field.is_secret() {
            "*".repeat(value.chars().count())
        } else {
            value.to_string()
        };

        let focused = active && form.focus_index() == index;
        let border = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let input = Paragraph::new(shown).block(
            Block::bordered()
                .title(field.label())
                .border_style(border),
        );
        frame.render_widget(input, rows[index * 2]);

        if let Some(error) = form.visible_error(field.name()) {
            let error = Paragraph::new(error).style(Style::default().fg(Color::Red));
            frame.render_widget(error, rows[index * 2 + 1]);
        }
    }

    let submit = if pending {
        Line::from("Submitting...").style(Style::default().add_modifier(Modifier::DIM))
    } else {
        Line::from(format!("[Enter] {submit_label}"))
    };
    frame.render_widget(Paragraph::new(submit), rows[fields.len() * 2]);
}

pub fn render_notice(frame: &mut Frame<'_>, area: Rect, notice: &Notice) {
    let color = match notice.kind {
        NoticeKind::Success => Color::Green,
        NoticeKind::Error => Color::Red,
    };
    let paragraph = Paragraph::new(notice.text.as_str())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true })
        .block(Block::bordered().title("Notice (any key to dismiss)"));
    frame.render_widget(paragraph, area);
}

/// A bordered one-line status such as a loading indicator.
pub fn render_status(frame: &mut Frame<'_>, area: Rect, title: &str, text: &str, color: Color) {
    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::bordered().title(title.to_string()));
    frame.render_widget(paragraph, area);
}
