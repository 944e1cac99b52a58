//! Rendering of the interactive session
//!
//! Pure function of [`Session`]: header with firewall status and clock, the
//! annotated rule table, a status line, the key footer, and whichever popup
//! the current [`Mode`] calls for.

use super::forms::{FormField, RuleForm};
use super::{ConfirmKind, Mode, Session, StatusLevel};
use crate::core::rule::FirewallStatus;
use crate::utils::truncate_string;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
};
use strum::IntoEnumIterator;

/// Smallest terminal the layout fits in
pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 15;

const FOOTER_KEYS: &str = "↑/↓|A:Add|D:Del|ENT:Edit|R:Reload|Q:Quit";
const FOOTER_PANIC: &str = "Shift+P: Panic Mode!!";
const NOTE_COLUMN_CHARS: usize = 43;
const LABEL_WIDTH: usize = 11;

pub fn render(session: &Session, frame: &mut Frame) {
    let area = frame.area();
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        render_too_small(frame, area);
        return;
    }

    let [header, body, status, footer] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(session, frame, header);
    render_rules(session, frame, body);
    render_status(session, frame, status);
    render_footer(frame, footer);

    match &session.mode {
        Mode::Listing => {}
        Mode::Form(form) => render_form(form, frame),
        Mode::Confirm(ConfirmKind::Delete { position }) => {
            render_delete_confirm(session, *position, frame);
        }
        Mode::Confirm(ConfirmKind::Panic) => render_panic(frame),
    }
}

fn render_too_small(frame: &mut Frame, area: Rect) {
    let text = vec![
        Line::from("Terminal too small").bold(),
        Line::from(format!(
            "{}x{} (need {MIN_WIDTH}x{MIN_HEIGHT})",
            area.width, area.height
        )),
    ];
    let [centered] = Layout::vertical([Constraint::Length(2)])
        .flex(Flex::Center)
        .areas(area);
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), centered);
}

fn render_header(session: &Session, frame: &mut Frame, area: Rect) {
    let (status_text, status_color) = match session.snapshot.status {
        FirewallStatus::Active => ("active", Color::Green),
        FirewallStatus::Inactive => ("inactive", Color::Red),
        FirewallStatus::Unknown => ("unknown", Color::Yellow),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let left = Line::from(vec![
        Span::from(" ufwm ").bold().fg(Color::Cyan),
        Span::from("│ Firewall: "),
        Span::from(status_text).bold().fg(status_color),
        Span::from(format!(" │ Rules: {}", session.snapshot.rule_count)),
    ]);
    let clock = chrono::Local::now().format("%Y-%m-%d %H:%M:%S ").to_string();

    let [left_area, clock_area] =
        Layout::horizontal([Constraint::Fill(1), Constraint::Length(clock.len() as u16)])
            .areas(inner);
    frame.render_widget(Paragraph::new(left), left_area);
    frame.render_widget(Paragraph::new(clock), clock_area);
}

fn render_rules(session: &Session, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Rules ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Thick)
        .border_style(Style::default().fg(Color::Green));

    if session.snapshot.rules.is_empty() {
        let message = if session.mutations_enabled {
            "No rules. Press A to add one."
        } else {
            "No rules."
        };
        let [centered] = Layout::vertical([Constraint::Length(1)])
            .flex(Flex::Center)
            .areas(block.inner(area));
        frame.render_widget(block, area);
        frame.render_widget(
            Paragraph::new(message).alignment(Alignment::Center).dim(),
            centered,
        );
        return;
    }

    let widths = [
        Constraint::Length(4),
        Constraint::Length(16),
        Constraint::Length(10),
        Constraint::Length(22),
        Constraint::Length(18),
        Constraint::Fill(1),
    ];

    let rows = session.snapshot.rules.iter().map(|annotated| {
        let rule = &annotated.rule;
        let action_color = match rule.spec.action {
            crate::core::rule::Action::Allow => Color::Green,
            crate::core::rule::Action::Limit => Color::Yellow,
            _ => Color::Red,
        };
        // Fall back to the ufw comment when the rule has no note
        let note = if annotated.note.is_empty() {
            Cell::from(rule.comment.clone().unwrap_or_default()).dim()
        } else {
            Cell::from(truncate_string(&annotated.note, NOTE_COLUMN_CHARS))
        };
        Row::new(vec![
            Cell::from(rule.position.to_string()),
            Cell::from(rule.port_display()),
            Cell::from(rule.action_display()).fg(action_color),
            Cell::from(rule.endpoint_display()),
            Cell::from(annotated.service.clone()).fg(Color::Cyan),
            note,
        ])
    });

    let header = Row::new(vec!["#", "TO", "ACTION", "FROM/TO", "SERVICE", "NOTE"])
        .style(Style::new().bold())
        .bottom_margin(1);

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(2)
        .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED))
        .block(block);

    let mut state = TableState::default().with_selected(Some(session.selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_status(session: &Session, frame: &mut Frame, area: Rect) {
    let line = if let Some(busy) = &session.busy {
        Line::from(format!(" {busy}")).fg(Color::Yellow).bold()
    } else if let Some(status) = &session.status {
        let color = match status.level {
            StatusLevel::Info => Color::Green,
            StatusLevel::Warning => Color::Yellow,
            StatusLevel::Error => Color::Red,
        };
        Line::from(format!(" {}", status.text)).fg(color)
    } else if !session.mutations_enabled {
        Line::from(" ufw unavailable - read only").fg(Color::Red)
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let [keys, panic] = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(FOOTER_PANIC.chars().count() as u16 + 1),
    ])
    .areas(area);
    frame.render_widget(Paragraph::new(format!(" {FOOTER_KEYS}")).dim(), keys);
    frame.render_widget(
        Paragraph::new(FOOTER_PANIC).fg(Color::Red).bold(),
        panic,
    );
}

/// Centers a `width`x`height` rectangle inside the frame.
fn popup_area(frame: &Frame, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(frame.area());
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    area
}

fn popup_block(title: String, color: Color) -> Block<'static> {
    Block::default()
        .title(title)
        .title_style(Style::default().bold().fg(color))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Thick)
        .border_style(Style::default().fg(color))
}

fn render_form(form: &RuleForm, frame: &mut Frame) {
    let mut lines = Vec::new();
    let mut cursor = None;

    for field in FormField::iter() {
        let focused = form.focus == field;
        let label = format!(" {:<LABEL_WIDTH$}", field.label());
        let label = if focused {
            Span::from(label).bold().fg(Color::Yellow)
        } else {
            Span::from(label)
        };

        let value = if field.is_selector() {
            format!("< {} >", form.value(field))
        } else {
            form.value(field).to_string()
        };
        let value_span = if focused {
            Span::from(value.clone()).reversed()
        } else {
            Span::from(value.clone())
        };

        if focused && !field.is_selector() {
            cursor = Some((lines.len(), LABEL_WIDTH + 1 + value.chars().count()));
        }
        lines.push(Line::from(vec![label, value_span]));

        if let Some(error) = form.errors.for_field(field) {
            lines.push(Line::from(format!(" {:LABEL_WIDTH$}{error}", "")).fg(Color::Red));
        }
    }
    lines.push(Line::default());
    lines.push(Line::from(" Tab/↑↓: Field  ←/→: Change  Enter: Save  Esc: Cancel").dim());

    let height = lines.len() as u16 + 2;
    let area = popup_area(frame, 68, height);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(popup_block(form.title(), Color::Green)),
        area,
    );

    if let Some((row, col)) = cursor {
        frame.set_cursor_position(Position::new(
            area.x + 1 + col as u16,
            area.y + 1 + row as u16,
        ));
    }
}

fn render_delete_confirm(session: &Session, position: u32, frame: &mut Frame) {
    let summary = session.snapshot.find(position).map_or_else(String::new, |target| {
        format!(
            "{} {} {}",
            target.rule.action_display(),
            target.rule.port_display(),
            target.rule.endpoint_display()
        )
    });
    let lines = vec![
        Line::default(),
        Line::from(format!("Delete rule {position}?")).bold(),
        Line::from(summary).dim(),
        Line::default(),
        Line::from("(y/N)"),
    ];
    let area = popup_area(frame, 50, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(popup_block(" Delete ".to_string(), Color::Yellow)),
        area,
    );
}

fn render_panic(frame: &mut Frame) {
    let lines = vec![
        Line::default(),
        Line::from("!!! PANIC MODE !!!").bold(),
        Line::default(),
        Line::from("THIS WILL RESET THE FIREWALL TO DEFAULTS!"),
        Line::from("ONLY USE IF SOMETHING WENT WRONG."),
        Line::default(),
        Line::from("PRESS --- ENTER --- TO CONTINUE..."),
        Line::from("PRESS --- ESC --- TO ABORT!"),
        Line::default(),
    ];
    let area = popup_area(frame, 50, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .fg(Color::Red)
            .block(popup_block(" PANIC ".to_string(), Color::Red)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::forms::RuleForm;
    use crate::core::reconciler::{AnnotatedRule, Snapshot};
    use crate::core::rule::Rule;
    use crate::core::test_helpers::tcp_spec;
    use ratatui::{Terminal, backend::TestBackend};

    fn session() -> Session {
        let rules = vec![AnnotatedRule {
            rule: Rule {
                position: 1,
                spec: tcp_spec(22),
                v6: false,
                comment: None,
            },
            service: "ssh".into(),
            note: "admin access".into(),
        }];
        Session::new(Snapshot {
            status: FirewallStatus::Active,
            rule_count: 1,
            rules,
        })
    }

    fn draw(session: &Session, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(session, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_listing_shows_annotations() {
        let screen = draw(&session(), 100, 20);
        assert!(screen.contains("SERVICE"));
        assert!(screen.contains("22/tcp"));
        assert!(screen.contains("ALLOW IN"));
        assert!(screen.contains("ssh"));
        assert!(screen.contains("admin access"));
        assert!(screen.contains("active"));
        assert!(screen.contains("Shift+P: Panic Mode!!"));
    }

    #[test]
    fn test_too_small() {
        let screen = draw(&session(), 60, 10);
        assert!(screen.contains("Terminal too small"));
        assert!(!screen.contains("SERVICE"));
    }

    #[test]
    fn test_panic_popup() {
        let mut s = session();
        s.mode = Mode::Confirm(ConfirmKind::Panic);
        let screen = draw(&s, 100, 20);
        assert!(screen.contains("!!! PANIC MODE !!!"));
        assert!(screen.contains("PRESS --- ESC --- TO ABORT!"));
    }

    #[test]
    fn test_form_shows_errors() {
        let mut form = RuleForm::for_add();
        form.port = "70000".into();
        let _ = form.validate();
        let mut s = session();
        s.mode = Mode::Form(form);
        let screen = draw(&s, 100, 24);
        assert!(screen.contains("Add Rule"));
        assert!(screen.contains("< allow >"));
        assert!(screen.contains("Port"));
    }

    #[test]
    fn test_empty_rule_list() {
        let mut s = session();
        s.snapshot.rules.clear();
        s.snapshot.rule_count = 0;
        let screen = draw(&s, 100, 20);
        assert!(screen.contains("No rules. Press A to add one."));
    }
}
