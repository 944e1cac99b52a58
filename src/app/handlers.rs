//! Key dispatch for the interactive session

use super::forms::{FormKind, RuleForm};
use super::{Command, ConfirmKind, Mode, Session, StatusMessage};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Rows moved by PageUp/PageDown
const PAGE_ROWS: usize = 10;

/// Routes a key press to the handler for the current mode.
///
/// Keys are dropped while a command is in flight.
pub fn handle_key(mut session: Session, key: KeyEvent) -> (Session, Option<Command>) {
    if session.busy.is_some() {
        return (session, None);
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        session.running = false;
        return (session, None);
    }

    match std::mem::take(&mut session.mode) {
        Mode::Listing => listing_key(session, key),
        Mode::Form(form) => form_key(session, form, key),
        Mode::Confirm(kind) => confirm_key(session, kind, key),
    }
}

fn listing_key(mut session: Session, key: KeyEvent) -> (Session, Option<Command>) {
    let wants_mutation = matches!(
        key.code,
        KeyCode::Char('a' | 'A' | 'd' | 'D' | 'r' | 'R' | 'P') | KeyCode::Enter
    );
    if wants_mutation && !session.mutations_enabled {
        session.status = Some(StatusMessage::warning(
            "ufw unavailable - mutations disabled",
        ));
        return (session, None);
    }

    let mut command = None;
    match key.code {
        KeyCode::Char('q' | 'Q') => session.running = false,

        KeyCode::Up | KeyCode::Char('k') => session.select_up(1),
        KeyCode::Down | KeyCode::Char('j') => session.select_down(1),
        KeyCode::PageUp => session.select_up(PAGE_ROWS),
        KeyCode::PageDown => session.select_down(PAGE_ROWS),
        KeyCode::Home => session.selected = 0,
        KeyCode::End => session.select_down(usize::MAX),

        KeyCode::Char('a' | 'A') => {
            session.status = None;
            session.mode = Mode::Form(RuleForm::for_add());
        }
        KeyCode::Enter => {
            if let Some(target) = session.selected_rule() {
                let form = RuleForm::for_edit(target);
                session.status = None;
                session.mode = Mode::Form(form);
            }
        }
        KeyCode::Char('d' | 'D') => {
            if let Some(target) = session.selected_rule() {
                let position = target.rule.position;
                session.status = None;
                session.mode = Mode::Confirm(ConfirmKind::Delete { position });
            }
        }
        KeyCode::Char('P') => {
            session.status = None;
            session.mode = Mode::Confirm(ConfirmKind::Panic);
        }
        KeyCode::Char('r' | 'R') => command = Some(Command::Reload),

        _ => {}
    }
    (session, command)
}

fn form_key(
    mut session: Session,
    mut form: RuleForm,
    key: KeyEvent,
) -> (Session, Option<Command>) {
    match key.code {
        KeyCode::Esc => {
            session.status = Some(StatusMessage::info("Cancelled."));
            return (session, None);
        }
        KeyCode::Enter => {
            if let Some(submission) = form.validate() {
                let command = match form.kind {
                    FormKind::Add => Command::Add(submission),
                    FormKind::Edit { position } => Command::Edit {
                        position,
                        submission,
                    },
                };
                return (session, Some(command));
            }
            session.status = Some(StatusMessage::error("Fix the highlighted fields."));
        }
        KeyCode::Tab | KeyCode::Down => form.focus = form.focus.next(),
        KeyCode::BackTab | KeyCode::Up => form.focus = form.focus.prev(),
        KeyCode::Left if form.focus.is_selector() => form.cycle_focused(false),
        KeyCode::Right | KeyCode::Char(' ') if form.focus.is_selector() => {
            form.cycle_focused(true);
        }
        KeyCode::Backspace => form.pop_char(),
        KeyCode::Char(c) => form.push_char(c),
        _ => {}
    }
    session.mode = Mode::Form(form);
    (session, None)
}

fn confirm_key(
    mut session: Session,
    kind: ConfirmKind,
    key: KeyEvent,
) -> (Session, Option<Command>) {
    match kind {
        // (y/N): anything but y cancels
        ConfirmKind::Delete { position } => match key.code {
            KeyCode::Char('y' | 'Y') => (session, Some(Command::Delete(position))),
            _ => {
                session.status = Some(StatusMessage::info("Delete cancelled."));
                (session, None)
            }
        },
        ConfirmKind::Panic => match key.code {
            KeyCode::Enter => (session, Some(Command::Panic)),
            KeyCode::Esc => {
                session.status = Some(StatusMessage::info("Panic mode aborted."));
                (session, None)
            }
            _ => {
                session.mode = Mode::Confirm(kind);
                (session, None)
            }
        },
    }
}
