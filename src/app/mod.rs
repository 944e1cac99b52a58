//! Interactive session state machine
//!
//! A [`Session`] is a plain value: key handling ([`handlers::handle_key`]) is a
//! pure function from `(Session, KeyEvent)` to `(Session, Option<Command>)`, and
//! [`execute`] runs a [`Command`] against the [`Reconciler`] and returns the
//! next session. The main loop owns the only `Session` and draws it between
//! steps.
//!
//! ```text
//! Listing ⇄ Form(Add | Edit) ⇄ Confirm(Delete | Panic)
//! ```

pub mod forms;
pub mod handlers;
pub mod view;

use crate::core::error::Error;
use crate::core::reconciler::{AnnotatedRule, Applied, Reconciler, Snapshot};
use crate::core::source::RuleSource;
use forms::{RuleForm, Submission};
use tracing::{error, info};

/// What a confirmation dialog is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmKind {
    Delete { position: u32 },
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Listing,
    Form(RuleForm),
    Confirm(ConfirmKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// One-line message shown above the footer until the next action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: StatusLevel::Info,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: StatusLevel::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: StatusLevel::Error,
        }
    }
}

/// Work for the reconciler, produced by key handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Reload,
    Add(Submission),
    Edit { position: u32, submission: Submission },
    Delete(u32),
    Panic,
}

impl Command {
    /// Shown while the command runs.
    pub fn busy_label(&self) -> String {
        match self {
            Command::Refresh => "Refreshing…".to_string(),
            Command::Reload => "Reloading firewall…".to_string(),
            Command::Add(_) => "Adding rule…".to_string(),
            Command::Edit { position, .. } => format!("Updating rule {position}…"),
            Command::Delete(position) => format!("Deleting rule {position}…"),
            Command::Panic => "Resetting firewall…".to_string(),
        }
    }

    fn success_message(&self) -> Option<String> {
        match self {
            Command::Refresh => None,
            Command::Reload => Some("Firewall reloaded.".to_string()),
            Command::Add(_) => Some("Rule added.".to_string()),
            Command::Edit { position, .. } => Some(format!("Rule {position} updated.")),
            Command::Delete(position) => Some(format!("Rule {position} deleted.")),
            Command::Panic => Some("Firewall has been reset to default.".to_string()),
        }
    }

    fn is_mutation(&self) -> bool {
        !matches!(self, Command::Refresh)
    }
}

/// Where the cursor goes after the rule list changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Follow {
    /// Stay on the same position if it still exists, else the top
    Keep,
    /// The newest rule
    Last,
    /// One row up (after deleting the selected row)
    Previous,
}

/// Everything the view needs, and nothing else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Which screen or dialog has the keyboard
    pub mode: Mode,
    /// Last rule list received from the reconciler
    pub snapshot: Snapshot,
    /// Index into `snapshot.rules`
    pub selected: usize,
    /// Result line of the last command, replaced by the next one
    pub status: Option<StatusMessage>,
    /// Label of the command in flight; input is ignored while set
    pub busy: Option<String>,
    /// Cleared when ufw disappears mid-session
    pub mutations_enabled: bool,
    /// Set to false to leave the session loop
    pub running: bool,
}

impl Session {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            mode: Mode::Listing,
            snapshot,
            selected: 0,
            status: None,
            busy: None,
            mutations_enabled: true,
            running: true,
        }
    }

    pub fn selected_rule(&self) -> Option<&AnnotatedRule> {
        self.snapshot.rules.get(self.selected)
    }

    pub fn select_up(&mut self, rows: usize) {
        self.selected = self.selected.saturating_sub(rows);
    }

    pub fn select_down(&mut self, rows: usize) {
        self.selected = self.selected.saturating_add(rows);
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        self.selected = self
            .selected
            .min(self.snapshot.rules.len().saturating_sub(1));
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot, follow: Follow) {
        let previous_position = self.selected_rule().map(|r| r.rule.position);
        let previous_index = self.selected;
        self.snapshot = snapshot;

        self.selected = match follow {
            Follow::Keep => previous_position
                .and_then(|p| self.snapshot.rules.iter().position(|r| r.rule.position == p))
                .unwrap_or(0),
            Follow::Last => self.snapshot.rules.len().saturating_sub(1),
            Follow::Previous => previous_index.saturating_sub(1),
        };
        self.clamp_selection();
    }

    /// Applies the result of a background refresh.
    pub fn on_refresh(&mut self, result: crate::Result<Snapshot>) {
        match result {
            Ok(snapshot) => {
                self.mutations_enabled = true;
                self.apply_snapshot(snapshot, Follow::Keep);
            }
            Err(e) => self.on_error(&e),
        }
    }

    fn on_error(&mut self, e: &Error) {
        error!("{e}");
        if matches!(e, Error::ToolUnavailable(_)) {
            self.mutations_enabled = false;
        }
        self.status = Some(StatusMessage::error(e.user_message()));
    }
}

/// Runs `command` and folds its outcome into the session.
///
/// Failed mutations are followed by a refresh so the view matches whatever
/// ufw actually did before failing.
pub async fn execute<S: RuleSource>(
    mut session: Session,
    command: Command,
    reconciler: &Reconciler<S>,
) -> Session {
    info!("Executing {command:?}");
    let result: crate::Result<Applied> = match &command {
        Command::Refresh => reconciler.refresh().await.map(|snapshot| Applied {
            snapshot,
            warning: None,
        }),
        Command::Reload => reconciler.reload().await,
        Command::Add(submission) => {
            reconciler
                .add_rule(&submission.spec, &submission.service, &submission.note)
                .await
        }
        Command::Edit {
            position,
            submission,
        } => {
            reconciler
                .edit_rule(
                    *position,
                    &submission.spec,
                    &submission.service,
                    &submission.note,
                )
                .await
        }
        Command::Delete(position) => reconciler.delete_rule(*position).await,
        Command::Panic => reconciler.panic_reset().await,
    };

    match result {
        Ok(applied) => {
            session.mutations_enabled = true;
            let follow = match command {
                Command::Add(_) => Follow::Last,
                Command::Delete(_) => Follow::Previous,
                _ => Follow::Keep,
            };
            session.apply_snapshot(applied.snapshot, follow);
            if let Some(warning) = applied.warning {
                session.status = Some(StatusMessage::warning(warning.user_message()));
            } else if let Some(message) = command.success_message() {
                session.status = Some(StatusMessage::info(message));
            }
        }
        Err(e) => {
            session.on_error(&e);
            if command.is_mutation()
                && session.mutations_enabled
                && let Ok(snapshot) = reconciler.refresh().await
            {
                session.apply_snapshot(snapshot, Follow::Keep);
            }
        }
    }

    session.busy = None;
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::Mutation;
    use crate::core::test_helpers::{fake_reconciler, tcp_spec};

    fn submission(port: u16, service: &str) -> Submission {
        Submission {
            spec: tcp_spec(port),
            service: service.to_string(),
            note: String::new(),
        }
    }

    async fn started(ports: &[u16]) -> (Session, Reconciler<crate::core::test_helpers::FakeRuleSource>, tempfile::TempDir) {
        let (reconciler, dir) = fake_reconciler(ports);
        let snapshot = reconciler.refresh().await.unwrap();
        (Session::new(snapshot), reconciler, dir)
    }

    #[tokio::test]
    async fn test_add_selects_new_rule() {
        let (session, reconciler, _dir) = started(&[22, 80]).await;
        let session = execute(session, Command::Add(submission(443, "tls")), &reconciler).await;
        assert_eq!(session.selected, 2);
        assert_eq!(session.selected_rule().unwrap().service, "tls");
        assert_eq!(session.status.unwrap().level, StatusLevel::Info);
    }

    #[tokio::test]
    async fn test_delete_moves_selection_up() {
        let (mut session, reconciler, _dir) = started(&[22, 80, 443]).await;
        session.selected = 2;
        let session = execute(session, Command::Delete(3), &reconciler).await;
        assert_eq!(session.selected, 1);
        assert_eq!(session.snapshot.rules.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_first_row_stays_in_range() {
        let (session, reconciler, _dir) = started(&[22]).await;
        let session = execute(session, Command::Delete(1), &reconciler).await;
        assert_eq!(session.selected, 0);
        assert!(session.snapshot.rules.is_empty());
        assert!(session.selected_rule().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_selected_position() {
        let (mut session, reconciler, _dir) = started(&[22, 80, 443]).await;
        session.selected = 1;
        let session = execute(session, Command::Refresh, &reconciler).await;
        assert_eq!(session.selected_rule().unwrap().rule.position, 2);
        assert!(session.status.is_none());
    }

    #[tokio::test]
    async fn test_vanished_position_resets_selection() {
        let (mut session, reconciler, _dir) = started(&[22, 80, 443]).await;
        session.selected = 2;
        reconciler.source().external_delete(3);
        session.on_refresh(reconciler.refresh().await);
        assert_eq!(session.selected, 0);
    }

    #[tokio::test]
    async fn test_failed_mutation_reports_error_and_refreshes() {
        let (session, reconciler, _dir) = started(&[22, 80]).await;
        reconciler
            .source()
            .fail_when(|m| matches!(m, Mutation::Insert { .. }));

        let command = Command::Edit {
            position: 1,
            submission: submission(2222, ""),
        };
        let session = execute(session, command, &reconciler).await;
        assert_eq!(session.status.as_ref().unwrap().level, StatusLevel::Error);
        // The delete went through before the insert failed
        assert_eq!(session.snapshot.rules.len(), 1);
        assert!(session.busy.is_none());
    }

    #[tokio::test]
    async fn test_tool_unavailable_disables_mutations() {
        let (session, reconciler, _dir) = started(&[22]).await;
        reconciler.source().set_unavailable();
        let session = execute(session, Command::Reload, &reconciler).await;
        assert!(!session.mutations_enabled);
        assert!(session.status.unwrap().text.contains("mutations disabled"));
        assert_eq!(session.snapshot.rules.len(), 1);
    }

    #[tokio::test]
    async fn test_panic_empties_view() {
        let (session, reconciler, _dir) = started(&[22, 80]).await;
        let session = execute(session, Command::Panic, &reconciler).await;
        assert!(session.snapshot.rules.is_empty());
        assert_eq!(
            session.status.unwrap().text,
            "Firewall has been reset to default."
        );
    }
}
