//! Rule form state and validation
//!
//! Selector fields (action, direction, protocol) cycle with ←/→; text fields
//! accept typing up to their length limit. Validation runs on submit and
//! reports per-field errors.

use crate::core::reconciler::AnnotatedRule;
use crate::core::rule::{ANY, Action, Direction, Protocol, RuleSpec};
use crate::validators::{
    MAX_ENDPOINT_LEN, MAX_NOTE_LEN, MAX_PORT_LEN, MAX_SERVICE_LEN, validate_endpoint,
    validate_port_field,
};
use strum::IntoEnumIterator;

/// Form fields in focus order
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum FormField {
    Action,
    Direction,
    Protocol,
    Port,
    Endpoint,
    Service,
    Note,
}

impl FormField {
    pub fn label(self) -> &'static str {
        match self {
            FormField::Action => "Action",
            FormField::Direction => "Direction",
            FormField::Protocol => "Protocol",
            FormField::Port => "Port",
            FormField::Endpoint => "From/To",
            FormField::Service => "Service",
            FormField::Note => "Note",
        }
    }

    pub fn is_selector(self) -> bool {
        matches!(
            self,
            FormField::Action | FormField::Direction | FormField::Protocol
        )
    }

    /// Maximum characters for text fields
    pub fn max_len(self) -> usize {
        match self {
            FormField::Port => MAX_PORT_LEN,
            FormField::Endpoint => MAX_ENDPOINT_LEN,
            FormField::Service => MAX_SERVICE_LEN,
            FormField::Note => MAX_NOTE_LEN,
            _ => 0,
        }
    }

    pub fn next(self) -> Self {
        cycle(self, true)
    }

    pub fn prev(self) -> Self {
        cycle(self, false)
    }
}

/// Steps through an enum's variants, wrapping at both ends.
fn cycle<T: IntoEnumIterator + PartialEq + Copy>(current: T, forward: bool) -> T {
    let all: Vec<T> = T::iter().collect();
    let idx = all.iter().position(|v| *v == current).unwrap_or(0);
    let next = if forward {
        (idx + 1) % all.len()
    } else {
        (idx + all.len() - 1) % all.len()
    };
    all[next]
}

/// What submitting the form does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Add,
    Edit { position: u32 },
}

/// Form validation errors for individual fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub port: Option<String>,
    pub endpoint: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.port.is_none() && self.endpoint.is_none()
    }

    pub fn for_field(&self, field: FormField) -> Option<&str> {
        match field {
            FormField::Port => self.port.as_deref(),
            FormField::Endpoint => self.endpoint.as_deref(),
            _ => None,
        }
    }
}

/// Validated form contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub spec: RuleSpec,
    /// Sanitized service label
    pub service: String,
    /// Sanitized note
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleForm {
    /// Add a new rule or edit the one at a position
    pub kind: FormKind,
    pub action: Action,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Port, range (`8000:8100`) or comma list, as typed
    pub port: String,
    /// Source (inbound) or destination (outbound) address or CIDR, `any` for all
    pub endpoint: String,
    pub service: String,
    pub note: String,
    /// Field receiving keystrokes
    pub focus: FormField,
    /// Messages from the last failed validation, shown under each field
    pub errors: FormErrors,
    /// Port of the rule being edited; lets a portless rule keep `any`
    original_port: Option<String>,
}

impl RuleForm {
    pub fn for_add() -> Self {
        let defaults = RuleSpec::default();
        Self {
            kind: FormKind::Add,
            action: defaults.action,
            direction: defaults.direction,
            protocol: defaults.protocol,
            port: defaults.port,
            endpoint: defaults.endpoint,
            service: String::new(),
            note: String::new(),
            focus: FormField::Action,
            errors: FormErrors::default(),
            original_port: None,
        }
    }

    /// Pre-fills the form from the rule being edited.
    pub fn for_edit(target: &AnnotatedRule) -> Self {
        let spec = &target.rule.spec;
        Self {
            kind: FormKind::Edit {
                position: target.rule.position,
            },
            action: spec.action,
            direction: spec.direction,
            protocol: spec.protocol,
            port: spec.port.clone(),
            endpoint: spec.endpoint.clone(),
            service: target.service.clone(),
            note: target.note.clone(),
            focus: FormField::Action,
            errors: FormErrors::default(),
            original_port: Some(spec.port.clone()),
        }
    }

    pub fn title(&self) -> String {
        match self.kind {
            FormKind::Add => " Add Rule ".to_string(),
            FormKind::Edit { position } => format!(" Edit Rule {position} "),
        }
    }

    /// Display value of any field.
    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Action => self.action.as_str(),
            FormField::Direction => self.direction.as_str(),
            FormField::Protocol => self.protocol.as_str(),
            FormField::Port => &self.port,
            FormField::Endpoint => &self.endpoint,
            FormField::Service => &self.service,
            FormField::Note => &self.note,
        }
    }

    fn text_mut(&mut self, field: FormField) -> Option<&mut String> {
        match field {
            FormField::Port => Some(&mut self.port),
            FormField::Endpoint => Some(&mut self.endpoint),
            FormField::Service => Some(&mut self.service),
            FormField::Note => Some(&mut self.note),
            _ => None,
        }
    }

    /// Cycles the focused selector.
    pub fn cycle_focused(&mut self, forward: bool) {
        match self.focus {
            FormField::Action => self.action = cycle(self.action, forward),
            FormField::Direction => self.direction = cycle(self.direction, forward),
            FormField::Protocol => self.protocol = cycle(self.protocol, forward),
            _ => {}
        }
    }

    /// Appends `c` to the focused text field unless it is full.
    pub fn push_char(&mut self, c: char) {
        if c.is_control() {
            return;
        }
        let max = self.focus.max_len();
        if let Some(text) = self.text_mut(self.focus)
            && text.chars().count() < max
        {
            text.push(c);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(text) = self.text_mut(self.focus) {
            text.pop();
        }
    }

    /// Validates all fields, recording errors on the form.
    ///
    /// Returns the submission if every field is valid.
    pub fn validate(&mut self) -> Option<Submission> {
        let mut errors = FormErrors::default();

        let keeps_any_port = self.port.trim().eq_ignore_ascii_case(ANY)
            && self
                .original_port
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(ANY));

        let port = if keeps_any_port {
            Some(ANY.to_string())
        } else {
            validate_port_field(&self.port, self.protocol)
                .map_err(|e| errors.port = Some(e))
                .ok()
        };
        let endpoint = validate_endpoint(&self.endpoint)
            .map_err(|e| errors.endpoint = Some(e))
            .ok();

        self.errors = errors;
        let (port, endpoint) = (port?, endpoint?);

        Some(Submission {
            spec: RuleSpec {
                action: self.action,
                direction: self.direction,
                protocol: self.protocol,
                port,
                endpoint,
            },
            service: self.service.trim().to_string(),
            note: self.note.trim().to_string(),
        })
    }
}
