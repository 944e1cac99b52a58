//! Merges the live rule list with persisted annotations
//!
//! The [`Reconciler`] is the only writer of the [`MetadataStore`]. Every public
//! operation runs inside one critical section: a mutation and the refresh that
//! follows it complete before the next request is accepted, and background
//! refreshes that find the section busy are dropped ([`Reconciler::try_refresh`]).
//!
//! Rule mutations are never rolled back. When an annotation cannot be saved
//! after a mutation succeeded, the mutation stands and the failure is reported
//! as [`Applied::warning`].

use crate::audit::{AuditLog, EventType};
use crate::core::error::{Error, Result};
use crate::core::metadata::{Annotation, Annotations, MetadataStore};
use crate::core::reindex::{prune_orphans, reindex_after_delete};
use crate::core::rule::{FirewallStatus, Rule, RuleSpec};
use crate::core::source::{Listing, Mutation, RuleSource};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SAVE_ATTEMPTS: u32 = 3;
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A rule joined with its annotation (empty strings when unannotated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedRule {
    pub rule: Rule,
    /// Service label stored for this position
    pub service: String,
    /// Free-text note stored for this position
    pub note: String,
}

/// Consistent view handed to the interactive layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Firewall state from the `Status:` line
    pub status: FirewallStatus,
    /// Decoded rules in position order, each joined with its annotation
    pub rules: Vec<AnnotatedRule>,
    /// Occupied positions, including rows that could not be decoded
    pub rule_count: usize,
}

impl Snapshot {
    fn build(listing: &Listing, annotations: &Annotations) -> Self {
        let rules = listing
            .rules
            .iter()
            .map(|rule| {
                let annotation = annotations.get(rule.position).cloned().unwrap_or_default();
                AnnotatedRule {
                    rule: rule.clone(),
                    service: annotation.service,
                    note: annotation.note,
                }
            })
            .collect();

        Self {
            status: listing.status,
            rules,
            rule_count: listing.rule_count(),
        }
    }

    pub fn find(&self, position: u32) -> Option<&AnnotatedRule> {
        self.rules.iter().find(|r| r.rule.position == position)
    }
}

/// Outcome of a successful mutation
#[derive(Debug)]
pub struct Applied {
    /// View taken after the mutation and its annotation update
    pub snapshot: Snapshot,
    /// Non-fatal problem: the rule change happened but something around it
    /// (usually the annotation save) did not
    pub warning: Option<Error>,
}

#[derive(Debug, Default)]
struct State {
    /// Cached mapping; `None` until first loaded
    annotations: Option<Annotations>,
    /// In-memory mapping is newer than what is on disk
    dirty: bool,
}

/// Owns a [`RuleSource`] and the annotation store
pub struct Reconciler<S> {
    source: S,
    store: MetadataStore,
    audit: Option<AuditLog>,
    state: Mutex<State>,
}

impl<S: RuleSource> Reconciler<S> {
    pub fn new(source: S, store: MetadataStore) -> Self {
        Self {
            source,
            store,
            audit: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Records every mutation to `audit`.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current annotation mapping (loaded on first use).
    pub async fn annotations(&self) -> Result<Annotations> {
        let mut state = self.state.lock().await;
        Ok(self.cached(&mut state)?.clone())
    }

    /// Lists rules, prunes orphaned annotations and returns the joined view.
    pub async fn refresh(&self) -> Result<Snapshot> {
        let mut state = self.state.lock().await;
        let listing = self.sync(&mut state).await?;
        self.snapshot(&mut state, &listing)
    }

    /// Like [`refresh`](Self::refresh), but returns `None` without waiting
    /// when another operation holds the critical section.
    pub async fn try_refresh(&self) -> Option<Result<Snapshot>> {
        let Ok(mut state) = self.state.try_lock() else {
            debug!("Refresh skipped: reconciler busy");
            return None;
        };
        let result = match self.sync(&mut state).await {
            Ok(listing) => self.snapshot(&mut state, &listing),
            Err(e) => Err(e),
        };
        Some(result)
    }

    /// Reloads the firewall and re-reads the annotation tables from disk.
    pub async fn reload(&self) -> Result<Applied> {
        let mut state = self.state.lock().await;
        self.apply_audited(&Mutation::Reload, EventType::Reload, serde_json::json!({}))
            .await?;

        // Unsaved in-memory changes win over the stale files
        if !state.dirty {
            state.annotations = None;
        }
        self.finish(&mut state, None).await
    }

    /// Appends a rule and annotates the position ufw assigned to it.
    pub async fn add_rule(&self, spec: &RuleSpec, service: &str, note: &str) -> Result<Applied> {
        let mut state = self.state.lock().await;
        self.cached(&mut state)?;
        let before = self.source.list().await?.rule_count();

        let details = serde_json::json!({ "rule": spec.to_string(), "service": service, "note": note });
        self.apply_audited(&Mutation::Add(spec.clone()), EventType::AddRule, details)
            .await?;

        let listing = self.sync(&mut state).await?;
        let count = listing.rule_count();
        let annotation = Annotation::new(service, note);

        let warning = if listing.status != FirewallStatus::Active {
            info!("Firewall {}, cannot tell which position {spec} took", listing.status);
            (!annotation.is_empty()).then(|| Error::Tool {
                exit_code: Some(0),
                message: "Firewall inactive: rule added without annotation".to_string(),
            })
        } else if count <= before {
            info!("ufw did not add a rule for {spec} (already present)");
            Some(Error::Tool {
                exit_code: Some(0),
                message: "Skipping adding existing rule".to_string(),
            })
        } else if annotation.is_empty() {
            None
        } else {
            let position = u32::try_from(count).unwrap_or(u32::MAX);
            self.upsert(&mut state, position, annotation).await?
        };

        let snapshot = self.snapshot(&mut state, &listing)?;
        Ok(Applied { snapshot, warning })
    }

    /// Deletes the rule at `position` and shifts higher annotations down.
    pub async fn delete_rule(&self, position: u32) -> Result<Applied> {
        let mut state = self.state.lock().await;
        // Load before the firewall changes so the shift below cannot fail
        self.cached(&mut state)?;
        let details = serde_json::json!({ "position": position });
        self.apply_audited(&Mutation::Delete(position), EventType::DeleteRule, details)
            .await?;

        self.shift_after_delete(&mut state, position).await?;
        self.finish(&mut state, None).await
    }

    /// Replaces the rule at `position` in place and updates its annotation.
    ///
    /// An unchanged spec only updates the annotation. Otherwise the rule is
    /// deleted and re-inserted at the same position (appended when it was
    /// the last rule), leaving every other position untouched.
    pub async fn edit_rule(
        &self,
        position: u32,
        spec: &RuleSpec,
        service: &str,
        note: &str,
    ) -> Result<Applied> {
        let mut state = self.state.lock().await;
        let listing = self.source.list().await?;
        let current = listing.find(position).ok_or_else(|| Error::Validation {
            field: "position".to_string(),
            message: format!("no rule at position {position}"),
        })?;

        if current.spec == *spec {
            debug!("Rule {position} unchanged, updating annotation only");
            return self
                .annotate_locked(&mut state, position, service, note)
                .await;
        }

        let details = serde_json::json!({
            "position": position,
            "from": current.spec.to_string(),
            "to": spec.to_string(),
            "service": service,
            "note": note,
        });
        let before = listing.rule_count();
        let was_last = position as usize >= before;

        self.cached(&mut state)?;
        self.apply_audited(&Mutation::Delete(position), EventType::EditRule, details.clone())
            .await?;

        let reinsert = if was_last {
            Mutation::Add(spec.clone())
        } else {
            Mutation::Insert {
                position,
                spec: spec.clone(),
            }
        };
        if let Err(e) = self
            .apply_audited(&reinsert, EventType::EditRule, details)
            .await
        {
            warn!("Re-insert at {position} failed after delete; treating edit as deletion");
            self.shift_after_delete(&mut state, position).await?;
            if let Err(sync_err) = self.sync(&mut state).await {
                warn!("Refresh after failed edit also failed: {sync_err}");
            }
            return Err(e);
        }

        // Checked before syncing so pruning cannot drop the unshifted top entry
        let after = self.source.list().await?;
        if after.status == FirewallStatus::Active && after.rule_count() < before {
            // ufw skipped the re-insert as a duplicate, so the edit was a deletion
            info!("ufw did not re-insert {spec} at {position} (already present)");
            self.shift_after_delete(&mut state, position).await?;
            let mut applied = self.finish(&mut state, None).await?;
            if applied.warning.is_none() {
                applied.warning = Some(Error::Tool {
                    exit_code: Some(0),
                    message: "Skipping inserting existing rule; the edited rule was removed"
                        .to_string(),
                });
            }
            return Ok(applied);
        }

        let listing = self.sync(&mut state).await?;
        let warning = self
            .upsert(&mut state, position, Annotation::new(service, note))
            .await?;
        let snapshot = self.snapshot(&mut state, &listing)?;
        Ok(Applied { snapshot, warning })
    }

    /// Sets the annotation of an existing rule without touching the firewall.
    pub async fn annotate(&self, position: u32, service: &str, note: &str) -> Result<Applied> {
        let mut state = self.state.lock().await;
        self.annotate_locked(&mut state, position, service, note)
            .await
    }

    /// Removes every rule (`ufw --force reset`) and clears all annotations.
    pub async fn panic_reset(&self) -> Result<Applied> {
        let mut state = self.state.lock().await;
        self.apply_audited(&Mutation::ResetAll, EventType::Reset, serde_json::json!({}))
            .await?;

        warn!("Firewall reset: clearing all annotations");
        let empty = Annotations::new();
        let warning = self.persist_or_mark_dirty(&mut state, empty).await;
        self.finish(&mut state, warning).await
    }

    async fn annotate_locked(
        &self,
        state: &mut State,
        position: u32,
        service: &str,
        note: &str,
    ) -> Result<Applied> {
        let listing = self.sync(state).await?;
        if position == 0 || position as usize > listing.rule_count() {
            return Err(Error::Validation {
                field: "position".to_string(),
                message: format!("no rule at position {position}"),
            });
        }

        let warning = self
            .upsert(state, position, Annotation::new(service, note))
            .await?;

        if let Some(audit) = &self.audit {
            audit
                .record(
                    EventType::Annotate,
                    serde_json::json!({ "position": position, "service": service, "note": note }),
                    warning.as_ref().map(ToString::to_string),
                )
                .await;
        }

        let snapshot = self.snapshot(state, &listing)?;
        Ok(Applied { snapshot, warning })
    }

    /// Lists rules and brings the cached mapping in line with them.
    async fn sync(&self, state: &mut State) -> Result<Listing> {
        let listing = self.source.list().await?;
        let count = listing.rule_count();

        // ufw prints no rows while disabled; the rules themselves still exist
        if listing.status != FirewallStatus::Active {
            debug!("Firewall {}, skipping orphan pruning", listing.status);
            if state.dirty {
                let unsaved = self.cached(state)?.clone();
                let _ = self.persist_or_mark_dirty(state, unsaved).await;
            }
            return Ok(listing);
        }

        let current = self.cached(state)?;
        let pruned = prune_orphans(current, count);
        if pruned != *current {
            info!(
                "Pruning {} orphaned annotations (rule count {count})",
                current.len() - pruned.len()
            );
            state.dirty = true;
        }

        if state.dirty {
            // Failure is logged and retried on the next sync
            let _ = self.persist_or_mark_dirty(state, pruned).await;
        } else {
            state.annotations = Some(pruned);
        }
        Ok(listing)
    }

    fn cached<'a>(&self, state: &'a mut State) -> Result<&'a mut Annotations> {
        if state.annotations.is_none() {
            state.annotations = Some(self.store.load()?);
        }
        Ok(state.annotations.get_or_insert_with(Annotations::new))
    }

    fn snapshot(&self, state: &mut State, listing: &Listing) -> Result<Snapshot> {
        Ok(Snapshot::build(listing, self.cached(state)?))
    }

    async fn shift_after_delete(&self, state: &mut State, position: u32) -> Result<()> {
        let next = reindex_after_delete(self.cached(state)?, position);
        debug!("Shifted annotations after deleting position {position}");
        let _ = self.persist_or_mark_dirty(state, next).await;
        Ok(())
    }

    /// Saves the mapping with the annotation at `position` replaced.
    ///
    /// Fails only if the mapping cannot be loaded. A save failure leaves the
    /// cached mapping unchanged and is returned as the warning.
    async fn upsert(
        &self,
        state: &mut State,
        position: u32,
        annotation: Annotation,
    ) -> Result<Option<Error>> {
        let mut next = self.cached(state)?.clone();
        next.upsert(position, annotation);
        if next == *self.cached(state)? {
            return Ok(None);
        }

        match self.save_with_retry(&next).await {
            Ok(()) => {
                state.annotations = Some(next);
                Ok(None)
            }
            Err(e) => {
                warn!("Dropping annotation for position {position}: {e}");
                Ok(Some(e))
            }
        }
    }

    /// Adopts `next` as the current mapping and tries to save it; on failure
    /// the mapping stays in memory, marked dirty.
    async fn persist_or_mark_dirty(&self, state: &mut State, next: Annotations) -> Option<Error> {
        let result = self.save_with_retry(&next).await;
        state.annotations = Some(next);
        match result {
            Ok(()) => {
                state.dirty = false;
                None
            }
            Err(e) => {
                warn!("Annotation save failed, will retry on next refresh: {e}");
                state.dirty = true;
                Some(e)
            }
        }
    }

    async fn save_with_retry(&self, annotations: &Annotations) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.save(annotations) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    warn!("Annotation save attempt {attempt}/{SAVE_ATTEMPTS} failed: {e}");
                    attempt += 1;
                    tokio::time::sleep(SAVE_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refreshes after a mutation and packages the result.
    async fn finish(&self, state: &mut State, warning: Option<Error>) -> Result<Applied> {
        let listing = self.sync(state).await?;
        let snapshot = self.snapshot(state, &listing)?;
        // A save that failed earlier may have succeeded during sync
        let warning = state.dirty.then(|| {
            warning.unwrap_or_else(|| {
                Error::Persistence("annotation changes kept in memory only".to_string())
            })
        });
        Ok(Applied { snapshot, warning })
    }

    async fn apply_audited(
        &self,
        mutation: &Mutation,
        event: EventType,
        details: serde_json::Value,
    ) -> Result<()> {
        let result = self.source.apply(mutation).await;
        if let Some(audit) = &self.audit {
            let mut details = details;
            details["command"] = serde_json::Value::String(mutation.describe());
            audit
                .record(event, details, result.as_ref().err().map(ToString::to_string))
                .await;
        }
        result
    }
}
