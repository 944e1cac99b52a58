//! Persisted annotations (service label + note) keyed by rule position
//!
//! Annotations live in two flat tables under the metadata directory:
//!
//! - `services.txt` - one `position:service` line per annotated rule
//! - `notes.txt` - one `position:note` line per annotated rule
//!
//! Lines are written in ascending position order. Text is split from the
//! position at the first `:`, so colons inside the text survive a round trip.
//! Both tables are replaced atomically (temp file in the same directory,
//! fsync, rename) so a crash mid-write never leaves a truncated table.

use crate::core::error::{Error, Result};
use crate::validators::{MAX_NOTE_LEN, MAX_SERVICE_LEN, sanitize_annotation};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SERVICES_FILE: &str = "services.txt";
pub const NOTES_FILE: &str = "notes.txt";

/// Service label and free-text note attached to one rule position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    /// Short label such as `ssh` or `web`
    pub service: String,
    /// Free text, at most [`MAX_NOTE_LEN`] characters
    pub note: String,
}

impl Annotation {
    /// Creates a sanitized annotation.
    pub fn new(service: &str, note: &str) -> Self {
        Self {
            service: sanitize_annotation(service, MAX_SERVICE_LEN),
            note: sanitize_annotation(note, MAX_NOTE_LEN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service.is_empty() && self.note.is_empty()
    }
}

/// Position → annotation mapping
///
/// Positions are always ≥ 1 and at most one annotation exists per position.
/// Empty annotations are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    entries: BTreeMap<u32, Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: u32) -> Option<&Annotation> {
        self.entries.get(&position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Annotation)> {
        self.entries.iter().map(|(p, a)| (*p, a))
    }

    /// Highest annotated position, if any.
    pub fn max_position(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Creates or replaces the entry at `position`.
    ///
    /// An annotation whose service and note are both empty removes the entry.
    /// Position 0 is rejected and leaves the mapping untouched.
    pub fn upsert(&mut self, position: u32, annotation: Annotation) {
        if position == 0 {
            warn!("Ignoring annotation for invalid position 0");
            return;
        }
        if annotation.is_empty() {
            self.entries.remove(&position);
        } else {
            self.entries.insert(position, annotation);
        }
    }

    /// Deletes the entry at `position`, if present.
    pub fn remove(&mut self, position: u32) -> Option<Annotation> {
        self.entries.remove(&position)
    }

    /// Decrements every position greater than `from` by one.
    ///
    /// Mirrors ufw renumbering after the rule at `from` was deleted. The entry
    /// at `from` should be removed first; otherwise it is overwritten by the
    /// entry shifted down from `from + 1`.
    pub fn shift_down(&mut self, from: u32) {
        let Some(first) = from.checked_add(1) else {
            return;
        };
        let shifted = self.entries.split_off(&first);
        for (position, annotation) in shifted {
            self.entries.insert(position - 1, annotation);
        }
    }

    /// Drops every entry above `count`. Returns true if anything was dropped.
    pub fn truncate(&mut self, count: usize) -> bool {
        let limit = u32::try_from(count).unwrap_or(u32::MAX);
        let before = self.entries.len();
        self.entries.retain(|position, _| *position <= limit);
        self.entries.len() != before
    }
}

impl FromIterator<(u32, Annotation)> for Annotations {
    fn from_iter<I: IntoIterator<Item = (u32, Annotation)>>(iter: I) -> Self {
        let mut annotations = Annotations::new();
        for (position, annotation) in iter {
            annotations.upsert(position, annotation);
        }
        annotations
    }
}

/// Durable storage for [`Annotations`]
///
/// Assumes a single writer: no locking is performed against other processes.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads both tables.
    ///
    /// Missing files (first run) yield an empty mapping. Corrupt lines are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if a table exists but cannot be read.
    pub fn load(&self) -> Result<Annotations> {
        let services = read_table(&self.dir.join(SERVICES_FILE))?;
        let notes = read_table(&self.dir.join(NOTES_FILE))?;

        let mut merged: BTreeMap<u32, Annotation> = BTreeMap::new();
        for (position, service) in services {
            merged.entry(position).or_default().service = service;
        }
        for (position, note) in notes {
            merged.entry(position).or_default().note = note;
        }

        let annotations: Annotations = merged.into_iter().collect();
        debug!(
            "Loaded {} annotations from {}",
            annotations.len(),
            self.dir.display()
        );
        Ok(annotations)
    }

    /// Replaces both tables with the contents of `annotations`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the directory cannot be created or a
    /// table cannot be written.
    pub fn save(&self, annotations: &Annotations) -> Result<()> {
        create_private_dir(&self.dir)
            .map_err(|e| Error::Persistence(format!("{}: {e}", self.dir.display())))?;

        let services = render_table(annotations.iter().map(|(p, a)| (p, a.service.as_str())));
        let notes = render_table(annotations.iter().map(|(p, a)| (p, a.note.as_str())));

        write_atomic(&self.dir, SERVICES_FILE, &services)?;
        write_atomic(&self.dir, NOTES_FILE, &notes)?;
        debug!("Saved {} annotations", annotations.len());
        Ok(())
    }
}

/// Renders `position:text` lines in ascending position order, skipping empty text.
pub(crate) fn render_table<'a>(rows: impl Iterator<Item = (u32, &'a str)>) -> String {
    let mut out = String::new();
    for (position, text) in rows {
        if !text.is_empty() {
            out.push_str(&format!("{position}:{text}\n"));
        }
    }
    out
}

/// Parses `position:text` lines. Later duplicates win.
pub(crate) fn parse_table(content: &str) -> BTreeMap<u32, String> {
    let mut table = BTreeMap::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line.split_once(':').and_then(|(number, text)| {
            let number = number.trim();
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let position = number.parse::<u32>().ok().filter(|p| *p >= 1)?;
            Some((position, text.trim()))
        });

        match parsed {
            Some((_, "")) => {}
            Some((position, text)) => {
                table.insert(position, text.to_string());
            }
            None => warn!("Skipping corrupt annotation line {}: {line:?}", idx + 1),
        }
    }
    table
}

fn read_table(path: &Path) -> Result<BTreeMap<u32, String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_table(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Writes `content` to `dir/name` via a temp file in the same directory,
/// then renames it over the target.
fn write_atomic(dir: &Path, name: &str, content: &str) -> Result<()> {
    let target = dir.join(name);
    let persist_err = |e: std::io::Error| Error::Persistence(format!("{}: {e}", target.display()));

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .tempfile_in(dir)
        .map_err(persist_err)?;
    temp.write_all(content.as_bytes()).map_err(persist_err)?;
    temp.as_file().sync_all().map_err(persist_err)?;
    temp.persist(&target).map_err(|e| persist_err(e.error))?;
    Ok(())
}
