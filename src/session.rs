use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use anyhow::Context;

use crate::{
    burst::{CommitSink, SnapshotGate},
    error::{DeckError, DeckResult},
    model::ChartData,
};

/// Quiet period after the last change before the debounced live commit fires.
pub const DEBOUNCE_QUIET: Duration = Duration::from_millis(300);

/// Addresses one editable cell of a chart dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// Category label for `row`.
    Label { row: usize },
    /// Numeric value at `row` within `series`.
    Value { series: usize, row: usize },
    /// Display name of `series`.
    SeriesName { series: usize },
}

/// Stateful controller for one chart-data editing panel.
///
/// The session owns a working copy of the dataset bound to one target
/// element. Keystrokes mutate only session state; commits happen when the
/// host drives [`poll`](Self::poll) past the debounce deadline (live) or
/// calls [`save`](Self::save) (final). The session never reads the clock
/// itself: every time-sensitive operation takes an explicit `now`, so the
/// debounce is deterministic under test.
///
/// One edit burst runs from open/retarget/save until the next save (or the
/// session ends), and requests exactly one undo snapshot, immediately before
/// the burst's first state-changing commit.
pub struct EditSession {
    target: String,
    data: ChartData,
    /// Raw text the user typed, kept per field so a partially typed or
    /// intentionally emptied value is not overwritten by derived formatting.
    display: HashMap<FieldKey, String>,
    focused: HashSet<FieldKey>,
    /// Serialized dataset as of the last successful commit; commits that
    /// would reproduce it are suppressed.
    fingerprint: Option<String>,
    deadline: Option<Instant>,
    gate: SnapshotGate,
}

impl EditSession {
    /// Open a session over a snapshot of the target element's dataset. The
    /// first burst begins here, with `data` as the undo-restore state.
    pub fn open(target: impl Into<String>, data: ChartData) -> DeckResult<Self> {
        let fingerprint = fingerprint(&data)?;
        let mut gate = SnapshotGate::new();
        gate.begin_burst(&data);
        Ok(Self {
            target: target.into(),
            data,
            display: HashMap::new(),
            focused: HashSet::new(),
            fingerprint: Some(fingerprint),
            deadline: None,
            gate,
        })
    }

    /// Id of the element this session edits.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The session's current working dataset.
    pub fn data(&self) -> &ChartData {
        &self.data
    }

    /// Whether a debounced live commit is still pending.
    pub fn has_pending_commit(&self) -> bool {
        self.deadline.is_some()
    }

    /// Text to show in the field's input, preferring what the user typed
    /// over text derived from the dataset.
    pub fn display_text(&self, key: FieldKey) -> String {
        if let Some(text) = self.display.get(&key) {
            return text.clone();
        }
        match key {
            FieldKey::Label { row } => self.data.labels.get(row).cloned().unwrap_or_default(),
            FieldKey::SeriesName { series } => self
                .data
                .series
                .get(series)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            FieldKey::Value { series, row } => self
                .data
                .series
                .get(series)
                .and_then(|s| s.values.get(row))
                .map(|v| format_value(*v))
                .unwrap_or_default(),
        }
    }

    pub fn focus(&mut self, key: FieldKey) {
        self.focused.insert(key);
    }

    /// Apply one keystroke-level change to a field and re-arm the debounce.
    ///
    /// The display string always updates; the dataset updates only when the
    /// input parses (an emptied numeric field defers to blur). Invalid
    /// numeric input is rejected without touching anything.
    pub fn edit(&mut self, key: FieldKey, text: &str, now: Instant) -> DeckResult<()> {
        let parsed = match key {
            FieldKey::Value { .. } => parse_value(text)?,
            _ => None,
        };

        self.display.insert(key, text.to_string());
        self.apply(key, text, parsed)?;
        self.deadline = Some(now + DEBOUNCE_QUIET);
        Ok(())
    }

    /// Leave a field. Leaving a numeric field emptied writes 0 into the
    /// dataset and re-arms the debounce; the display stays empty.
    pub fn blur(&mut self, key: FieldKey, now: Instant) {
        self.focused.remove(&key);

        if let FieldKey::Value { series, row } = key
            && self.display.get(&key).is_some_and(|t| t.trim().is_empty())
            && let Some(s) = self.data.series.get_mut(series)
        {
            if s.values.len() <= row {
                s.values.resize(row + 1, 0.0);
                self.deadline = Some(now + DEBOUNCE_QUIET);
            } else if s.values[row] != 0.0 {
                s.values[row] = 0.0;
                self.deadline = Some(now + DEBOUNCE_QUIET);
            }
        }
    }

    /// Fire the debounced live commit once the quiet period has elapsed.
    /// Returns whether a commit was emitted.
    ///
    /// A dataset identical to the last commit disarms without emitting. A
    /// sink failure is logged and the fingerprint is not advanced, so the
    /// next change retries the commit.
    pub fn poll<S: CommitSink>(&mut self, sink: &mut S, now: Instant) -> DeckResult<bool> {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Ok(false),
        }
        self.deadline = None;

        let fp = fingerprint(&self.data)?;
        if self.fingerprint.as_deref() == Some(fp.as_str()) {
            return Ok(false);
        }

        let committed = self
            .gate
            .ensure_snapshot(sink)
            .and_then(|()| sink.commit(&self.data, true));
        match committed {
            Ok(()) => {
                self.fingerprint = Some(fp);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(
                    target_element = %self.target,
                    error = %err,
                    "live commit failed; will retry on the next change"
                );
                Ok(false)
            }
        }
    }

    /// Explicit save: emit a final commit if the dataset changed since the
    /// last commit, then end the burst. The next edit starts a fresh burst
    /// with the saved state as its undo-restore point.
    pub fn save<S: CommitSink>(&mut self, sink: &mut S, _now: Instant) -> DeckResult<()> {
        self.deadline = None;

        let fp = fingerprint(&self.data)?;
        if self.fingerprint.as_deref() != Some(fp.as_str()) {
            self.gate.ensure_snapshot(sink)?;
            sink.commit(&self.data, false)?;
            self.fingerprint = Some(fp);
        } else {
            tracing::debug!(target_element = %self.target, "save skipped; dataset unchanged");
        }

        self.gate.reset();
        self.gate.begin_burst(&self.data);
        Ok(())
    }

    /// Replace the working dataset with state committed elsewhere (another
    /// part of the program, undo/redo). Fields the user currently has
    /// focused keep the session's values so in-flight typing is never
    /// clobbered.
    pub fn sync_external(&mut self, mut incoming: ChartData) -> DeckResult<()> {
        // The external state is the committed baseline; carried-over focused
        // fields then count as local changes against it.
        let fp = fingerprint(&incoming)?;
        for key in self.focused.iter().copied() {
            carry_field(&self.data, &mut incoming, key);
        }
        self.display.retain(|key, _| self.focused.contains(key));
        self.fingerprint = Some(fp);
        self.data = incoming;
        // Undoing a burst that starts after this sync must not also revert
        // the external commit, so an unpushed snapshot follows the merge.
        self.gate.rebase_prior(&self.data);
        Ok(())
    }

    /// Point the session at a different chart element. All transient state
    /// is discarded; a pending debounced commit is dropped, not flushed.
    pub fn retarget(&mut self, target: impl Into<String>, data: ChartData) -> DeckResult<()> {
        if self.deadline.is_some() {
            tracing::debug!(
                target_element = %self.target,
                "retarget discards a pending debounced commit"
            );
        }
        self.target = target.into();
        self.fingerprint = Some(fingerprint(&data)?);
        self.data = data;
        self.display.clear();
        self.focused.clear();
        self.deadline = None;
        self.gate.reset();
        self.gate.begin_burst(&self.data);
        Ok(())
    }

    /// Close the session. A still-pending debounced commit is dropped.
    pub fn close(self) {
        if self.deadline.is_some() {
            tracing::debug!(
                target_element = %self.target,
                "session closed with a pending commit; discarded"
            );
        }
    }

    fn apply(&mut self, key: FieldKey, text: &str, parsed: Option<f64>) -> DeckResult<()> {
        match key {
            FieldKey::Label { row } => {
                if self.data.labels.len() <= row {
                    self.data.labels.resize(row + 1, String::new());
                }
                self.data.labels[row] = text.to_string();
            }
            FieldKey::SeriesName { series } => {
                let s = self.data.series.get_mut(series).ok_or_else(|| {
                    DeckError::validation(format!("series index {series} out of range"))
                })?;
                s.name = text.to_string();
            }
            FieldKey::Value { series, row } => {
                // An emptied field leaves the dataset alone until blur.
                if let Some(v) = parsed {
                    let s = self.data.series.get_mut(series).ok_or_else(|| {
                        DeckError::validation(format!("series index {series} out of range"))
                    })?;
                    if s.values.len() <= row {
                        s.values.resize(row + 1, 0.0);
                    }
                    s.values[row] = v;
                }
            }
        }
        Ok(())
    }
}

/// Copy one field from `from` into `to`, used to shield focused fields from
/// an external sync.
fn carry_field(from: &ChartData, to: &mut ChartData, key: FieldKey) {
    match key {
        FieldKey::Label { row } => {
            if let Some(label) = from.labels.get(row) {
                if to.labels.len() <= row {
                    to.labels.resize(row + 1, String::new());
                }
                to.labels[row] = label.clone();
            }
        }
        FieldKey::SeriesName { series } => {
            if let (Some(src), Some(dst)) = (from.series.get(series), to.series.get_mut(series)) {
                dst.name = src.name.clone();
            }
        }
        FieldKey::Value { series, row } => {
            if let (Some(src), Some(dst)) = (from.series.get(series), to.series.get_mut(series))
                && let Some(v) = src.values.get(row)
            {
                if dst.values.len() <= row {
                    dst.values.resize(row + 1, 0.0);
                }
                dst.values[row] = *v;
            }
        }
    }
}

/// Parse a numeric cell. Empty input means "no value yet"; anything else
/// must parse as a finite number and is clamped at zero.
fn parse_value(text: &str) -> DeckResult<Option<f64>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let v: f64 = trimmed
        .parse()
        .map_err(|_| DeckError::validation(format!("'{trimmed}' is not a number")))?;
    if !v.is_finite() {
        return Err(DeckError::validation("value must be finite"));
    }
    Ok(Some(v.max(0.0)))
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn fingerprint(data: &ChartData) -> DeckResult<String> {
    Ok(serde_json::to_string(data).context("serialize chart data for fingerprint")?)
}
