//! Headless core of a slide-deck editor: a CPU scene compositor that turns
//! slides into PNG thumbnails, and a debounced edit-session controller for
//! chart data.
//!
//! The compositor renders each slide onto a fixed working surface via
//! [`vello_cpu`], resolving external resources through pluggable loader
//! traits, and downscales the result into an encoded thumbnail. The edit
//! session tracks keystroke-level changes to a chart dataset, collapses them
//! into debounced commits, and guarantees exactly one undo snapshot per
//! burst of edits.
#![forbid(unsafe_code)]

pub mod assets;
pub mod batch;
pub mod burst;
pub mod compositor;
pub mod core;
pub mod error;
pub mod model;
pub mod session;

mod text;

pub use crate::{
    assets::{ChartRasterizer, DataUrlLoader, DeadlineLoader, FsLoader, ResourceLoader},
    batch::{SlideThumbnail, render_batch},
    burst::{CommitSink, SnapshotGate},
    compositor::{Compositor, RenderOptions},
    core::{Rgba8, THUMB_SCALE, THUMB_SURFACE_H, THUMB_SURFACE_W},
    error::{DeckError, DeckResult},
    model::{ChartData, ChartSeries, Element, Slide},
    session::{DEBOUNCE_QUIET, EditSession, FieldKey},
};
