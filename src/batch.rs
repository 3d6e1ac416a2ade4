use crate::{
    assets::{ChartRasterizer, ResourceLoader},
    compositor::{Compositor, RenderOptions},
    model::Slide,
};

/// One successfully rendered deck entry.
#[derive(Clone, Debug)]
pub struct SlideThumbnail {
    pub slide_id: String,
    pub png: Vec<u8>,
}

/// Render thumbnails for a whole deck, sequentially and in deck order.
///
/// The batch never fails as a whole: a slide whose render errors is logged
/// and dropped from the output, so one malformed slide cannot blank the
/// filmstrip for the rest of the deck.
#[tracing::instrument(skip_all, fields(slides = slides.len()))]
pub fn render_batch(
    compositor: &mut Compositor,
    slides: &[Slide],
    loader: &dyn ResourceLoader,
    charts: &dyn ChartRasterizer,
    opts: &RenderOptions,
) -> Vec<SlideThumbnail> {
    let mut out = Vec::with_capacity(slides.len());
    for slide in slides {
        match compositor.render(slide, loader, charts, opts) {
            Ok(png) => out.push(SlideThumbnail {
                slide_id: slide.id.clone(),
                png,
            }),
            Err(err) => {
                tracing::warn!(slide = %slide.id, error = %err, "slide failed to render; skipped");
            }
        }
    }
    out
}
