use std::io::Cursor;
use std::sync::Arc;

use kurbo::Shape;

use crate::{
    assets::{
        ChartRasterizer, ResourceLoader,
        decode::{PreparedImage, decode_image},
    },
    core::{
        Affine, Rgba8, THUMB_SCALE, THUMB_SURFACE_H, THUMB_SURFACE_W, unpremultiply_rgba8_in_place,
    },
    error::{DeckError, DeckResult},
    model::{
        Background, ChartElement, Element, ElementFrame, Gradient, GradientKind, ShapeElement,
        ShapeType, Slide, TableElement, TextElement,
    },
    text::{TextBlockStyle, TextBrushRgba8, TextLayoutEngine},
};

/// Output geometry for one render call.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    /// Working-surface width in canvas units.
    pub width: u32,
    /// Working-surface height in canvas units.
    pub height: u32,
    /// Downscale applied when encoding (1.0 keeps the working size).
    pub scale: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: THUMB_SURFACE_W,
            height: THUMB_SURFACE_H,
            scale: THUMB_SCALE,
        }
    }
}

/// An element's asynchronously resolved raster contribution, held in a slot
/// indexed by the element's array position so paint order never depends on
/// resolution order.
enum ResolvedLayer {
    Raster(PreparedImage),
    /// Chart rasterization failed; a neutral placeholder is painted instead.
    ChartPlaceholder,
}

/// Per-call resolution results: the background bitmap (when the slide has an
/// image background that loaded) plus one fixed slot per element.
struct ResolvedScene {
    background: Option<PreparedImage>,
    layers: Vec<Option<ResolvedLayer>>,
}

/// Rasterizes slides into encoded PNG thumbnails via `vello_cpu`.
///
/// The compositor holds no slide state across calls; the render context is
/// reused between calls purely as an allocation cache and is dropped (never
/// left holding a frame) on any error path.
pub struct Compositor {
    ctx: Option<vello_cpu::RenderContext>,
    text_engine: TextLayoutEngine,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            ctx: None,
            text_engine: TextLayoutEngine::new(),
        }
    }

    /// Render one slide to encoded PNG bytes.
    ///
    /// Individual element failures (bad resource, malformed element) are logged
    /// and skipped; the call only fails when the slide itself is malformed or
    /// the working surface cannot be acquired.
    pub fn render(
        &mut self,
        slide: &Slide,
        loader: &dyn ResourceLoader,
        charts: &dyn ChartRasterizer,
        opts: &RenderOptions,
    ) -> DeckResult<Vec<u8>> {
        slide
            .validate()
            .map_err(|e| DeckError::render(format!("slide '{}': {e}", slide.id)))?;

        let (w, h) = surface_dims(opts)?;
        let mut pixmap = vello_cpu::Pixmap::new(w, h);

        let resolved = self.resolve_scene(slide, loader, charts, opts);

        self.with_ctx_mut(w, h, |this, ctx| {
            this.paint_background(ctx, slide, resolved.background, opts)?;

            for (i, element) in slide.elements.iter().enumerate() {
                let layer = resolved.layers.get(i).and_then(|slot| slot.as_ref());
                if let Err(err) = this.draw_element(ctx, element, layer) {
                    tracing::warn!(
                        slide = %slide.id,
                        element = %element.id(),
                        error = %err,
                        "skipping element that failed to render"
                    );
                }
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
            Ok(())
        })?;

        encode_thumbnail(&pixmap, opts)
    }

    /// Resolve every asynchronous resource into its element's fixed slot.
    ///
    /// Resolution happens before painting and is infallible at scene level:
    /// a failed image leaves its slot empty (element skipped) and a failed
    /// chart marks its slot for the placeholder.
    fn resolve_scene(
        &mut self,
        slide: &Slide,
        loader: &dyn ResourceLoader,
        charts: &dyn ChartRasterizer,
        opts: &RenderOptions,
    ) -> ResolvedScene {
        let background = match slide.background() {
            Background::Image(src) => match load_raster(loader, src) {
                Ok(img) => Some(img),
                Err(err) => {
                    tracing::warn!(
                        slide = %slide.id,
                        error = %err,
                        "background image failed to load; falling back"
                    );
                    None
                }
            },
            _ => None,
        };

        let layers = slide
            .elements
            .iter()
            .map(|element| match element {
                Element::Image(el) => match load_raster(loader, &el.src) {
                    Ok(img) => Some(ResolvedLayer::Raster(img)),
                    Err(err) => {
                        tracing::warn!(
                            slide = %slide.id,
                            element = %el.id,
                            error = %err,
                            "image resource failed; element will be skipped"
                        );
                        None
                    }
                },
                Element::Chart(el) => match rasterize_chart(charts, el, opts) {
                    Ok(img) => Some(ResolvedLayer::Raster(img)),
                    Err(err) => {
                        tracing::warn!(
                            slide = %slide.id,
                            element = %el.id,
                            error = %err,
                            "chart rasterization failed; painting placeholder"
                        );
                        Some(ResolvedLayer::ChartPlaceholder)
                    }
                },
                _ => None,
            })
            .collect();

        ResolvedScene { background, layers }
    }

    fn paint_background(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        slide: &Slide,
        resolved_image: Option<PreparedImage>,
        opts: &RenderOptions,
    ) -> DeckResult<()> {
        let (w, h) = (f64::from(opts.width), f64::from(opts.height));

        if let Some(img) = resolved_image {
            // Stretched to the full surface.
            let paint = image_paint(&img)?;
            let scale = Affine::scale_non_uniform(
                w / f64::from(img.width.max(1)),
                h / f64::from(img.height.max(1)),
            );
            ctx.set_transform(affine_to_cpu(scale));
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(img.width),
                f64::from(img.height),
            ));
            return Ok(());
        }

        let bg = match slide.background() {
            // Image load already failed above; fall back to the next
            // background in priority order.
            Background::Image(_) => non_image_background(slide),
            other => other,
        };
        match bg {
            // Not produced by `non_image_background`.
            Background::Image(_) => fill_surface(ctx, Rgba8::WHITE, w, h),
            Background::Gradient(g) => {
                let bitmap = gradient_bitmap(g, opts.width, opts.height);
                let paint = image_paint(&bitmap)?;
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
            }
            Background::Solid(c) => {
                fill_surface(ctx, c, w, h);
            }
        }
        Ok(())
    }

    fn draw_element(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        element: &Element,
        layer: Option<&ResolvedLayer>,
    ) -> DeckResult<()> {
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        match element {
            Element::Text(el) => self.draw_text(ctx, el),
            Element::Shape(el) => draw_shape(ctx, el),
            Element::Image(el) => match layer {
                Some(ResolvedLayer::Raster(img)) => draw_raster(ctx, el.frame, img),
                // Resource failed to resolve; the element is skipped without
                // aborting the render.
                _ => Ok(()),
            },
            Element::Chart(el) => match layer {
                Some(ResolvedLayer::Raster(img)) => draw_raster(ctx, el.frame, img),
                Some(ResolvedLayer::ChartPlaceholder) => draw_chart_placeholder(ctx, el),
                None => Ok(()),
            },
            Element::Table(el) => draw_table(ctx, el),
        }
    }

    fn draw_text(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        el: &TextElement,
    ) -> DeckResult<()> {
        let color = el
            .color
            .as_deref()
            .map(Rgba8::from_hex_or_white)
            .unwrap_or(Rgba8::BLACK);
        let style = TextBlockStyle {
            family: el.font_family.clone(),
            size_px: el.font_size as f32,
            brush: TextBrushRgba8::from(color),
            align: el.text_align,
            weight: el.font_weight,
            style: el.font_style,
            max_width_px: el.frame.width as f32,
        };
        let layout = self.text_engine.layout_block(&el.content, &style)?;

        ctx.set_transform(affine_to_cpu(frame_transform(&el.frame)));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let run = glyph_run.run();
                let font = run.font().clone();
                let brush = glyph_run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let mut x = glyph_run.offset();
                let baseline = glyph_run.baseline();
                let glyphs: Vec<vello_cpu::Glyph> = glyph_run
                    .glyphs()
                    .map(|g| {
                        let gx = x + g.x;
                        let gy = baseline - g.y;
                        x += g.advance;
                        vello_cpu::Glyph {
                            id: g.id,
                            x: gx,
                            y: gy,
                        }
                    })
                    .collect();
                ctx.glyph_run(&font)
                    .font_size(run.font_size())
                    .fill_glyphs(glyphs.into_iter());
            }
        }
        Ok(())
    }

    /// Take-or-create pattern for the reusable render context. The context
    /// is intentionally not restored when `f` fails, so a poisoned context
    /// can never leak into the next call.
    fn with_ctx_mut<R>(
        &mut self,
        width: u16,
        height: u16,
        f: impl FnOnce(&mut Self, &mut vello_cpu::RenderContext) -> DeckResult<R>,
    ) -> DeckResult<R> {
        let mut ctx = match self.ctx.take() {
            None => vello_cpu::RenderContext::new(width, height),
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            Some(_) => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        let out = f(self, &mut ctx)?;
        self.ctx = Some(ctx);
        Ok(out)
    }
}

/// Background resolution with the image rung skipped, used after an image
/// background fails to load.
fn non_image_background(slide: &Slide) -> Background<'_> {
    if let Some(g) = slide.gradient.as_ref() {
        return Background::Gradient(g);
    }
    if let Some(c) = slide.background_color.as_deref() {
        return Background::Solid(Rgba8::from_hex_or_white(c));
    }
    Background::Solid(Rgba8::WHITE)
}

fn surface_dims(opts: &RenderOptions) -> DeckResult<(u16, u16)> {
    if opts.width == 0 || opts.height == 0 {
        return Err(DeckError::render("surface width/height must be > 0"));
    }
    let w: u16 = opts
        .width
        .try_into()
        .map_err(|_| DeckError::render("surface width exceeds u16"))?;
    let h: u16 = opts
        .height
        .try_into()
        .map_err(|_| DeckError::render("surface height exceeds u16"))?;
    if !(opts.scale.is_finite() && opts.scale > 0.0 && opts.scale <= 1.0) {
        return Err(DeckError::render("encode scale must be in (0, 1]"));
    }
    Ok((w, h))
}

fn load_raster(loader: &dyn ResourceLoader, reference: &str) -> DeckResult<PreparedImage> {
    let bytes = loader.load_image(reference)?;
    decode_image(&bytes)
}

fn rasterize_chart(
    charts: &dyn ChartRasterizer,
    el: &ChartElement,
    opts: &RenderOptions,
) -> DeckResult<PreparedImage> {
    let w = el.frame.width.round().clamp(1.0, f64::from(opts.width)) as u32;
    let h = el.frame.height.round().clamp(1.0, f64::from(opts.height)) as u32;
    let bytes = charts.rasterize(el, w, h)?;
    decode_image(&bytes)
}

/// Element-local to surface transform: translate to (x, y), then rotate
/// about the element center.
fn frame_transform(frame: &ElementFrame) -> Affine {
    let place = Affine::translate((frame.x, frame.y));
    if frame.rotation == 0.0 {
        return place;
    }
    let center = kurbo::Point::new(frame.x + frame.width / 2.0, frame.y + frame.height / 2.0);
    Affine::rotate_about(frame.rotation.to_radians(), center) * place
}

fn fill_surface(ctx: &mut vello_cpu::RenderContext, color: Rgba8, w: f64, h: f64) {
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        color.r, color.g, color.b, color.a,
    ));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
}

fn draw_raster(
    ctx: &mut vello_cpu::RenderContext,
    frame: ElementFrame,
    img: &PreparedImage,
) -> DeckResult<()> {
    if frame.width <= 0.0 || frame.height <= 0.0 {
        return Ok(());
    }
    let paint = image_paint(img)?;
    let fit = Affine::scale_non_uniform(
        frame.width / f64::from(img.width.max(1)),
        frame.height / f64::from(img.height.max(1)),
    );
    ctx.set_transform(affine_to_cpu(frame_transform(&frame) * fit));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(img.width),
        f64::from(img.height),
    ));
    Ok(())
}

fn draw_shape(ctx: &mut vello_cpu::RenderContext, el: &ShapeElement) -> DeckResult<()> {
    let (w, h) = (el.frame.width, el.frame.height);
    if w <= 0.0 || h <= 0.0 {
        return Ok(());
    }
    ctx.set_transform(affine_to_cpu(frame_transform(&el.frame)));

    let path = shape_path(el.shape_type, w, h);

    if let Some(fill) = el.fill_color.as_deref() {
        let c = Rgba8::from_hex_or_white(fill);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
        ctx.fill_path(&path);
    }

    // Stroke width 0 / missing color means no visible stroke.
    if el.border_width > 0.0
        && let Some(border) = el.border_color.as_deref()
    {
        let c = Rgba8::from_hex_or_white(border);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
        ctx.set_stroke(vello_cpu::kurbo::Stroke::new(el.border_width));
        ctx.stroke_path(&path);
    }
    Ok(())
}

fn shape_path(kind: ShapeType, w: f64, h: f64) -> vello_cpu::kurbo::BezPath {
    match kind {
        ShapeType::Rectangle => {
            bezpath_to_cpu(&kurbo::Rect::new(0.0, 0.0, w, h).to_path(0.1))
        }
        ShapeType::RoundedRectangle => {
            let radius = (w.min(h) * 0.1).clamp(2.0, 24.0);
            bezpath_to_cpu(&kurbo::RoundedRect::new(0.0, 0.0, w, h, radius).to_path(0.1))
        }
        ShapeType::Circle => {
            // Centered in the bounding box with radius min(w, h) / 2.
            let r = w.min(h) / 2.0;
            bezpath_to_cpu(&kurbo::Circle::new((w / 2.0, h / 2.0), r).to_path(0.1))
        }
    }
}

fn draw_chart_placeholder(
    ctx: &mut vello_cpu::RenderContext,
    el: &ChartElement,
) -> DeckResult<()> {
    let (w, h) = (el.frame.width, el.frame.height);
    if w <= 0.0 || h <= 0.0 {
        return Ok(());
    }
    ctx.set_transform(affine_to_cpu(frame_transform(&el.frame)));

    // Neutral flat fill with a thin border.
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(240, 240, 240, 255));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(190, 190, 190, 255));
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(1.0));
    ctx.stroke_path(&bezpath_to_cpu(
        &kurbo::Rect::new(0.5, 0.5, w - 0.5, h - 0.5).to_path(0.1),
    ));
    Ok(())
}

fn draw_table(ctx: &mut vello_cpu::RenderContext, el: &TableElement) -> DeckResult<()> {
    let (w, h) = (el.frame.width, el.frame.height);
    if w <= 0.0 || h <= 0.0 {
        return Ok(());
    }
    ctx.set_transform(affine_to_cpu(frame_transform(&el.frame)));
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(153, 153, 153, 255));
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(1.0));

    // Outline plus evenly spaced interior grid lines; no cell contents in a
    // thumbnail.
    ctx.stroke_path(&bezpath_to_cpu(
        &kurbo::Rect::new(0.0, 0.0, w, h).to_path(0.1),
    ));

    let mut grid = kurbo::BezPath::new();
    for row in 1..el.rows {
        let y = h * f64::from(row) / f64::from(el.rows);
        grid.move_to((0.0, y));
        grid.line_to((w, y));
    }
    for col in 1..el.cols {
        let x = w * f64::from(col) / f64::from(el.cols);
        grid.move_to((x, 0.0));
        grid.line_to((x, h));
    }
    if !grid.elements().is_empty() {
        ctx.stroke_path(&bezpath_to_cpu(&grid));
    }
    Ok(())
}

/// Generate the gradient background as an opaque premultiplied bitmap, the
/// stop ramp pre-sampled into a small LUT.
///
/// Linear runs corner to corner, (0,0) to (W,H); radial is centered with
/// inner radius 0 and outer radius max(W,H). Positions are normalized over
/// pixel indices so the first and last pixels of the ramp land exactly on
/// the end stops and the radial center pixel is exactly the first stop.
fn gradient_bitmap(g: &Gradient, width: u32, height: u32) -> PreparedImage {
    const LUT_N: usize = 256;
    let lut: Vec<Rgba8> = (0..LUT_N)
        .map(|i| g.sample(i as f64 / (LUT_N - 1) as f64))
        .collect();

    let (wm1, hm1) = (f64::from(width) - 1.0, f64::from(height) - 1.0);
    let diag_sq = wm1 * wm1 + hm1 * hm1;
    let radius = f64::from(width.max(height));
    let mut bytes = vec![0u8; (width as usize) * (height as usize) * 4];
    for y in 0..height {
        for x in 0..width {
            let t = match g.kind {
                GradientKind::Linear => {
                    // Projection onto the top-left to bottom-right axis.
                    if diag_sq > 0.0 {
                        (f64::from(x) * wm1 + f64::from(y) * hm1) / diag_sq
                    } else {
                        0.0
                    }
                }
                GradientKind::Radial => {
                    let dx = f64::from(x) - wm1 / 2.0;
                    let dy = f64::from(y) - hm1 / 2.0;
                    (dx * dx + dy * dy).sqrt() / radius
                }
            };
            let c = lut[((t.clamp(0.0, 1.0) * (LUT_N - 1) as f64).round()) as usize];
            let idx = ((y as usize) * (width as usize) + (x as usize)) * 4;
            bytes[idx..idx + 4].copy_from_slice(&[c.r, c.g, c.b, c.a]);
        }
    }

    PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(bytes),
    }
}

fn image_paint(img: &PreparedImage) -> DeckResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(&img.rgba8_premul, img.width, img.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> DeckResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| DeckError::resource("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| DeckError::resource("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(DeckError::resource("pixmap byte len mismatch"));
    }
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Unpremultiply, downscale and PNG-encode the rendered surface.
fn encode_thumbnail(pixmap: &vello_cpu::Pixmap, opts: &RenderOptions) -> DeckResult<Vec<u8>> {
    let mut bytes = pixmap.data_as_u8_slice().to_vec();
    unpremultiply_rgba8_in_place(&mut bytes);

    let img = image::RgbaImage::from_raw(opts.width, opts.height, bytes)
        .ok_or_else(|| DeckError::render("surface buffer size mismatch"))?;

    let out_w = ((f64::from(opts.width) * opts.scale).round() as u32).max(1);
    let out_h = ((f64::from(opts.height) * opts.scale).round() as u32).max(1);
    let scaled = if out_w == opts.width && out_h == opts.height {
        img
    } else {
        image::imageops::resize(&img, out_w, out_h, image::imageops::FilterType::Triangle)
    };

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(scaled)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| DeckError::render(format!("png encode failed: {e}")))?;
    Ok(buf)
}
