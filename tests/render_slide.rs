use std::{collections::HashMap, io::Cursor};

use deckshot::{
    ChartRasterizer, Compositor, DeckError, DeckResult, Element, RenderOptions, ResourceLoader,
    Slide, render_batch,
    model::{
        ChartData, ChartElement, ChartSeries, ChartType, ElementFrame, Gradient, GradientKind,
        ImageElement, ShapeElement, ShapeType,
    },
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn solid_png(r: u8, g: u8, b: u8, w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([r, g, b, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// In-memory loader keyed by reference string.
#[derive(Default)]
struct MemLoader {
    entries: HashMap<String, Vec<u8>>,
}

impl MemLoader {
    fn with(mut self, reference: &str, bytes: Vec<u8>) -> Self {
        self.entries.insert(reference.to_string(), bytes);
        self
    }
}

impl ResourceLoader for MemLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>> {
        self.entries
            .get(reference)
            .cloned()
            .ok_or_else(|| DeckError::resource(format!("unknown reference '{reference}'")))
    }
}

struct FailLoader;
impl ResourceLoader for FailLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>> {
        Err(DeckError::resource(format!("unavailable: {reference}")))
    }
}

struct FailCharts;
impl ChartRasterizer for FailCharts {
    fn rasterize(&self, _chart: &ChartElement, _width: u32, _height: u32) -> DeckResult<Vec<u8>> {
        Err(DeckError::resource("chart backend offline"))
    }
}

struct SolidCharts([u8; 3]);
impl ChartRasterizer for SolidCharts {
    fn rasterize(&self, _chart: &ChartElement, width: u32, height: u32) -> DeckResult<Vec<u8>> {
        Ok(solid_png(self.0[0], self.0[1], self.0[2], width, height))
    }
}

fn slide(id: &str) -> Slide {
    Slide {
        id: id.to_string(),
        elements: vec![],
        background_color: None,
        background_image: None,
        gradient: None,
    }
}

fn full_rect(id: &str, fill: &str) -> Element {
    Element::Shape(ShapeElement {
        id: id.to_string(),
        shape_type: ShapeType::Rectangle,
        frame: ElementFrame {
            x: 0.0,
            y: 0.0,
            width: 1024.0,
            height: 576.0,
            rotation: 0.0,
        },
        fill_color: Some(fill.to_string()),
        border_color: None,
        border_width: 0.0,
    })
}

fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

fn assert_pixel_near(img: &image::RgbaImage, x: u32, y: u32, rgb: [u8; 3]) {
    let p = img.get_pixel(x, y);
    for i in 0..3 {
        let d = (i16::from(p[i]) - i16::from(rgb[i])).unsigned_abs();
        assert!(
            d <= 3,
            "pixel ({x}, {y}) channel {i} was {} but expected ~{}",
            p[i],
            rgb[i]
        );
    }
    assert_eq!(p[3], 255, "thumbnail pixels must be opaque");
}

#[test]
fn solid_background_fills_the_thumbnail_at_quarter_scale() {
    init_tracing();
    let mut slide = slide("s1");
    slide.background_color = Some("#ff0000".to_string());

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    let img = decode(&png);
    assert_eq!(img.dimensions(), (256, 144));
    assert_pixel_near(&img, 128, 72, [255, 0, 0]);
    assert_pixel_near(&img, 2, 2, [255, 0, 0]);
}

#[test]
fn background_image_wins_over_color() {
    init_tracing();
    let mut slide = slide("s1");
    slide.background_color = Some("#ff0000".to_string());
    slide.background_image = Some("bg".to_string());

    let loader = MemLoader::default().with("bg", solid_png(0, 0, 255, 4, 4));
    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &loader, &FailCharts, &RenderOptions::default())
        .unwrap();

    assert_pixel_near(&decode(&png), 128, 72, [0, 0, 255]);
}

#[test]
fn failed_background_image_falls_back_to_the_next_priority() {
    init_tracing();
    let mut slide = slide("s1");
    slide.background_color = Some("#00ff00".to_string());
    slide.background_image = Some("missing".to_string());

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    assert_pixel_near(&decode(&png), 128, 72, [0, 255, 0]);
}

#[test]
fn gradient_background_interpolates_along_the_diagonal() {
    init_tracing();
    let mut slide = slide("s1");
    slide.gradient = Some(Gradient {
        kind: GradientKind::Linear,
        colors: vec!["#000000".to_string(), "#ffffff".to_string()],
    });

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    let img = decode(&png);
    let top_left = img.get_pixel(1, 1)[0];
    let bottom_right = img.get_pixel(254, 142)[0];
    assert!(top_left < 30, "top-left should be near the first stop");
    assert!(bottom_right > 225, "bottom-right should be near the last stop");
}

#[test]
fn later_elements_paint_over_earlier_ones() {
    init_tracing();
    let mut slide = slide("s1");
    slide.elements = vec![full_rect("under", "#ff0000"), full_rect("over", "#0000ff")];

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    assert_pixel_near(&decode(&png), 128, 72, [0, 0, 255]);
}

#[test]
fn failed_image_element_is_skipped_not_fatal() {
    init_tracing();
    let mut slide = slide("s1");
    slide.background_color = Some("#ff0000".to_string());
    slide.elements = vec![Element::Image(ImageElement {
        id: "img".to_string(),
        src: "missing".to_string(),
        frame: ElementFrame {
            x: 0.0,
            y: 0.0,
            width: 1024.0,
            height: 576.0,
            rotation: 0.0,
        },
    })];

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    // The broken image leaves the background visible.
    assert_pixel_near(&decode(&png), 128, 72, [255, 0, 0]);
}

fn chart(id: &str) -> Element {
    Element::Chart(ChartElement {
        id: id.to_string(),
        chart_type: ChartType::Bar,
        frame: ElementFrame {
            x: 212.0,
            y: 88.0,
            width: 600.0,
            height: 400.0,
            rotation: 0.0,
        },
        data: ChartData {
            labels: vec!["a".to_string()],
            series: vec![ChartSeries {
                name: "s".to_string(),
                values: vec![1.0],
                bar_colors: vec![],
            }],
        },
    })
}

#[test]
fn chart_renders_through_the_rasterizer() {
    init_tracing();
    let mut slide = slide("s1");
    slide.elements = vec![chart("c1")];

    let mut compositor = Compositor::new();
    let png = compositor
        .render(
            &slide,
            &FailLoader,
            &SolidCharts([255, 0, 255]),
            &RenderOptions::default(),
        )
        .unwrap();

    assert_pixel_near(&decode(&png), 128, 72, [255, 0, 255]);
}

#[test]
fn chart_failure_paints_a_placeholder() {
    init_tracing();
    let mut slide = slide("s1");
    slide.elements = vec![chart("c1")];

    let mut compositor = Compositor::new();
    let png = compositor
        .render(&slide, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();

    // Placeholder interior is a flat light gray.
    assert_pixel_near(&decode(&png), 128, 72, [240, 240, 240]);
}

#[test]
fn batch_skips_malformed_slides_and_keeps_deck_order() {
    init_tracing();
    let mut bad = slide("s3");
    bad.gradient = Some(Gradient {
        kind: GradientKind::Linear,
        colors: vec![],
    });

    let slides = vec![slide("s1"), slide("s2"), bad, slide("s4"), slide("s5")];

    let mut compositor = Compositor::new();
    let thumbs = render_batch(
        &mut compositor,
        &slides,
        &FailLoader,
        &FailCharts,
        &RenderOptions::default(),
    );

    let ids: Vec<&str> = thumbs.iter().map(|t| t.slide_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s4", "s5"]);
    assert!(thumbs.iter().all(|t| !t.png.is_empty()));
}

#[test]
fn compositor_is_reusable_after_a_failed_render() {
    init_tracing();
    let mut bad = slide("bad");
    bad.gradient = Some(Gradient {
        kind: GradientKind::Radial,
        colors: vec![],
    });

    let mut compositor = Compositor::new();
    assert!(
        compositor
            .render(&bad, &FailLoader, &FailCharts, &RenderOptions::default())
            .is_err()
    );

    let mut ok = slide("ok");
    ok.background_color = Some("#0000ff".to_string());
    let png = compositor
        .render(&ok, &FailLoader, &FailCharts, &RenderOptions::default())
        .unwrap();
    assert_pixel_near(&decode(&png), 128, 72, [0, 0, 255]);
}

#[test]
fn custom_scale_controls_output_size() {
    init_tracing();
    let mut s = slide("s1");
    s.background_color = Some("#123456".to_string());

    let opts = RenderOptions {
        width: 640,
        height: 360,
        scale: 0.5,
    };
    let mut compositor = Compositor::new();
    let png = compositor.render(&s, &FailLoader, &FailCharts, &opts).unwrap();
    assert_eq!(decode(&png).dimensions(), (320, 180));
}
