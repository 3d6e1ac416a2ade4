use crate::{
    core::Rgba8,
    error::{DeckError, DeckResult},
};

/// One page of a presentation: a background plus an ordered list of elements.
///
/// Array order is paint order (index 0 painted first, later elements on top).
/// Slides are owned and mutated by the host document model; this crate only
/// reads them for the duration of one render call.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Gradient>,
}

/// Resolved background of a slide. Exactly one kind is ever painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Background<'a> {
    Image(&'a str),
    Gradient(&'a Gradient),
    Solid(Rgba8),
}

impl Slide {
    /// Resolve the mutually-exclusive background, checked in priority order:
    /// image, then gradient, then solid color, then the default white fill.
    pub fn background(&self) -> Background<'_> {
        if let Some(src) = self.background_image.as_deref() {
            return Background::Image(src);
        }
        if let Some(g) = self.gradient.as_ref() {
            return Background::Gradient(g);
        }
        if let Some(c) = self.background_color.as_deref() {
            return Background::Solid(Rgba8::from_hex_or_white(c));
        }
        Background::Solid(Rgba8::WHITE)
    }

    /// Structural checks run before a render; failure is fatal for that call.
    pub fn validate(&self) -> DeckResult<()> {
        if let Some(g) = &self.gradient {
            g.validate()?;
        }
        for el in &self.elements {
            el.validate()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Element {
    Text(TextElement),
    Shape(ShapeElement),
    Image(ImageElement),
    Chart(ChartElement),
    Table(TableElement),
}

/// Position, size and rotation shared by every element kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElementFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees, applied about the element center.
    #[serde(default)]
    pub rotation: f64,
}

impl ElementFrame {
    fn validate(&self, id: &str) -> DeckResult<()> {
        for (name, v) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
        ] {
            if !v.is_finite() {
                return Err(DeckError::validation(format!(
                    "element '{id}': {name} must be finite"
                )));
            }
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(DeckError::validation(format!(
                "element '{id}': width/height must be >= 0"
            )));
        }
        Ok(())
    }
}

impl Element {
    pub fn id(&self) -> &str {
        match self {
            Element::Text(e) => &e.id,
            Element::Shape(e) => &e.id,
            Element::Image(e) => &e.id,
            Element::Chart(e) => &e.id,
            Element::Table(e) => &e.id,
        }
    }

    pub fn frame(&self) -> ElementFrame {
        match self {
            Element::Text(e) => e.frame,
            Element::Shape(e) => e.frame,
            Element::Image(e) => e.frame,
            Element::Chart(e) => e.frame,
            Element::Table(e) => e.frame,
        }
    }

    pub fn validate(&self) -> DeckResult<()> {
        self.frame().validate(self.id())?;
        match self {
            Element::Chart(c) => c.data.validate(&c.id),
            Element::Table(t) => {
                if t.rows == 0 || t.cols == 0 {
                    return Err(DeckError::validation(format!(
                        "table '{}': rows and cols must be >= 1",
                        t.id
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub id: String,
    pub content: String,
    #[serde(flatten)]
    pub frame: ElementFrame,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub font_style: FontStyle,
    #[serde(default)]
    pub text_align: TextAlign,
    /// Hex color; absent means the default black.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_font_size() -> f64 {
    16.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeElement {
    pub id: String,
    pub shape_type: ShapeType,
    #[serde(flatten)]
    pub frame: ElementFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    /// Stroke width; 0 (the default) means no stroke is painted.
    #[serde(default)]
    pub border_width: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeType {
    Rectangle,
    RoundedRectangle,
    Circle,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    pub id: String,
    /// Opaque resource reference resolved through the `ResourceLoader`
    /// (typically a base64 data URL or a store-relative path).
    pub src: String,
    #[serde(flatten)]
    pub frame: ElementFrame,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartElement {
    pub id: String,
    pub chart_type: ChartType,
    #[serde(flatten)]
    pub frame: ElementFrame,
    #[serde(flatten)]
    pub data: ChartData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

/// Tabular numeric dataset behind a chart: category labels plus one or more
/// value series. Also the unit of state the edit session commits.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
    /// Per-datum color overrides; may be shorter than `values`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bar_colors: Vec<String>,
}

impl ChartData {
    pub fn validate(&self, id: &str) -> DeckResult<()> {
        if self.series.is_empty() {
            return Err(DeckError::validation(format!(
                "chart '{id}': at least one value series is required"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableElement {
    pub id: String,
    pub rows: u32,
    pub cols: u32,
    #[serde(flatten)]
    pub frame: ElementFrame,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradient {
    #[serde(rename = "type")]
    pub kind: GradientKind,
    /// Ordered hex colors; stops are implicit, evenly spaced by index
    /// (`i / (n - 1)`, or a single stop at 0 when there is one color).
    pub colors: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    Linear,
    Radial,
}

impl Gradient {
    pub fn validate(&self) -> DeckResult<()> {
        if self.colors.is_empty() {
            return Err(DeckError::validation(
                "gradient must carry at least one color",
            ));
        }
        Ok(())
    }

    /// Resolved stops as `(offset, color)` pairs in [0, 1].
    pub fn stops(&self) -> Vec<(f64, Rgba8)> {
        let n = self.colors.len();
        self.colors
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
                (t, Rgba8::from_hex_or_white(c))
            })
            .collect()
    }

    /// Color at normalized position `t`, interpolating between stops.
    pub fn sample(&self, t: f64) -> Rgba8 {
        let stops = self.stops();
        let t = t.clamp(0.0, 1.0);
        match stops.len() {
            0 => Rgba8::WHITE,
            1 => stops[0].1,
            _ => {
                for pair in stops.windows(2) {
                    let (t0, c0) = pair[0];
                    let (t1, c1) = pair[1];
                    if t <= t1 {
                        let local = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                        return c0.lerp(c1, local);
                    }
                }
                stops[stops.len() - 1].1
            }
        }
    }
}
