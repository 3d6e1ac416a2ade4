use crate::{
    core::Rgba8,
    error::{DeckError, DeckResult},
    model::{FontStyle, FontWeight, TextAlign},
};

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl From<Rgba8> for TextBrushRgba8 {
    fn from(c: Rgba8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

/// Resolved styling for one text block, after model defaults are applied.
#[derive(Clone, Debug)]
pub(crate) struct TextBlockStyle {
    pub(crate) family: Option<String>,
    pub(crate) size_px: f32,
    pub(crate) brush: TextBrushRgba8,
    pub(crate) align: TextAlign,
    pub(crate) weight: FontWeight,
    pub(crate) style: FontStyle,
    /// Wrap width in pixels (the element's box width).
    pub(crate) max_width_px: f32,
}

/// Stateful helper for shaping and line-breaking slide text with Parley,
/// backed by the system font collection.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub(crate) fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out one text block: wrapped at the box width, aligned
    /// horizontally per style, vertical alignment top (lines start at y=0).
    pub(crate) fn layout_block(
        &mut self,
        text: &str,
        style: &TextBlockStyle,
    ) -> DeckResult<parley::Layout<TextBrushRgba8>> {
        if !style.size_px.is_finite() || style.size_px <= 0.0 {
            return Err(DeckError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let stack = match &style.family {
            Some(family) => parley::style::FontStack::Source(std::borrow::Cow::Owned(format!(
                "{family}, sans-serif"
            ))),
            None => parley::style::FontStack::Source(std::borrow::Cow::Borrowed("sans-serif")),
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(stack));
        builder.push_default(parley::style::StyleProperty::FontSize(style.size_px));
        builder.push_default(parley::style::StyleProperty::Brush(style.brush));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            match style.weight {
                FontWeight::Normal => parley::style::FontWeight::NORMAL,
                FontWeight::Bold => parley::style::FontWeight::BOLD,
            },
        ));
        builder.push_default(parley::style::StyleProperty::FontStyle(match style.style {
            FontStyle::Normal => parley::style::FontStyle::Normal,
            FontStyle::Italic => parley::style::FontStyle::Italic,
        }));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        let width = style.max_width_px.max(0.0);
        layout.break_all_lines(Some(width));
        layout.align(
            Some(width),
            match style.align {
                TextAlign::Left => parley::Alignment::Start,
                TextAlign::Center => parley::Alignment::Center,
                TextAlign::Right => parley::Alignment::End,
                TextAlign::Justify => parley::Alignment::Justify,
            },
            parley::AlignmentOptions::default(),
        );

        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(align: TextAlign) -> TextBlockStyle {
        TextBlockStyle {
            family: None,
            size_px: 16.0,
            brush: TextBrushRgba8::from(Rgba8::BLACK),
            align,
            weight: FontWeight::Normal,
            style: FontStyle::Normal,
            max_width_px: 200.0,
        }
    }

    #[test]
    fn layout_block_accepts_plain_text() {
        let mut engine = TextLayoutEngine::new();
        let layout = engine
            .layout_block("hello world", &style(TextAlign::Left))
            .unwrap();
        // Line breaking ran; glyph content depends on fonts available in the
        // environment, so only the structure is asserted here.
        assert!(layout.width() >= 0.0);
    }

    #[test]
    fn layout_block_rejects_bad_size() {
        let mut engine = TextLayoutEngine::new();
        let mut s = style(TextAlign::Center);
        s.size_px = 0.0;
        assert!(engine.layout_block("x", &s).is_err());
        s.size_px = f32::NAN;
        assert!(engine.layout_block("x", &s).is_err());
    }
}
