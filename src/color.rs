use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use rusty_spectra::remote::lines::LineSource;

// ---------------------------------------------------------------------------
// Colour assignment
// ---------------------------------------------------------------------------

/// Derived (comparison) spectra are always drawn in this colour.
pub const COMPARISON_COLOR: Color32 = Color32::from_rgb(240, 200, 60);

/// Colour of the `i`-th loaded spectrum. Hues step by the golden angle so
/// colours stay distinct as spectra are added, without re-colouring the
/// ones already shown.
pub fn spectrum_color(i: usize) -> Color32 {
    let hue = (i as f32 * 137.507_77) % 360.0;
    hsl_to_color32(Hsl::new(hue, 0.75, 0.55))
}

/// Reference-line markers: solid for catalog lines, muted for the bundled table.
pub fn line_color(source: LineSource) -> Color32 {
    match source {
        LineSource::Remote => Color32::from_rgb(120, 220, 255),
        LineSource::Fallback => Color32::from_rgb(170, 170, 190),
    }
}

fn hsl_to_color32(hsl: Hsl) -> Color32 {
    let rgb: Srgb = hsl.into_color();
    Color32::from_rgb(
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
    )
}
