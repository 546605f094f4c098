/// Fill paint for polygon layers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FillPaint {
    pub color: [f32; 4],
    pub opacity: f32,
}

/// Line paint for outlines.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinePaint {
    pub color: [f32; 4],
    pub width_px: f32,
}

impl FillPaint {
    pub const fn new(color: [f32; 4], opacity: f32) -> Self {
        Self { color, opacity }
    }
}

impl LinePaint {
    pub const fn new(color: [f32; 4], width_px: f32) -> Self {
        Self { color, width_px }
    }
}

/// Community polygons as rendered before any selection.
pub const COMMUNITY_FILL: FillPaint = FillPaint::new([0.20, 0.45, 0.70, 1.0], 0.15);

/// Selected feature highlight.
pub const HIGHLIGHT_FILL: FillPaint = FillPaint::new([0.98, 0.75, 0.18, 1.0], 0.55);

/// Persistent overlay of an accepted freehand drawing.
pub const DRAWN_AREA_FILL: FillPaint = FillPaint::new([0.93, 0.33, 0.23, 1.0], 0.2);
pub const DRAWN_AREA_LINE: LinePaint = LinePaint::new([0.93, 0.33, 0.23, 1.0], 2.0);

/// Percent-difference reference raster.
pub const REFERENCE_RASTER_OPACITY: f32 = 0.75;
