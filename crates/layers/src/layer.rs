use crate::query::FilterExpr;
use crate::symbology::{FillPaint, LinePaint};

/// Data feeding one or more map layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Tiled vector data (e.g. the shared community polygons).
    Vector { url: String },
    /// Inline GeoJSON (overlays such as an accepted drawing).
    GeoJson { data: geojson::GeoJson },
    /// Raster tiles (e.g. a percent-difference reference layer).
    Raster { tiles: Vec<String>, tile_size: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Fill(FillPaint),
    Line(LinePaint),
    Raster { opacity: f32 },
}

/// A rendered layer on the map surface.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    /// Layer inside a vector tile source.
    pub source_layer: Option<String>,
    pub paint: Paint,
    pub filter: Option<FilterExpr>,
}

impl LayerSpec {
    pub fn fill(id: impl Into<String>, source: impl Into<String>, paint: FillPaint) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_layer: None,
            paint: Paint::Fill(paint),
            filter: None,
        }
    }

    pub fn line(id: impl Into<String>, source: impl Into<String>, paint: LinePaint) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_layer: None,
            paint: Paint::Line(paint),
            filter: None,
        }
    }

    pub fn raster(id: impl Into<String>, source: impl Into<String>, opacity: f32) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_layer: None,
            paint: Paint::Raster { opacity },
            filter: None,
        }
    }

    pub fn with_source_layer(mut self, source_layer: impl Into<String>) -> Self {
        self.source_layer = Some(source_layer.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }
}
