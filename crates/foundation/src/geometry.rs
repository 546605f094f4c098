//! Geometry primitives shared by the map surface, selection strategies and
//! analysis configuration.
//!
//! Geometries travel as GeoJSON (`geojson::Geometry`) because that is what the
//! map surface and the backend exchange; planar/geodesic math converts to
//! `geo` types on demand.

use geo::{Centroid, ChamberlainDuquetteArea, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Square meters per square kilometer.
pub const SQ_M_PER_SQ_KM: f64 = 1_000_000.0;

/// Geographic position in degrees (WGS84).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Pixel position on the map canvas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned pixel rectangle (inclusive).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenRect {
    pub min: ScreenPoint,
    pub max: ScreenPoint,
}

impl ScreenRect {
    pub fn new(min: ScreenPoint, max: ScreenPoint) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// True for Polygon and MultiPolygon geometries.
pub fn is_areal(geometry: &geojson::Geometry) -> bool {
    matches!(
        geometry.value,
        geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
    )
}

/// Collects every polygon of the given geometries into one multipolygon.
///
/// Polygons are gathered, not dissolved: overlapping parts stay separate
/// members. Non-areal and malformed geometries are skipped. Returns `None`
/// when nothing areal remains.
pub fn combine_polygons<'a, I>(geometries: I) -> Option<MultiPolygon<f64>>
where
    I: IntoIterator<Item = &'a geojson::Geometry>,
{
    let mut polygons = Vec::new();
    for g in geometries {
        if !is_areal(g) {
            continue;
        }
        match geo::Geometry::<f64>::try_from(g.clone()) {
            Ok(geo::Geometry::Polygon(p)) => polygons.push(p),
            Ok(geo::Geometry::MultiPolygon(mp)) => polygons.extend(mp.0),
            _ => continue,
        }
    }
    if polygons.is_empty() {
        return None;
    }
    Some(MultiPolygon(polygons))
}

/// Geodesic area in square meters (spherical approximation).
pub fn geodesic_area_m2(shape: &MultiPolygon<f64>) -> f64 {
    shape
        .0
        .iter()
        .map(|p| p.chamberlain_duquette_unsigned_area())
        .sum()
}

/// Area centroid, if the shape is non-degenerate.
pub fn centroid(shape: &MultiPolygon<f64>) -> Option<LngLat> {
    let c = shape.centroid()?;
    Some(LngLat::new(c.x(), c.y()))
}

pub fn multipolygon_to_geojson(shape: &MultiPolygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(shape))
}

/// Closed square ring around `center` with half-size `half_deg`, as GeoJSON.
pub fn square_polygon(center: LngLat, half_deg: f64) -> geojson::Geometry {
    let (x0, x1) = (center.lng - half_deg, center.lng + half_deg);
    let (y0, y1) = (center.lat - half_deg, center.lat + half_deg);
    geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
        vec![x0, y0],
        vec![x1, y0],
        vec![x1, y1],
        vec![x0, y1],
        vec![x0, y0],
    ]]))
}
