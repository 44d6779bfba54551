//! Static airport surface geometry and its spatial index.
//!
//! The map is loaded once from typed reference data and shared read-only by
//! the conflict detector and the compliance monitor for the lifetime of the
//! process. Queries go through a uniform grid so per-tick lookups stay well
//! under a linear scan of the feature set.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::SurfaceError;
use crate::spatial;

/// Grid cell edge length for the spatial index.
const GRID_CELL_M: f64 = 250.0;

/// Ring-search cutoff before falling back to a full scan (~10 km).
const MAX_SEARCH_RINGS: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Runway,
    Taxiway,
    HoldShortLine,
}

/// Feature geometry, vertices as [lat, lon] pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureGeometry {
    /// Closed ring, first vertex equals last.
    Polygon { ring: Vec<[f64; 2]> },
    /// Centerline with a half-width buffer in meters.
    Polyline { points: Vec<[f64; 2]>, width_m: f64 },
}

/// One runway, taxiway, or hold-short line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceFeature {
    /// Reference designator, e.g. "31C" or "H".
    pub id: String,
    pub kind: FeatureKind,
    pub geometry: FeatureGeometry,
}

impl SurfaceFeature {
    pub fn vertices(&self) -> &[[f64; 2]] {
        match &self.geometry {
            FeatureGeometry::Polygon { ring } => ring,
            FeatureGeometry::Polyline { points, .. } => points,
        }
    }

    fn half_width_m(&self) -> f64 {
        match &self.geometry {
            FeatureGeometry::Polygon { .. } => 0.0,
            FeatureGeometry::Polyline { width_m, .. } => width_m / 2.0,
        }
    }

    /// Whether the position lies within the feature footprint.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match &self.geometry {
            FeatureGeometry::Polygon { ring } => spatial::point_in_ring(lat, lon, ring),
            FeatureGeometry::Polyline { points, width_m } => {
                min_distance_to_path(lat, lon, points) <= width_m / 2.0
            }
        }
    }

    /// Distance from a position to the feature footprint, 0 when inside.
    pub fn distance_to(&self, lat: f64, lon: f64) -> f64 {
        match &self.geometry {
            FeatureGeometry::Polygon { ring } => {
                if spatial::point_in_ring(lat, lon, ring) {
                    0.0
                } else {
                    min_distance_to_path(lat, lon, ring)
                }
            }
            FeatureGeometry::Polyline { points, width_m } => {
                (min_distance_to_path(lat, lon, points) - width_m / 2.0).max(0.0)
            }
        }
    }

    /// Whether the segment from a to b passes through the feature footprint
    /// by `buffer_m`. Endpoint containment counts, so a crossing that ends
    /// inside the geometry is still caught.
    pub fn crossed_by(&self, a: (f64, f64), b: (f64, f64), buffer_m: f64) -> bool {
        let reach = buffer_m + self.half_width_m();
        if self.distance_to(a.0, a.1) <= buffer_m || self.distance_to(b.0, b.1) <= buffer_m {
            return true;
        }
        let verts = self.vertices();
        verts.windows(2).any(|edge| {
            spatial::segment_to_segment_distance_m(
                a.0, a.1, b.0, b.1, edge[0][0], edge[0][1], edge[1][0], edge[1][1],
            ) <= reach
        })
    }

    /// Project a position onto the feature centerline. Polyline features
    /// only; returns (lat, lon, distance_m).
    pub fn project_onto_centerline(&self, lat: f64, lon: f64) -> Option<(f64, f64, f64)> {
        let FeatureGeometry::Polyline { points, .. } = &self.geometry else {
            return None;
        };
        let mut best: Option<(f64, f64, f64)> = None;
        for edge in points.windows(2) {
            let (clat, clon, dist) = spatial::closest_point_on_segment(
                lat, lon, edge[0][0], edge[0][1], edge[1][0], edge[1][1],
            );
            if best.map(|(_, _, d)| dist < d).unwrap_or(true) {
                best = Some((clat, clon, dist));
            }
        }
        best
    }
}

fn min_distance_to_path(lat: f64, lon: f64, vertices: &[[f64; 2]]) -> f64 {
    let mut best = f64::INFINITY;
    if vertices.len() == 1 {
        return spatial::haversine_distance(lat, lon, vertices[0][0], vertices[0][1]);
    }
    for edge in vertices.windows(2) {
        let d = spatial::distance_to_segment_m(
            lat, lon, edge[0][0], edge[0][1], edge[1][0], edge[1][1],
        );
        best = best.min(d);
    }
    best
}

/// Read-only index over the loaded surface features.
pub struct SurfaceMap {
    features: Vec<SurfaceFeature>,
    by_id: HashMap<String, usize>,
    grid: HashMap<(i32, i32), Vec<usize>>,
    /// Pairs of feature indices whose geometries touch or intersect,
    /// precomputed at load.
    touching: HashSet<(usize, usize)>,
    ref_lat: f64,
    ref_lon: f64,
}

impl SurfaceMap {
    /// Build the map and its spatial index from typed feature records.
    pub fn new(features: Vec<SurfaceFeature>) -> Self {
        let (ref_lat, ref_lon) = reference_point(&features);

        let mut by_id = HashMap::new();
        let mut grid: HashMap<(i32, i32), Vec<usize>> = HashMap::new();

        for (idx, feature) in features.iter().enumerate() {
            by_id.insert(feature.id.clone(), idx);

            let pad = feature.half_width_m() + 1.0;
            if let Some((min_x, min_y, max_x, max_y)) =
                bounding_box_m(feature.vertices(), ref_lat, ref_lon)
            {
                let lo_x = ((min_x - pad) / GRID_CELL_M).floor() as i32;
                let hi_x = ((max_x + pad) / GRID_CELL_M).floor() as i32;
                let lo_y = ((min_y - pad) / GRID_CELL_M).floor() as i32;
                let hi_y = ((max_y + pad) / GRID_CELL_M).floor() as i32;
                for cx in lo_x..=hi_x {
                    for cy in lo_y..=hi_y {
                        grid.entry((cx, cy)).or_default().push(idx);
                    }
                }
            }
        }

        let mut touching = HashSet::new();
        for i in 0..features.len() {
            for j in (i + 1)..features.len() {
                if geometries_touch(&features[i], &features[j]) {
                    touching.insert((i, j));
                }
            }
        }

        Self {
            features,
            by_id,
            grid,
            touching,
            ref_lat,
            ref_lon,
        }
    }

    pub fn features(&self) -> &[SurfaceFeature] {
        &self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Look up a feature by its reference designator.
    pub fn feature(&self, id: &str) -> Result<&SurfaceFeature, SurfaceError> {
        self.by_id
            .get(id.trim())
            .map(|&idx| &self.features[idx])
            .ok_or_else(|| SurfaceError::UnknownFeatureReference(id.to_string()))
    }

    /// Whether the position lies within the named feature.
    pub fn contains(&self, lat: f64, lon: f64, id: &str) -> Result<bool, SurfaceError> {
        Ok(self.feature(id)?.contains(lat, lon))
    }

    /// Whether the segment from a to b crosses the named feature's buffered
    /// geometry.
    pub fn crossing(
        &self,
        a: (f64, f64),
        b: (f64, f64),
        id: &str,
        buffer_m: f64,
    ) -> Result<bool, SurfaceError> {
        Ok(self.feature(id)?.crossed_by(a, b, buffer_m))
    }

    /// Nearest feature to a position, optionally restricted to one kind.
    /// Grid ring search with a full-scan fallback for positions far off the
    /// indexed area.
    pub fn nearest_feature(
        &self,
        lat: f64,
        lon: f64,
        kind: Option<FeatureKind>,
    ) -> Option<&SurfaceFeature> {
        let (cx, cy) = self.cell_of(lat, lon);
        let mut visited: HashSet<usize> = HashSet::new();
        let mut best: Option<(f64, usize)> = None;

        for r in 0..=MAX_SEARCH_RINGS {
            for dx in -r..=r {
                for dy in -r..=r {
                    if dx.abs() != r && dy.abs() != r {
                        continue;
                    }
                    let Some(indices) = self.grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &idx in indices {
                        if !visited.insert(idx) {
                            continue;
                        }
                        let feature = &self.features[idx];
                        if kind.map(|k| feature.kind != k).unwrap_or(false) {
                            continue;
                        }
                        let d = feature.distance_to(lat, lon);
                        let better = match best {
                            Some((bd, bi)) => d < bd || (d == bd && idx < bi),
                            None => true,
                        };
                        if better {
                            best = Some((d, idx));
                        }
                    }
                }
            }
            // Anything in an unvisited ring is at least (r * cell) away.
            if let Some((d, _)) = best {
                if d <= r as f64 * GRID_CELL_M {
                    break;
                }
            }
        }

        if best.is_none() {
            for (idx, feature) in self.features.iter().enumerate() {
                if kind.map(|k| feature.kind != k).unwrap_or(false) {
                    continue;
                }
                let d = feature.distance_to(lat, lon);
                if best.map(|(bd, _)| d < bd).unwrap_or(true) {
                    best = Some((d, idx));
                }
            }
        }

        best.map(|(_, idx)| &self.features[idx])
    }

    /// All features whose footprint contains the position.
    pub fn features_containing(&self, lat: f64, lon: f64) -> Vec<&SurfaceFeature> {
        let (cx, cy) = self.cell_of(lat, lon);
        let mut out = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(indices) = self.grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &idx in indices {
                    if visited.insert(idx) && self.features[idx].contains(lat, lon) {
                        out.push(idx);
                    }
                }
            }
        }
        out.sort_unstable();
        out.into_iter().map(|idx| &self.features[idx]).collect()
    }

    /// Separation between two surface positions constrained to runway and
    /// taxiway centerlines.
    ///
    /// Positions snap to the nearest centerline within `capture_m`. A pair
    /// confined to disjoint centerlines is physically separated by the
    /// pavement layout and yields `None`; positions off any indexed
    /// centerline fall back to free-space distance.
    pub fn surface_separation_m(
        &self,
        lat1: f64,
        lon1: f64,
        lat2: f64,
        lon2: f64,
        capture_m: f64,
    ) -> Option<f64> {
        let snap1 = self.snap_to_centerline(lat1, lon1, capture_m);
        let snap2 = self.snap_to_centerline(lat2, lon2, capture_m);

        match (snap1, snap2) {
            (Some((i1, p1)), Some((i2, p2))) => {
                if i1 == i2 || self.features_touch(i1, i2) {
                    Some(spatial::haversine_distance(p1.0, p1.1, p2.0, p2.1))
                } else {
                    None
                }
            }
            _ => Some(spatial::haversine_distance(lat1, lon1, lat2, lon2)),
        }
    }

    fn features_touch(&self, i: usize, j: usize) -> bool {
        let key = if i < j { (i, j) } else { (j, i) };
        self.touching.contains(&key)
    }

    fn snap_to_centerline(
        &self,
        lat: f64,
        lon: f64,
        capture_m: f64,
    ) -> Option<(usize, (f64, f64))> {
        let mut best: Option<(usize, (f64, f64), f64)> = None;
        for idx in self.candidates_near(lat, lon) {
            let feature = &self.features[idx];
            if !matches!(feature.kind, FeatureKind::Runway | FeatureKind::Taxiway) {
                continue;
            }
            let Some((clat, clon, dist)) = feature.project_onto_centerline(lat, lon) else {
                continue;
            };
            if dist > capture_m {
                continue;
            }
            if best.map(|(_, _, d)| dist < d).unwrap_or(true) {
                best = Some((idx, (clat, clon), dist));
            }
        }
        best.map(|(idx, point, _)| (idx, point))
    }

    fn candidates_near(&self, lat: f64, lon: f64) -> Vec<usize> {
        let (cx, cy) = self.cell_of(lat, lon);
        let mut out = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(indices) = self.grid.get(&(cx + dx, cy + dy)) {
                    for &idx in indices {
                        if visited.insert(idx) {
                            out.push(idx);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn cell_of(&self, lat: f64, lon: f64) -> (i32, i32) {
        let x = spatial::lon_to_meters(lon - self.ref_lon, self.ref_lat);
        let y = spatial::lat_to_meters(lat - self.ref_lat, self.ref_lat);
        (
            (x / GRID_CELL_M).floor() as i32,
            (y / GRID_CELL_M).floor() as i32,
        )
    }
}

fn reference_point(features: &[SurfaceFeature]) -> (f64, f64) {
    let mut count = 0usize;
    let (mut sum_lat, mut sum_lon) = (0.0, 0.0);
    for feature in features {
        for v in feature.vertices() {
            sum_lat += v[0];
            sum_lon += v[1];
            count += 1;
        }
    }
    if count == 0 {
        (0.0, 0.0)
    } else {
        (sum_lat / count as f64, sum_lon / count as f64)
    }
}

fn bounding_box_m(
    vertices: &[[f64; 2]],
    ref_lat: f64,
    ref_lon: f64,
) -> Option<(f64, f64, f64, f64)> {
    let mut bbox: Option<(f64, f64, f64, f64)> = None;
    for v in vertices {
        let x = spatial::lon_to_meters(v[1] - ref_lon, ref_lat);
        let y = spatial::lat_to_meters(v[0] - ref_lat, ref_lat);
        bbox = Some(match bbox {
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
            None => (x, y, x, y),
        });
    }
    bbox
}

fn geometries_touch(a: &SurfaceFeature, b: &SurfaceFeature) -> bool {
    let reach = a.half_width_m() + b.half_width_m();
    for ea in a.vertices().windows(2) {
        for eb in b.vertices().windows(2) {
            let d = spatial::segment_to_segment_distance_m(
                ea[0][0], ea[0][1], ea[1][0], ea[1][1], eb[0][0], eb[0][1], eb[1][0], eb[1][1],
            );
            if d <= reach {
                return true;
            }
        }
    }
    if let FeatureGeometry::Polygon { .. } = a.geometry {
        if b.vertices().iter().any(|v| a.contains(v[0], v[1])) {
            return true;
        }
    }
    if let FeatureGeometry::Polygon { .. } = b.geometry {
        if a.vertices().iter().any(|v| b.contains(v[0], v[1])) {
            return true;
        }
    }
    false
}
