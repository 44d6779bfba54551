//! Geodesic and planar geometry primitives shared by the surface map,
//! trajectory extrapolation, and conflict scoring.
//!
//! All positions are decimal-degree lat/lon; local computations project to
//! an ENU-style meter frame around a reference latitude.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert a north/south offset in meters to degrees latitude.
pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

/// Convert an east/west offset in meters to degrees longitude.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

/// Convert degrees latitude to meters using local scaling.
pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

/// Convert degrees longitude to meters at a given latitude.
pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Initial bearing from point 1 to point 2 in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Offset a position by distance and bearing on the great circle.
///
/// `bearing_rad` is 0 = north, π/2 = east. Returns (new_lat, new_lon)
/// in degrees.
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Normalize an angle difference to (-180, 180] degrees.
pub fn wrap_deg(delta_deg: f64) -> f64 {
    let wrapped = (delta_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Minimum distance from a point to a line segment, in meters, together with
/// the closest point on the segment.
pub fn closest_point_on_segment(
    point_lat: f64,
    point_lon: f64,
    seg_start_lat: f64,
    seg_start_lon: f64,
    seg_end_lat: f64,
    seg_end_lon: f64,
) -> (f64, f64, f64) {
    let ref_lat = seg_start_lat;

    let px = lon_to_meters(point_lon - seg_start_lon, ref_lat);
    let py = lat_to_meters(point_lat - seg_start_lat, ref_lat);
    let sx = lon_to_meters(seg_end_lon - seg_start_lon, ref_lat);
    let sy = lat_to_meters(seg_end_lat - seg_start_lat, ref_lat);

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-4 {
        // Segment is essentially a point
        let dist = (px * px + py * py).sqrt();
        return (seg_start_lat, seg_start_lon, dist);
    }

    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let closest_x = t * sx;
    let closest_y = t * sy;

    let dx = px - closest_x;
    let dy = py - closest_y;
    let dist = (dx * dx + dy * dy).sqrt();

    let closest_lat = seg_start_lat + meters_to_lat(closest_y, ref_lat);
    let closest_lon = seg_start_lon + meters_to_lon(closest_x, ref_lat);
    (closest_lat, closest_lon, dist)
}

/// Minimum distance from a point to a line segment in meters.
pub fn distance_to_segment_m(
    point_lat: f64,
    point_lon: f64,
    seg_start_lat: f64,
    seg_start_lon: f64,
    seg_end_lat: f64,
    seg_end_lon: f64,
) -> f64 {
    closest_point_on_segment(
        point_lat,
        point_lon,
        seg_start_lat,
        seg_start_lon,
        seg_end_lat,
        seg_end_lon,
    )
    .2
}

/// Approximate minimum distance between two lat/lon segments in meters.
/// Crossing or touching segments yield 0.
#[allow(clippy::too_many_arguments)]
pub fn segment_to_segment_distance_m(
    a1_lat: f64,
    a1_lon: f64,
    a2_lat: f64,
    a2_lon: f64,
    b1_lat: f64,
    b1_lon: f64,
    b2_lat: f64,
    b2_lon: f64,
) -> f64 {
    let ref_lat = (a1_lat + a2_lat + b1_lat + b2_lat) / 4.0;
    let ref_lon = (a1_lon + a2_lon + b1_lon + b2_lon) / 4.0;

    let project = |lat: f64, lon: f64| {
        (
            lon_to_meters(lon - ref_lon, ref_lat),
            lat_to_meters(lat - ref_lat, ref_lat),
        )
    };

    if segments_intersect_2d(
        project(a1_lat, a1_lon),
        project(a2_lat, a2_lon),
        project(b1_lat, b1_lon),
        project(b2_lat, b2_lon),
    ) {
        return 0.0;
    }

    let d1 = distance_to_segment_m(a1_lat, a1_lon, b1_lat, b1_lon, b2_lat, b2_lon);
    let d2 = distance_to_segment_m(a2_lat, a2_lon, b1_lat, b1_lon, b2_lat, b2_lon);
    let d3 = distance_to_segment_m(b1_lat, b1_lon, a1_lat, a1_lon, a2_lat, a2_lon);
    let d4 = distance_to_segment_m(b2_lat, b2_lon, a1_lat, a1_lon, a2_lat, a2_lon);

    d1.min(d2).min(d3).min(d4)
}

/// Orientation-based segment intersection on locally-projected meter
/// coordinates. Includes touches and collinear overlaps.
pub(crate) fn segments_intersect_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    // Tolerance in meters, absorbs projection and arithmetic error.
    const EPS_M: f64 = 1e-6;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        value >= a.min(b) - EPS_M && value <= a.max(b) + EPS_M
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Ray-cast point-in-polygon test over a closed ring of [lat, lon] vertices.
pub fn point_in_ring(lat: f64, lon: f64, ring: &[[f64; 2]]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let yi = ring[i][0];
        let xi = ring[i][1];
        let yj = ring[j][0];
        let xj = ring[j][1];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}
