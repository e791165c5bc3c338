//! Ground resolution for Web-Mercator tiles

/// Equatorial ground resolution at zoom 0, in meters per pixel
pub const EQUATOR_METERS_PER_PIXEL: f64 = 156543.03392;

/// Default imagery zoom level
pub const DEFAULT_ZOOM: u8 = 20;

/// Meters of ground covered by one pixel at `latitude` (degrees) and `zoom`.
///
/// `156543.03392 * cos(lat) / 2^zoom`. Latitude is not range-checked: values
/// beyond ±90° still evaluate the formula (cosine wraps) and yield a number
/// with no physical meaning.
pub fn meters_per_pixel(latitude: f64, zoom: u8) -> f64 {
    EQUATOR_METERS_PER_PIXEL * latitude.to_radians().cos() / 2f64.powi(i32::from(zoom))
}
