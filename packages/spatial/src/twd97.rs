//! TWD97 TM2 zone 121 (EPSG:3826) ↔ WGS84 (EPSG:4326).
//!
//! Transverse Mercator on the GRS80 ellipsoid using the Krüger series to
//! third order in `n`, which is accurate to well under a millimetre across
//! Taiwan. TWD97 and WGS84 share a datum to within centimetres, so no datum
//! shift is applied.

/// GRS80 semi-major axis in metres.
const A: f64 = 6_378_137.0;
/// GRS80 flattening.
const F: f64 = 1.0 / 298.257_222_101;
/// Central meridian scale factor.
const K0: f64 = 0.9999;
/// Central meridian in degrees.
const LON0: f64 = 121.0;
/// False easting in metres.
const FALSE_EASTING: f64 = 250_000.0;

/// Harmonic multipliers `2j` for `j = 1..=3`.
const HARMONICS: [f64; 3] = [2.0, 4.0, 6.0];

/// Precomputed series coefficients.
struct Series {
    /// Rectifying radius `A` scaled by `k0`.
    radius: f64,
    /// First eccentricity.
    e: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

fn series() -> Series {
    let n = F / (2.0 - F);
    let n2 = n * n;
    let n3 = n2 * n;
    let rectifying = A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

    Series {
        radius: K0 * rectifying,
        e: 2.0 * n.sqrt() / (1.0 + n),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
    }
}

/// Projects TWD97 `(easting, northing)` to WGS84 `(lon, lat)` in degrees.
#[must_use]
pub fn to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let s = series();
    let xi = northing / s.radius;
    let eta = (easting - FALSE_EASTING) / s.radius;

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (k, beta) in HARMONICS.into_iter().zip(s.beta) {
        xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (k, delta) in HARMONICS.into_iter().zip(s.delta) {
        phi += delta * (k * chi).sin();
    }

    let lambda = LON0.to_radians() + eta_p.sinh().atan2(xi_p.cos());

    (lambda.to_degrees(), phi.to_degrees())
}

/// Projects WGS84 `(lon, lat)` in degrees to TWD97 `(easting, northing)`.
#[must_use]
pub fn from_wgs84(lon: f64, lat: f64) -> (f64, f64) {
    let s = series();
    let phi = lat.to_radians();
    let d_lambda = (lon - LON0).to_radians();

    let sin_phi = phi.sin();
    let t = (sin_phi.atanh() - s.e * (s.e * sin_phi).atanh()).sinh();
    let xi_p = t.atan2(d_lambda.cos());
    let eta_p = (d_lambda.sin() / t.mul_add(t, 1.0).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (k, alpha) in HARMONICS.into_iter().zip(s.alpha) {
        xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
        eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
    }

    (s.radius.mul_add(eta, FALSE_EASTING), s.radius * xi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_meridian_on_equator_is_false_origin() {
        let (e, n) = from_wgs84(121.0, 0.0);
        assert!((e - 250_000.0).abs() < 1e-6);
        assert!(n.abs() < 1e-6);
    }

    #[test]
    fn taipei_reference_point() {
        let (e, n) = from_wgs84(121.5654, 25.033);
        assert!((e - 307_056.819).abs() < 1.0, "easting {e}");
        assert!((n - 2_769_551.837).abs() < 1.0, "northing {n}");
    }

    #[test]
    fn inverse_of_reference_point() {
        let (lon, lat) = to_wgs84(307_056.819, 2_769_551.837);
        assert!((lon - 121.5654).abs() < 1e-6, "lon {lon}");
        assert!((lat - 25.033).abs() < 1e-6, "lat {lat}");
    }

    #[test]
    fn inverse_of_central_taiwan_point() {
        let (lon, lat) = to_wgs84(302_000.0, 2_600_000.0);
        assert!((lon - 121.509_155).abs() < 1e-5, "lon {lon}");
        assert!((lat - 23.502_316).abs() < 1e-5, "lat {lat}");
    }
}
