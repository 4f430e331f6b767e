//! Decimal degrees ↔ degrees-minutes-seconds strings.
//!
//! The rendered form is `D°MM'SS.SS"H`, e.g. `25°01'58.80"N`: whole
//! degrees, two-digit minutes, seconds rounded to hundredths, and a
//! hemisphere letter from [`Axis::hemisphere`].

use parking_map_parking_models::Axis;

use crate::SpatialError;

/// Renders a decimal degree value as a DMS string.
///
/// Seconds are rounded to two decimals; a value that rounds up to
/// `60.00` carries into minutes (and minutes into degrees).
#[must_use]
pub fn to_dms(decimal: f64, axis: Axis) -> String {
    let hemisphere = axis.hemisphere(decimal);
    let abs = decimal.abs();

    let mut degrees = abs.trunc();
    let minutes_full = (abs - degrees) * 60.0;
    let mut minutes = minutes_full.trunc();
    let mut centiseconds = ((minutes_full - minutes) * 6_000.0).round();

    if centiseconds >= 6_000.0 {
        centiseconds -= 6_000.0;
        minutes += 1.0;
    }
    if minutes >= 60.0 {
        minutes -= 60.0;
        degrees += 1.0;
    }

    format!(
        "{degrees:.0}°{minutes:02.0}'{:05.2}\"{hemisphere}",
        centiseconds / 100.0
    )
}

/// Parses a DMS string produced by [`to_dms`] back into decimal degrees.
///
/// The hemisphere letter must belong to `axis`; `S` and `W` yield negative
/// values.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidDms`] if the `°`, `'` or `"` markers are
/// missing, a component is not a number, minutes or seconds are out of
/// range, or the hemisphere letter does not match `axis`.
pub fn parse_dms(text: &str, axis: Axis) -> Result<f64, SpatialError> {
    let invalid = || SpatialError::InvalidDms(text.to_string());
    let trimmed = text.trim();

    let hemisphere = trimmed.chars().last().ok_or_else(invalid)?;
    if !axis.accepts_hemisphere(hemisphere) {
        return Err(invalid());
    }
    let body = &trimmed[..trimmed.len() - hemisphere.len_utf8()];

    let (degrees, rest) = body.split_once('°').ok_or_else(invalid)?;
    let (minutes, rest) = rest.split_once('\'').ok_or_else(invalid)?;
    let seconds = rest.strip_suffix('"').ok_or_else(invalid)?;

    let degrees: f64 = degrees.trim().parse().map_err(|_| invalid())?;
    let minutes: f64 = minutes.trim().parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.trim().parse().map_err(|_| invalid())?;

    if degrees < 0.0 || !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let magnitude = degrees + minutes / 60.0 + seconds / 3_600.0;
    Ok(if matches!(hemisphere, 'S' | 'W') {
        -magnitude
    } else {
        magnitude
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Half a hundredth of a second, in degrees.
    const TOLERANCE: f64 = 0.005 / 3_600.0 + 1e-12;

    #[test]
    fn formats_taipei() {
        assert_eq!(to_dms(25.033, Axis::Latitude), "25°01'58.80\"N");
        assert_eq!(to_dms(121.5654, Axis::Longitude), "121°33'55.44\"E");
    }

    #[test]
    fn formats_negative_and_zero() {
        assert_eq!(to_dms(0.0, Axis::Latitude), "0°00'00.00\"N");
        assert_eq!(to_dms(-33.5, Axis::Latitude), "33°30'00.00\"S");
        assert_eq!(to_dms(-70.25, Axis::Longitude), "70°15'00.00\"W");
    }

    #[test]
    fn carries_rounded_sixty_seconds() {
        // 24°59'59.999" rounds to 25°00'00.00".
        let value = 24.0 + 59.0 / 60.0 + 59.999 / 3_600.0;
        assert_eq!(to_dms(value, Axis::Latitude), "25°00'00.00\"N");
    }

    #[test]
    fn parses_back_within_rounding() {
        for value in [
            25.033_f64, 121.5654, 22.999_999, -0.000_1, 23.456_789, 120.1, -179.999, 89.9,
        ] {
            let axis = if value.abs() > 90.0 {
                Axis::Longitude
            } else {
                Axis::Latitude
            };
            let parsed = parse_dms(&to_dms(value, axis), axis).unwrap();
            assert!(
                (parsed - value).abs() <= TOLERANCE,
                "{value} -> {parsed}"
            );
        }
    }

    #[test]
    fn rejects_wrong_axis_letter() {
        assert!(parse_dms("25°01'58.80\"E", Axis::Latitude).is_err());
        assert!(parse_dms("121°33'55.44\"N", Axis::Longitude).is_err());
    }

    #[test]
    fn rejects_missing_markers() {
        assert!(parse_dms("25 01 58.80 N", Axis::Latitude).is_err());
        assert!(parse_dms("25°01'58.80N", Axis::Latitude).is_err());
        assert!(parse_dms("", Axis::Latitude).is_err());
        assert!(parse_dms("25°61'00.00\"N", Axis::Latitude).is_err());
    }
}
