//! Maidenhead locator to latitude/longitude, and APRS position formatting.

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

fn letter_index(c: char) -> Option<u32> {
    let c = c.to_ascii_uppercase();
    c.is_ascii_uppercase().then(|| c as u32 - 'A' as u32)
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Convert a 4 or 6+ character Maidenhead locator to the centre of its
/// square (or sub-square), rounded to three decimals.
///
/// Returns `None` for anything shorter than 4 characters, for a 5 character
/// locator, or when a character is out of its alphabet.
///
/// # Example
///
/// ```
/// use js8_monitor::locator::to_lat_lon;
///
/// let pos = to_lat_lon("FN31").unwrap();
/// assert_eq!((pos.lat, pos.lon), (41.5, -73.0));
/// ```
pub fn to_lat_lon(grid: &str) -> Option<LatLon> {
    let chars: Vec<char> = grid.trim().chars().collect();
    if chars.len() < 4 || chars.len() == 5 {
        return None;
    }

    let field_lon = letter_index(chars[0])? as f64;
    let field_lat = letter_index(chars[1])? as f64;
    let square_lon = chars[2].to_digit(10)? as f64;
    let square_lat = chars[3].to_digit(10)? as f64;

    let mut lon = field_lon * 20.0 - 180.0 + square_lon * 2.0;
    let mut lat = field_lat * 10.0 - 90.0 + square_lat;

    if chars.len() >= 6 {
        lon += letter_index(chars[4])? as f64 / 12.0 + 2.5 / 60.0;
        lat += letter_index(chars[5])? as f64 / 24.0 + 1.25 / 60.0;
    } else {
        lon += 1.0;
        lat += 0.5;
    }

    Some(LatLon {
        lat: round3(lat),
        lon: round3(lon),
    })
}

/// Degrees and `MM.MM` minutes, the way APRS wants them.
fn degrees_minutes(value: f64) -> (u32, String) {
    let degrees = value.trunc().abs() as u32;
    let minutes = (value - value.trunc()).abs() * 60.0;
    let minutes = format!("{:07.4}", minutes);
    (degrees, minutes.chars().take(5).collect())
}

/// Format a latitude as APRS `DDMM.MMN`.
pub fn aprs_latitude(lat: f64) -> String {
    let (degrees, minutes) = degrees_minutes(lat);
    let hemisphere = if lat > 0.0 { 'N' } else { 'S' };
    format!("{:02}{}{}", degrees, minutes, hemisphere)
}

/// Format a longitude as APRS `DDDMM.MME`.
pub fn aprs_longitude(lon: f64) -> String {
    let (degrees, minutes) = degrees_minutes(lon);
    let hemisphere = if lon < 0.0 { 'W' } else { 'E' };
    format!("{:03}{}{}", degrees, minutes, hemisphere)
}
