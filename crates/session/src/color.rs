//! GLSL colour literals for the colour picker. The picker reports an RGB
//! triple; this turns it into text the user pastes into their shader.

fn channel(value: u8) -> f64 {
    (f64::from(value) / 255.0 * 1000.0).round() / 1000.0
}

/// `vec3(...)` and `vec4(..., 1.0)` lines for an 8-bit RGB colour, each
/// channel scaled to `[0, 1]` and rounded to three decimals.
pub fn color_snippet(rgb: [u8; 3]) -> String {
    let [r, g, b] = rgb.map(channel);
    format!("vec3({r}, {g}, {b})\nvec4({r}, {g}, {b}, 1.0)")
}

/// Parses `"R, G, B"` with 0-255 channels.
pub fn parse_rgb(raw: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected 'R, G, B', got '{raw}'"));
    };
    let parse = |part: &str| {
        part.parse::<u8>()
            .map_err(|err| format!("invalid channel '{part}': {err}"))
    };
    Ok([parse(*r)?, parse(*g)?, parse(*b)?])
}
