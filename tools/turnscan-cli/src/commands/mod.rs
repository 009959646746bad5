pub mod check;
pub mod focus;
pub mod simulate;

use turnscan_scan_model::geometry::Rect;

/// Parse `left,top,width,height`.
pub fn parse_rect(value: &str) -> Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{value}': {e}"))?;

    match parts.as_slice() {
        [left, top, width, height] => Ok(Rect::new(*left, *top, *width, *height).normalised()),
        _ => Err(format!(
            "expected left,top,width,height but got {} values",
            parts.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect() {
        assert_eq!(
            parse_rect("10, 20,300,200").unwrap(),
            Rect::new(10.0, 20.0, 300.0, 200.0)
        );
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }
}
