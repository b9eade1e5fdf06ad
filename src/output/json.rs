use anyhow::Result;
use serde::Serialize;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Single-line JSON, one document per streamed update.
pub fn render_json_line<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::{render_json, render_json_line};
    use crate::criteria::FilterCriteria;

    #[test]
    fn criteria_render_with_dashboard_field_names() {
        let pretty = render_json(&FilterCriteria::default()).expect("json");
        assert!(pretty.contains("\"selectedMarket\": \"ALL\""));
        let line = render_json_line(&FilterCriteria::default()).expect("json line");
        assert!(!line.contains('\n'));
        assert!(line.contains("\"sortOrder\":\"desc\""));
    }
}
