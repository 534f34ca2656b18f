// src/utils/html.rs

/// Sanitizes admin-authored rich text (round regulations) with ammonia's
/// whitelist: formatting tags survive, scripts and event handlers are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_formatting_drops_scripts() {
        let cleaned = clean_html("<p>Answer within <b>30s</b></p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Answer within <b>30s</b></p>");
    }

    #[test]
    fn strips_event_handlers() {
        let cleaned = clean_html(r#"<a href="https://example.com" onclick="steal()">rules</a>"#);
        assert!(!cleaned.contains("onclick"));
        assert!(cleaned.contains("rules"));
    }
}
