use scraper::Html;

/// Extract readable text from a filing page body.
/// Returns None when the document yields no text at all.
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let lines: Vec<&str> = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_markup() {
        let html = "<html><body><h1>Acme Corp</h1><p>Record quarterly revenue.</p></body></html>";
        let text = extract_text(html).unwrap();
        assert!(text.contains("Acme Corp"));
        assert!(text.contains("Record quarterly revenue."));
    }

    #[test]
    fn empty_document_yields_none() {
        assert_eq!(extract_text("<html><body></body></html>"), None);
    }
}
