//! Parsing helpers for extraction backends
//!
//! Model replies often wrap the JSON payload in prose, and receipt pages are
//! full of markup the model doesn't need. These functions clean up both sides.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::ExtractedFields;

/// Longest page text handed to the model
pub const MAX_PAGE_CHARS: usize = 24_000;

/// Slice out the outermost `{...}` of a model reply
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Parse receipt fields from a model reply
pub fn parse_fields_response(response: &str) -> Result<ExtractedFields> {
    let json = extract_json_object(response).ok_or_else(|| {
        Error::Extraction(format!(
            "No JSON found in model reply | Raw: {}",
            truncate(response, 200)
        ))
    })?;
    serde_json::from_str(json).map_err(|e| {
        Error::Extraction(format!(
            "Invalid receipt JSON from model: {} | Raw: {}",
            e,
            truncate(json, 200)
        ))
    })
}

/// Parse the receipt URL from a vision model reply. Accepts `{"url": ...}` or
/// a bare URL anywhere in the text.
pub fn parse_url_response(response: &str) -> Result<String> {
    if let Some(json) = extract_json_object(response) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(json) {
            if let Some(url) = value.get("url").and_then(|u| u.as_str()) {
                if let Some(found) = find_url(url) {
                    return Ok(found);
                }
            }
        }
    }
    find_url(response)
        .ok_or_else(|| Error::Extraction("No receipt URL found in photo".into()))
}

/// First http(s) URL in `text`
pub fn find_url(text: &str) -> Option<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let re = URL.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid regex"));
    re.find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ';']).to_string())
}

/// Reduce an HTML page to its visible text
pub fn page_text(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();

    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
            .expect("valid regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let text = blocks.replace_all(html, " ");
    let text = tags.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    let text = space.replace_all(&text, " ");
    truncate_chars(text.trim(), MAX_PAGE_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", truncate_chars(s, max))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_with_surrounding_text() {
        let response = r#"Aqui está:
{"storeName": "Supermercado Bom Preço", "storeCnpj": "12.345.678/0001-90",
 "date": "15/01/2024 18:32:10", "totalAmount": 27.5,
 "items": [{"name": "Arroz 5kg", "quantity": 1, "unit": "UN", "unitPrice": 25.0, "totalPrice": 25.0, "category": "Mercearia"},
           {"name": "Banana", "quantity": 0.5, "unit": "KG", "unitPrice": 5.0, "totalPrice": 2.5, "category": "Hortifruti"}]}
Pronto!"#;
        let fields = parse_fields_response(response).unwrap();
        assert_eq!(fields.store_name.as_deref(), Some("Supermercado Bom Preço"));
        assert_eq!(fields.total_amount, Some(27.5));
        assert_eq!(fields.items.len(), 2);
        assert_eq!(fields.items[1].unit, "KG");
    }

    #[test]
    fn test_parse_fields_without_json() {
        let err = parse_fields_response("I could not read the page").unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_parse_url_from_json() {
        let url = parse_url_response(
            r#"{"url": "https://www.sefaz.rs.gov.br/NFCE/NFCE-COM.aspx?p=4324|2|1"}"#,
        )
        .unwrap();
        assert_eq!(url, "https://www.sefaz.rs.gov.br/NFCE/NFCE-COM.aspx?p=4324|2|1");
    }

    #[test]
    fn test_parse_url_from_prose() {
        let url = parse_url_response("The QR code points to http://nfce.fazenda.sp.gov.br/q?p=1.")
            .unwrap();
        assert_eq!(url, "http://nfce.fazenda.sp.gov.br/q?p=1");
    }

    #[test]
    fn test_parse_url_missing() {
        assert!(parse_url_response(r#"{"url": null}"#).is_err());
    }

    #[test]
    fn test_page_text_strips_markup() {
        let html = r#"<html><head><style>.x{color:red}</style><script>var a = 1;</script></head>
<body><div class="txtTopo">MERCADO&nbsp;CENTRAL</div><span>Total: R$ 10,50</span></body></html>"#;
        assert_eq!(page_text(html), "MERCADO CENTRAL Total: R$ 10,50");
    }
}
