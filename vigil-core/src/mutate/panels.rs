//! The brand → domain list document (`domains.json`).
//!
//! ```json
//! {
//!     "panels": {
//!         "wujie": [
//!             { "url": "https://apiwj250301.wj0001.cfd", "description": "..." }
//!         ]
//!     }
//! }
//! ```
//!
//! Entry 0 of each brand's list is its primary domain. Unrelated keys and
//! their order survive every rewrite.

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::{Result, VigilError};

const PANELS_KEY: &str = "panels";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEntry {
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl PanelEntry {
    /// Entry published for an automatically provisioned domain.
    pub fn generated(brand: &str, fqdn: &str) -> Self {
        Self {
            url: crate::validation::to_https_url(fqdn),
            description: format!("auto-generated domain - {}", brand),
        }
    }
}

/// A rewritten document and what it displaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelChange {
    pub document: String,
    /// URL of the previous primary entry, if there was one
    pub replaced: Option<String>,
    /// False when the primary entry already matched
    pub changed: bool,
}

fn parse_document(content: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VigilError::MalformedDocument(
            "document root is not a JSON object".to_string(),
        )),
        Err(e) => Err(VigilError::MalformedDocument(e.to_string())),
    }
}

/// Serializes with 4-space indentation; non-ASCII text is written as-is.
pub fn to_document_string(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| VigilError::MalformedDocument(e.to_string()))
}

/// Entries listed for `brand`; empty when the brand or `panels` is absent.
pub fn brand_entries(content: &str, brand: &str) -> Result<Vec<PanelEntry>> {
    let document = parse_document(content)?;
    let Some(list) = document.get(PANELS_KEY).and_then(|panels| panels.get(brand)) else {
        return Ok(Vec::new());
    };
    serde_json::from_value(list.clone())
        .map_err(|e| VigilError::MalformedDocument(format!("panels.{}: {}", brand, e)))
}

/// Puts `entry` at index 0 of `panels[brand]`.
///
/// Missing `panels` or brand lists are created; an empty list gets the entry
/// appended.
pub fn replace_primary(content: &str, brand: &str, entry: &PanelEntry) -> Result<PanelChange> {
    let mut document = parse_document(content)?;

    let panels = document
        .entry(PANELS_KEY.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(panels) = panels else {
        return Err(VigilError::MalformedDocument("panels is not an object".to_string()));
    };

    let list = panels
        .entry(brand.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(list) = list else {
        return Err(VigilError::MalformedDocument(format!(
            "panels.{} is not a list",
            brand
        )));
    };

    let new_entry = serde_json::to_value(entry)?;
    let replaced = list
        .first()
        .and_then(|first| first.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let changed = list.first() != Some(&new_entry);

    if list.is_empty() {
        list.push(new_entry);
    } else {
        list[0] = new_entry;
    }

    Ok(PanelChange {
        document: to_document_string(&Value::Object(document))?,
        replaced,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
    "version": 3,
    "panels": {
        "wujie": [
            {"url": "https://apiwj250201.wj0001.cfd", "description": "主线路"},
            {"url": "https://apiwj250101.wj0001.cfd", "description": "backup"},
            {"url": "https://apiwj241201.wj0001.cfd", "description": "legacy"}
        ],
        "v2word": []
    },
    "updated_by": "ops"
}"#;

    fn entry() -> PanelEntry {
        PanelEntry::generated("wujie", "apiwj250301.wj0001.cfd")
    }

    #[test]
    fn test_generated_entry() {
        let entry = entry();
        assert_eq!(entry.url, "https://apiwj250301.wj0001.cfd");
        assert_eq!(entry.description, "auto-generated domain - wujie");
    }

    #[test]
    fn test_replace_primary_keeps_rest() {
        let change = replace_primary(DOCUMENT, "wujie", &entry()).unwrap();

        assert!(change.changed);
        assert_eq!(change.replaced.as_deref(), Some("https://apiwj250201.wj0001.cfd"));

        let entries = brand_entries(&change.document, "wujie").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], entry());
        assert_eq!(entries[1].url, "https://apiwj250101.wj0001.cfd");
        assert_eq!(entries[1].description, "backup");
        assert_eq!(entries[2].url, "https://apiwj241201.wj0001.cfd");
        assert_eq!(entries[2].description, "legacy");
    }

    #[test]
    fn test_key_order_and_formatting() {
        let change = replace_primary(DOCUMENT, "wujie", &entry()).unwrap();
        let doc = &change.document;

        let version = doc.find("\"version\"").unwrap();
        let panels = doc.find("\"panels\"").unwrap();
        let updated_by = doc.find("\"updated_by\"").unwrap();
        assert!(version < panels && panels < updated_by);

        assert!(doc.starts_with("{\n    \"version\": 3,\n    \"panels\": {\n        \"wujie\": [\n"));
        // The displaced entry is gone; untouched non-ASCII text stays unescaped
        assert!(!doc.contains("主线路"));
        assert!(replace_primary(DOCUMENT, "v2word", &entry())
            .unwrap()
            .document
            .contains("主线路"));
    }

    #[test]
    fn test_empty_list_gets_entry() {
        let change = replace_primary(DOCUMENT, "v2word", &entry()).unwrap();

        assert_eq!(change.replaced, None);
        assert_eq!(brand_entries(&change.document, "v2word").unwrap(), vec![entry()]);
    }

    #[test]
    fn test_missing_panels_created() {
        let change = replace_primary(r#"{"version": 1}"#, "acme", &entry()).unwrap();
        let value: Value = serde_json::from_str(&change.document).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["panels"]["acme"][0]["url"], "https://apiwj250301.wj0001.cfd");
    }

    #[test]
    fn test_unchanged_when_already_primary() {
        let first = replace_primary(DOCUMENT, "wujie", &entry()).unwrap();
        let second = replace_primary(&first.document, "wujie", &entry()).unwrap();

        assert!(!second.changed);
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            replace_primary("[]", "wujie", &entry()),
            Err(VigilError::MalformedDocument(_))
        ));
        assert!(matches!(
            replace_primary(r#"{"panels": []}"#, "wujie", &entry()),
            Err(VigilError::MalformedDocument(_))
        ));
        assert!(matches!(
            replace_primary(r#"{"panels": {"wujie": "x"}}"#, "wujie", &entry()),
            Err(VigilError::MalformedDocument(_))
        ));
        assert!(matches!(
            brand_entries("{oops", "wujie"),
            Err(VigilError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_brand_entries_absent_brand() {
        assert!(brand_entries(DOCUMENT, "acme").unwrap().is_empty());
    }
}
