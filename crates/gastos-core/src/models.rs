//! Receipt data model
//!
//! In memory a receipt carries a tagged [`ReceiptState`]: only a completed
//! receipt has store details and items, so nothing downstream has to guard
//! against a half-filled record. On the wire (spreadsheet bridge and local
//! snapshot) the same receipt is a flat camelCase [`ReceiptRecord`].

use serde::{Deserialize, Deserializer, Serialize};

/// Client-generated receipt id (UUID v4 string)
pub type ReceiptId = String;

/// Message given to receipts that were still processing when a session ended
pub const INTERRUPTED_MESSAGE: &str = "processing did not complete in a previous session";

/// Message given to a photo placeholder whose decoded URL is already tracked
pub const DUPLICATE_MESSAGE: &str = "already scanned";

/// Receipt lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Queued or being extracted
    #[default]
    Processing,
    /// Extraction succeeded
    Completed,
    /// Extraction (or duplicate check) failed
    Error,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown receipt status: {}", s)),
        }
    }
}

/// One purchased line on a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default = "default_quantity", deserialize_with = "lenient_f64_or_one")]
    pub quantity: f64,
    /// Unit of measure code as printed on the receipt (UN, KG, L...)
    #[serde(default = "default_unit", deserialize_with = "lenient_unit")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_price: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
}

fn default_quantity() -> f64 {
    1.0
}

fn default_unit() -> String {
    "UN".to_string()
}

/// Store and purchase data present once a receipt is completed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDetails {
    pub store_name: String,
    /// Store tax id (CNPJ)
    pub store_cnpj: String,
    pub store_address: String,
    /// Purchase date/time as extracted
    pub date: String,
    pub total_amount: f64,
    pub items: Vec<Item>,
}

/// Fields returned by the extraction gateway. Every field is optional since a
/// model may leave gaps; missing values become empty strings or zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedFields {
    pub store_name: Option<String>,
    pub store_cnpj: Option<String>,
    pub store_address: Option<String>,
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub total_amount: Option<f64>,
    pub payer: Option<String>,
    pub items: Vec<Item>,
}

impl From<ExtractedFields> for ReceiptDetails {
    fn from(fields: ExtractedFields) -> Self {
        Self {
            store_name: fields.store_name.unwrap_or_default(),
            store_cnpj: fields.store_cnpj.unwrap_or_default(),
            store_address: fields.store_address.unwrap_or_default(),
            date: fields.date.unwrap_or_default(),
            total_amount: fields.total_amount.unwrap_or_default().max(0.0),
            items: fields.items,
        }
    }
}

/// Lifecycle state, carrying what each stage owns
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptState {
    Processing,
    Completed(ReceiptDetails),
    Error { message: String },
}

/// One purchase event tracked by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub id: ReceiptId,
    /// NFC-e URL; absent while a photo is still being decoded
    pub url: Option<String>,
    /// Who paid; kept across reprocessing
    pub payer: Option<String>,
    pub state: ReceiptState,
    /// An up-to-date copy has reached the remote store
    pub is_synced: bool,
    /// A save to the remote store is in flight
    pub syncing: bool,
}

impl Receipt {
    /// New queued receipt with a fresh id
    pub fn new_processing(url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            payer: None,
            state: ReceiptState::Processing,
            is_synced: false,
            syncing: false,
        }
    }

    pub fn status(&self) -> ReceiptStatus {
        match self.state {
            ReceiptState::Processing => ReceiptStatus::Processing,
            ReceiptState::Completed(_) => ReceiptStatus::Completed,
            ReceiptState::Error { .. } => ReceiptStatus::Error,
        }
    }

    pub fn details(&self) -> Option<&ReceiptDetails> {
        match &self.state {
            ReceiptState::Completed(details) => Some(details),
            _ => None,
        }
    }

    pub fn details_mut(&mut self) -> Option<&mut ReceiptDetails> {
        match &mut self.state {
            ReceiptState::Completed(details) => Some(details),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            ReceiptState::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Non-empty URL, if any
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.url().is_some_and(|u| u.trim() == url.trim())
    }

    /// Queued and ready for extraction
    pub fn is_ready_for_extraction(&self) -> bool {
        self.status() == ReceiptStatus::Processing && self.url().is_some()
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = ReceiptState::Error {
            message: message.into(),
        };
    }

    /// Apply extractor output and mark completed
    pub fn complete(&mut self, fields: ExtractedFields) {
        if let Some(payer) = fields.payer.clone().filter(|p| !p.trim().is_empty()) {
            self.payer = Some(payer);
        }
        self.state = ReceiptState::Completed(fields.into());
    }

    /// Flat wire form (sync flags are never sent)
    pub fn to_record(&self) -> ReceiptRecord {
        let mut record = ReceiptRecord {
            id: self.id.clone(),
            url: self.url.clone(),
            status: self.status(),
            payer: self.payer.clone(),
            ..Default::default()
        };
        match &self.state {
            ReceiptState::Processing => {}
            ReceiptState::Completed(details) => {
                record.store_name = Some(details.store_name.clone());
                record.store_cnpj = Some(details.store_cnpj.clone());
                record.store_address = Some(details.store_address.clone());
                record.date = Some(details.date.clone());
                record.total_amount = Some(details.total_amount);
                record.items = Some(details.items.clone());
            }
            ReceiptState::Error { message } => record.error = Some(message.clone()),
        }
        record
    }

    /// Build from the wire form. Sync flags start cleared.
    pub fn from_record(record: ReceiptRecord) -> Self {
        let state = match record.status {
            ReceiptStatus::Processing => ReceiptState::Processing,
            ReceiptStatus::Completed => ReceiptState::Completed(ReceiptDetails {
                store_name: record.store_name.unwrap_or_default(),
                store_cnpj: record.store_cnpj.unwrap_or_default(),
                store_address: record.store_address.unwrap_or_default(),
                date: record.date.unwrap_or_default(),
                total_amount: record.total_amount.unwrap_or_default(),
                items: record.items.unwrap_or_default(),
            }),
            ReceiptStatus::Error => ReceiptState::Error {
                message: record
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
        };
        Self {
            id: record.id,
            url: record.url.filter(|u| !u.is_empty()),
            payer: record.payer.filter(|p| !p.is_empty()),
            state,
            is_synced: false,
            syncing: false,
        }
    }
}

/// Flat receipt shape used by the spreadsheet bridge and the local snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
    pub id: ReceiptId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub status: ReceiptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_f64"
    )]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server-assigned on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Spreadsheet cells come back as numbers, numeric strings, or blanks.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberCell {
    Number(f64),
    Text(String),
}

fn parse_number_cell(cell: Option<NumberCell>) -> Option<f64> {
    match cell? {
        NumberCell::Number(n) => Some(n),
        NumberCell::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.replace(',', ".").parse().ok()
            }
        }
    }
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(parse_number_cell(Option::<NumberCell>::deserialize(d)?))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(parse_number_cell(Option::<NumberCell>::deserialize(d)?).unwrap_or_default())
}

fn lenient_f64_or_one<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(parse_number_cell(Option::<NumberCell>::deserialize(d)?).unwrap_or_else(default_quantity))
}

/// Model replies use `null` for text they could not read
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn lenient_unit<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(default_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milk() -> Item {
        Item {
            name: "Leite Integral".into(),
            quantity: 2.0,
            unit: "UN".into(),
            unit_price: 4.99,
            total_price: 9.98,
            category: "Laticínios".into(),
        }
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            "Completed".parse::<ReceiptStatus>().unwrap(),
            ReceiptStatus::Completed
        );
        assert!("pending".parse::<ReceiptStatus>().is_err());
    }

    #[test]
    fn test_new_processing_has_fresh_id() {
        let a = Receipt::new_processing(Some("http://x/1".into()));
        let b = Receipt::new_processing(Some("http://x/1".into()));
        assert_ne!(a.id, b.id);
        assert_eq!(a.status(), ReceiptStatus::Processing);
        assert!(!a.is_synced);
        assert!(!a.syncing);
    }

    #[test]
    fn test_blank_url_is_not_ready() {
        let r = Receipt::new_processing(Some("   ".into()));
        assert!(!r.is_ready_for_extraction());
        let r = Receipt::new_processing(None);
        assert!(!r.is_ready_for_extraction());
    }

    #[test]
    fn test_complete_keeps_payer_when_extraction_has_none() {
        let mut r = Receipt::new_processing(Some("http://x/1".into()));
        r.payer = Some("Ana".into());
        r.complete(ExtractedFields {
            store_name: Some("Loja A".into()),
            total_amount: Some(10.5),
            ..Default::default()
        });
        assert_eq!(r.payer.as_deref(), Some("Ana"));
        assert_eq!(r.details().unwrap().store_name, "Loja A");
    }

    #[test]
    fn test_record_excludes_sync_flags() {
        let mut r = Receipt::new_processing(Some("http://x/1".into()));
        r.is_synced = true;
        r.syncing = true;
        let json = serde_json::to_value(r.to_record()).unwrap();
        assert!(json.get("isSynced").is_none());
        assert!(json.get("syncing").is_none());
        assert_eq!(json["status"], "processing");
    }

    #[test]
    fn test_completed_record_conversion_preserves_items() {
        let mut r = Receipt::new_processing(Some("http://x/1".into()));
        r.complete(ExtractedFields {
            store_name: Some("Mercado".into()),
            store_cnpj: Some("12.345.678/0001-90".into()),
            total_amount: Some(9.98),
            items: vec![milk()],
            ..Default::default()
        });
        let back = Receipt::from_record(r.to_record());
        assert_eq!(back.state, r.state);
        assert_eq!(back.url, r.url);
    }

    #[test]
    fn test_record_accepts_spreadsheet_cells() {
        let json = r#"{
            "id": "abc",
            "url": "",
            "status": "completed",
            "storeName": "Padaria",
            "totalAmount": "12,50",
            "items": [{"name": "Pão", "quantity": "3", "unitPrice": 1.5, "totalPrice": "4.5"}],
            "error": "",
            "payer": "",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let record: ReceiptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.total_amount, Some(12.5));
        let receipt = Receipt::from_record(record);
        assert_eq!(receipt.url, None);
        assert_eq!(receipt.payer, None);
        let details = receipt.details().unwrap();
        assert_eq!(details.items[0].quantity, 3.0);
        assert_eq!(details.items[0].unit, "UN");
        assert_eq!(details.items[0].total_price, 4.5);
    }

    #[test]
    fn test_error_record_without_message() {
        let record = ReceiptRecord {
            id: "x".into(),
            status: ReceiptStatus::Error,
            ..Default::default()
        };
        let receipt = Receipt::from_record(record);
        assert_eq!(receipt.error_message(), Some("Unknown error"));
    }

    #[test]
    fn test_item_accepts_null_text_fields() {
        let fields: ExtractedFields = serde_json::from_str(
            r#"{"storeName":"Loja A","items":[
                {"name":"Pão Francês","quantity":"0,5","unit":null,"unitPrice":12.9,"totalPrice":6.45,"category":null},
                {"name":null,"unit":"KG","totalPrice":"3,20"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(fields.items.len(), 2);
        let bread = &fields.items[0];
        assert_eq!(bread.unit, "UN");
        assert_eq!(bread.category, "");
        assert_eq!(bread.quantity, 0.5);
        let unnamed = &fields.items[1];
        assert_eq!(unnamed.name, "");
        assert_eq!(unnamed.unit, "KG");
        assert_eq!(unnamed.quantity, 1.0);
        assert_eq!(unnamed.total_price, 3.2);
    }

    #[test]
    fn test_extracted_total_clamped_non_negative() {
        let details: ReceiptDetails = ExtractedFields {
            total_amount: Some(-3.0),
            ..Default::default()
        }
        .into();
        assert_eq!(details.total_amount, 0.0);
    }
}
