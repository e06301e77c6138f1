use serde::{Deserialize, Serialize};

/// One line item extracted from a handwritten bill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    pub price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Structured extraction returned by the vision collaborator. The JSON
/// shape is the collaborator's contract; totals may be absent when the
/// bill carries no written total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedBill {
    #[serde(default)]
    pub items: Vec<BillItem>,
    pub written_total: Option<f64>,
    pub computed_total: Option<f64>,
    #[serde(default)]
    pub mismatch: bool,
}

impl ExtractedBill {
    /// Independent recomputation of the line-item sum, quantity × price
    /// per item.
    pub fn line_item_total(&self) -> f64 {
        self.items.iter().map(|i| i.quantity * i.price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_total_multiplies_quantity() {
        let bill = ExtractedBill {
            items: vec![
                BillItem { name: "Rice".into(), quantity: 2.0, price: 100.0 },
                BillItem { name: "Oil".into(), quantity: 1.0, price: 50.0 },
            ],
            written_total: Some(250.0),
            computed_total: Some(250.0),
            mismatch: false,
        };
        assert_eq!(bill.line_item_total(), 250.0);
    }

    #[test]
    fn quantity_defaults_to_one() {
        let item: BillItem = serde_json::from_str(r#"{"name":"Sugar","price":45}"#).unwrap();
        assert_eq!(item.quantity, 1.0);
    }

    #[test]
    fn parses_collaborator_shape() {
        let json = r#"{
            "items": [{"name": "Item 1", "quantity": 2, "price": 100}],
            "written_total": 250,
            "computed_total": 200,
            "mismatch": true
        }"#;
        let bill: ExtractedBill = serde_json::from_str(json).unwrap();
        assert!(bill.mismatch);
        assert_eq!(bill.written_total, Some(250.0));
        assert_eq!(bill.items.len(), 1);
    }

    #[test]
    fn missing_totals_parse_as_none() {
        let bill: ExtractedBill =
            serde_json::from_str(r#"{"items": [], "written_total": null, "computed_total": null}"#)
                .unwrap();
        assert_eq!(bill.written_total, None);
        assert!(!bill.mismatch);
    }
}
