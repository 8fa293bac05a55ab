mod category;
mod invoice;
mod invoice_item;
mod product;
mod spending;
mod sync_queue;

pub use category::Category;
pub(crate) use category::CategoryRow;
pub use invoice::Invoice;
pub use invoice_item::InvoiceItem;
pub use product::Product;
pub use spending::SpendingTotal;
pub use sync_queue::{EntityType, NewSyncEntry, SyncOperation, SyncQueueEntry};

use serde::{Deserialize, Deserializer, de};

/// Decimal columns come back from the server either as JSON numbers or as strings.
pub(crate) fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(value) => Ok(value),
        NumberOrString::String(text) => text.trim().parse().map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoice_accepts_decimal_strings_from_the_server() {
        let invoice: Invoice = serde_json::from_value(json!({
            "id": "inv-1",
            "userId": "user-1",
            "accessKey": "35240512345678000190650010000012341000012348",
            "establishmentName": "Mercado Bom Preço",
            "date": "2024-05-10T14:30:00Z",
            "totalValue": "42.50",
            "items": [{
                "id": "item-1",
                "invoiceId": "inv-1",
                "description": "ARROZ TIPO 1 5KG",
                "quantity": "1.000",
                "unit": "UN",
                "unitPrice": 30.5,
                "totalPrice": "30.50",
                "productCode": "7891234567890"
            }]
        }))
        .unwrap();

        assert_eq!(invoice.total_value, 42.5);
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].quantity, 1.0);
        assert_eq!(invoice.items[0].total_price, 30.5);
        assert!(!invoice.synced);
        assert!(!invoice.local_only);
    }

    #[test]
    fn local_flags_never_reach_the_wire() {
        let invoice: Invoice = serde_json::from_value(json!({
            "establishmentName": "Padaria",
            "date": "2024-05-10T08:00:00Z",
            "totalValue": 12
        }))
        .unwrap();

        let value = serde_json::to_value(&invoice).unwrap();
        assert!(value.get("synced").is_none());
        assert!(value.get("localOnly").is_none());
        assert_eq!(value["establishmentName"], "Padaria");
    }

    #[test]
    fn unknown_operations_do_not_parse() {
        assert_eq!(SyncOperation::parse("create_invoice"), Some(SyncOperation::CreateInvoice));
        assert_eq!(SyncOperation::parse("delete_invoice"), Some(SyncOperation::DeleteInvoice));
        assert_eq!(SyncOperation::parse("update_budget"), None);
    }
}
