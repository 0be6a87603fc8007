//! Raw API sales -> storage records.

use crate::models::{ItemId, SaleRecord};
use crate::scrapers::universalis::SaleEntry;
use crate::sync::identity::sale_identity;

/// Normalize an item's raw sales, preserving input order.
pub fn format_sale_entries(item_id: ItemId, entries: &[SaleEntry]) -> Vec<SaleRecord> {
    entries
        .iter()
        .map(|sale| {
            let total_price = sale.price_per_unit.saturating_mul(sale.quantity);
            SaleRecord {
                item_id,
                hq: sale.hq,
                price_per_unit: sale.price_per_unit,
                quantity: sale.quantity,
                timestamp: sale.timestamp,
                world_id: sale.world_id,
                identity_hash: sale_identity(item_id, sale.timestamp, &sale.buyer_name, total_price),
                aggregated: false,
            }
        })
        .collect()
}
