use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{OrdersError, Result};
use crate::validation::validate_order;

/// A customer order as produced on the feed and stored in the database.
///
/// Field order matters: re-serializing a record reproduces the producer's
/// payload, which is what ends up in logs when an event is traced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    /// Keeps the producer's offset and sub-second digits
    #[serde(with = "wire_time")]
    pub date_created: DateTime<FixedOffset>,
    pub oof_shard: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
}

/// Delivery details, one per order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details, one per order. Monetary values are in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A single line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl OrderRecord {
    /// Decode a feed payload. Decoding failures are reported as malformed events.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| OrdersError::MalformedEvent(e.to_string()))
    }

    /// Encode in wire format
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Read, decode and validate an order from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let order = Self::from_json(&data).map_err(|e| {
            OrdersError::MalformedEvent(format!("{}: {}", path.display(), e))
        })?;
        validate_order(&order)?;
        Ok(order)
    }

    /// Sum of item totals, in minor units
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|i| i.total_price).sum()
    }
}

/// Render a timestamp the way the producer writes it: RFC 3339 with the
/// fraction trimmed of trailing zeros (omitted when zero) and `Z` for a zero
/// offset.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let digits = format!("{:09}", nanos);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }

    let offset = ts.offset().local_minus_utc();
    if offset == 0 {
        out.push('Z');
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        let _ = write!(out, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60);
    }
    out
}

/// Parse an RFC 3339 timestamp, keeping its offset
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
}

mod wire_time {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &DateTime<FixedOffset>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for OrderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} items, {} {})",
            self.order_uid,
            self.items.len(),
            self.payment.amount,
            self.payment.currency
        )
    }
}
