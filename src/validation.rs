//! Structural validation for order records received from the feed
//!
//! An order is checked once, at ingestion, before it reaches the store.
//! Every violated rule is collected so a rejected event can be diagnosed
//! from a single log line.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::domain::{Delivery, Item, OrderRecord, Payment};
use crate::error::{OrdersError, Result};

static E164_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{1,14}$").unwrap());

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .unwrap()
});

/// Accumulates rule violations under a dotted field path
#[derive(Debug, Default)]
struct Violations {
    errors: Vec<String>,
}

impl Violations {
    fn push(&mut self, field: &str, problem: impl std::fmt::Display) {
        self.errors.push(format!("{}: {}", field, problem));
    }

    /// Required string with a maximum length in characters
    fn required(&mut self, field: &str, value: &str, max: usize) -> bool {
        if value.is_empty() {
            self.push(field, "is required");
            return false;
        }
        self.max_len(field, value, max)
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize) -> bool {
        let len = value.chars().count();
        if len > max {
            self.push(field, format!("length {} exceeds {}", len, max));
            return false;
        }
        true
    }

    fn alphanumeric(&mut self, field: &str, value: &str) {
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            self.push(field, format!("must be alphanumeric, got {:?}", value));
        }
    }

    /// Alphanumerics plus `_` and `-`, as used by customer and service handles
    fn identifier(&mut self, field: &str, value: &str) {
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.push(field, format!("contains invalid characters: {:?}", value));
        }
    }

    fn uuid_v4(&mut self, field: &str, value: &str) {
        match Uuid::parse_str(value) {
            Ok(id) if id.get_version_num() == 4 => {}
            Ok(id) => self.push(
                field,
                format!("must be a version 4 UUID, got version {}", id.get_version_num()),
            ),
            Err(_) => self.push(field, format!("not a UUID: {:?}", value)),
        }
    }

    fn at_least(&mut self, field: &str, value: i64, min: i64) {
        if value < min {
            self.push(field, format!("must be at least {}, got {}", min, value));
        }
    }

    fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(OrdersError::Validation(self.errors.join("; ")))
        }
    }
}

/// Validate an order and all of its sub-entities
///
/// # Returns
/// * `Ok(())` if every rule holds
/// * `Err(OrdersError::Validation)` listing every violation otherwise
pub fn validate_order(order: &OrderRecord) -> Result<()> {
    let mut v = Violations::default();

    v.uuid_v4("order_uid", &order.order_uid);
    if v.required("track_number", &order.track_number, 50) {
        v.alphanumeric("track_number", &order.track_number);
    }
    if v.required("entry", &order.entry, 10) {
        v.alphanumeric("entry", &order.entry);
    }
    v.required("locale", &order.locale, 2);
    if v.max_len("internal_signature", &order.internal_signature, 100) {
        v.alphanumeric("internal_signature", &order.internal_signature);
    }
    if v.required("customer_id", &order.customer_id, 50) {
        v.identifier("customer_id", &order.customer_id);
    }
    if v.required("delivery_service", &order.delivery_service, 50) {
        v.identifier("delivery_service", &order.delivery_service);
    }
    if v.required("shardkey", &order.shardkey, 10) {
        v.alphanumeric("shardkey", &order.shardkey);
    }
    v.at_least("sm_id", order.sm_id as i64, 1);
    if order.date_created.timestamp() <= 0 {
        v.push("date_created", "is required");
    }
    if v.required("oof_shard", &order.oof_shard, 10) {
        v.alphanumeric("oof_shard", &order.oof_shard);
    }

    check_delivery(&mut v, &order.delivery);
    check_payment(&mut v, &order.payment);

    if order.items.is_empty() {
        v.push("items", "must contain at least one item");
    }
    for (idx, item) in order.items.iter().enumerate() {
        check_item(&mut v, idx, item);
    }

    v.into_result()
}

fn check_delivery(v: &mut Violations, d: &Delivery) {
    v.required("delivery.name", &d.name, 100);
    if v.required("delivery.phone", &d.phone, 16) && !E164_RE.is_match(&d.phone) {
        v.push("delivery.phone", format!("not an E.164 number: {:?}", d.phone));
    }
    v.required("delivery.zip", &d.zip, 10);
    v.required("delivery.city", &d.city, 100);
    v.required("delivery.address", &d.address, 100);
    v.required("delivery.region", &d.region, 100);
    if v.required("delivery.email", &d.email, 254) && !EMAIL_RE.is_match(&d.email) {
        v.push("delivery.email", format!("not an email address: {:?}", d.email));
    }
}

fn check_payment(v: &mut Violations, p: &Payment) {
    v.uuid_v4("payment.transaction", &p.transaction);
    v.max_len("payment.request_id", &p.request_id, 50);
    v.required("payment.currency", &p.currency, 3);
    v.required("payment.provider", &p.provider, 50);
    v.at_least("payment.amount", p.amount, 1);
    v.at_least("payment.payment_dt", p.payment_dt, 1);
    if v.required("payment.bank", &p.bank, 20) {
        v.alphanumeric("payment.bank", &p.bank);
    }
    v.at_least("payment.delivery_cost", p.delivery_cost, 0);
    v.at_least("payment.goods_total", p.goods_total, 1);
    v.at_least("payment.custom_fee", p.custom_fee, 0);
}

fn check_item(v: &mut Violations, idx: usize, item: &Item) {
    let f = |name: &str| format!("items[{}].{}", idx, name);

    v.at_least(&f("chrt_id"), item.chrt_id, 1);
    if v.required(&f("track_number"), &item.track_number, 50) {
        v.alphanumeric(&f("track_number"), &item.track_number);
    }
    v.at_least(&f("price"), item.price, 1);
    if v.required(&f("rid"), &item.rid, 50) {
        v.alphanumeric(&f("rid"), &item.rid);
    }
    v.required(&f("name"), &item.name, 50);
    v.at_least(&f("sale"), item.sale as i64, 0);
    if v.required(&f("size"), &item.size, 10) {
        v.alphanumeric(&f("size"), &item.size);
    }
    v.at_least(&f("total_price"), item.total_price, 1);
    v.at_least(&f("nm_id"), item.nm_id, 1);
    v.required(&f("brand"), &item.brand, 50);
    if !(0..=999).contains(&item.status) {
        v.push(&f("status"), format!("must be within 0..=999, got {}", item.status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_order() -> OrderRecord {
        OrderRecord::from_json(include_bytes!("../tests/fixtures/order_valid.json")).unwrap()
    }

    fn violations(order: &OrderRecord) -> String {
        match validate_order(order) {
            Err(OrdersError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_fixture_is_valid() {
        validate_order(&valid_order()).unwrap();
    }

    #[test]
    fn test_order_uid_must_be_uuid_v4() {
        let mut order = valid_order();
        order.order_uid = "not-a-uuid".to_string();
        assert!(violations(&order).contains("order_uid: not a UUID"));

        // v1 UUID
        order.order_uid = "6fa459ea-ee8a-11e3-ac10-0800200c9a66".to_string();
        assert!(violations(&order).contains("version 4"));
    }

    #[test]
    fn test_collects_every_violation() {
        let mut order = valid_order();
        order.track_number = String::new();
        order.delivery.phone = "0123".to_string();
        order.payment.amount = 0;
        order.items[0].status = 1000;

        let msg = violations(&order);
        assert!(msg.contains("track_number: is required"));
        assert!(msg.contains("delivery.phone"));
        assert!(msg.contains("payment.amount: must be at least 1"));
        assert!(msg.contains("items[0].status"));
    }

    #[test]
    fn test_items_required() {
        let mut order = valid_order();
        order.items.clear();
        assert!(violations(&order).contains("items: must contain at least one item"));
    }

    #[test]
    fn test_length_counts_characters() {
        let mut order = valid_order();
        // Two Cyrillic letters are four bytes but two characters
        order.locale = "ру".to_string();
        validate_order(&order).unwrap();

        order.locale = "rus".to_string();
        assert!(violations(&order).contains("locale: length 3 exceeds 2"));
    }

    #[test]
    fn test_email_and_identifiers() {
        let mut order = valid_order();
        order.delivery.email = "test@".to_string();
        order.customer_id = "test_id".to_string();
        order.entry = "WB-IL".to_string();

        let msg = violations(&order);
        assert!(msg.contains("delivery.email"));
        assert!(!msg.contains("customer_id"));
        assert!(msg.contains("entry: must be alphanumeric"));
    }

    #[test]
    fn test_fees_may_be_zero_but_not_negative() {
        let mut order = valid_order();
        order.payment.custom_fee = 0;
        order.payment.delivery_cost = 0;
        order.items[0].sale = 0;
        validate_order(&order).unwrap();

        order.payment.custom_fee = -1;
        assert!(violations(&order).contains("payment.custom_fee"));
    }
}
