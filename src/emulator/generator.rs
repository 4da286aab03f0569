//! Synthetic order records
//!
//! Every generated order passes `validate_order`.

use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::domain::{Delivery, Item, OrderRecord, Payment};

const NAMES: &[&str] = &["Test Testov", "Ivan Petrov", "Anna Smirnova", "Dmitry Volkov"];
const CITIES: &[(&str, &str)] = &[
    ("Rostov-on-Don", "Rostov Region"),
    ("Kazan", "Tatarstan"),
    ("Kiryat Mozkin", "Kraiot"),
    ("Novosibirsk", "Novosibirsk Oblast"),
];
const BANKS: &[&str] = &["Sber", "alpha", "Tinkoff", "VTB"];
const PRODUCTS: &[(&str, &str)] = &[
    ("Book", "AST"),
    ("Pen", "AST"),
    ("Mascaras", "Vivienne Sabo"),
    ("Headphones", "Sony"),
    ("Mug", "Home Line"),
];
const ALNUM_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ALNUM_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn token<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

fn pick<'a, R: Rng + ?Sized, T>(rng: &mut R, items: &'a [T]) -> &'a T {
    // Every table above is non-empty
    items.choose(rng).unwrap_or(&items[0])
}

/// Build a random, valid order
pub fn generate_order<R: Rng + ?Sized>(rng: &mut R) -> OrderRecord {
    let order_uid = Uuid::new_v4().to_string();
    let track_number = format!("WB{}", token(rng, ALNUM_UPPER, 12));
    let (city, region) = *pick(rng, CITIES);

    let item_count = rng.gen_range(1..=3);
    let items: Vec<Item> = (0..item_count)
        .map(|_| {
            let (name, brand) = *pick(rng, PRODUCTS);
            let price: i64 = rng.gen_range(100..=5_000);
            let sale: i32 = rng.gen_range(0..=50);
            let total_price = (price * (100 - sale as i64) / 100).max(1);
            Item {
                chrt_id: rng.gen_range(1_000_000..=9_999_999),
                track_number: track_number.clone(),
                price,
                rid: token(rng, ALNUM_LOWER, 20),
                name: name.to_string(),
                sale,
                size: rng.gen_range(0..=5).to_string(),
                total_price,
                nm_id: rng.gen_range(1_000_000..=9_999_999),
                brand: brand.to_string(),
                status: 202,
            }
        })
        .collect();

    let goods_total: i64 = items.iter().map(|i| i.total_price).sum();
    let delivery_cost: i64 = rng.gen_range(0..=2_000);
    let custom_fee: i64 = rng.gen_range(0..=20);
    let now = Local::now().fixed_offset();

    OrderRecord {
        order_uid: order_uid.clone(),
        track_number,
        entry: "WBIL".to_string(),
        locale: pick(rng, &["en", "ru"]).to_string(),
        internal_signature: String::new(),
        customer_id: format!("customer_{}", token(rng, ALNUM_LOWER, 6)),
        delivery_service: "meest".to_string(),
        shardkey: rng.gen_range(1..=10).to_string(),
        sm_id: rng.gen_range(1..=100),
        date_created: now,
        oof_shard: rng.gen_range(1..=2).to_string(),
        delivery: Delivery {
            name: pick(rng, NAMES).to_string(),
            phone: format!("+972{}", token(rng, b"0123456789", 7)),
            zip: rng.gen_range(1_000_000..=9_999_999).to_string(),
            city: city.to_string(),
            address: format!("Ploshad Mira {}", rng.gen_range(1..=99)),
            region: region.to_string(),
            email: format!("{}@gmail.com", token(rng, ALNUM_LOWER, 8)),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: "RUB".to_string(),
            provider: "wbpay".to_string(),
            amount: goods_total + delivery_cost + custom_fee,
            payment_dt: now.timestamp(),
            bank: pick(rng, BANKS).to_string(),
            delivery_cost,
            goods_total,
            custom_fee,
        },
        items,
    }
}

/// The fixed two-item order used for smoke tests
pub fn sample_order() -> OrderRecord {
    let order_uid = "6d2a89ac-0ede-40cd-9fed-bd6b88d855b0".to_string();
    let item = |chrt_id, price, name: &str, sale, size: &str, total_price, nm_id, status| Item {
        chrt_id,
        track_number: "WBMYTESTTRACK".to_string(),
        price,
        rid: "cb3416617a723ae0btest".to_string(),
        name: name.to_string(),
        sale,
        size: size.to_string(),
        total_price,
        nm_id,
        brand: "AST".to_string(),
        status,
    };

    OrderRecord {
        order_uid: order_uid.clone(),
        track_number: "WBMYTESTTRACKNUMBER".to_string(),
        entry: "WBMY".to_string(),
        locale: "ru".to_string(),
        internal_signature: String::new(),
        customer_id: "test_id".to_string(),
        delivery_service: "test_service".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Local::now().fixed_offset(),
        oof_shard: "2".to_string(),
        delivery: Delivery {
            name: "Kafka Test Testov".to_string(),
            phone: "+9820000000".to_string(),
            zip: "2532712".to_string(),
            city: "Rostov-on-Don".to_string(),
            address: "Lenina street 28".to_string(),
            region: "Rostov Region".to_string(),
            email: "kafkatest@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: "RUB".to_string(),
            provider: "WBPAY".to_string(),
            amount: 2156,
            payment_dt: 12425325,
            bank: "Sber".to_string(),
            delivery_cost: 2000,
            goods_total: 453,
            custom_fee: 10,
        },
        items: vec![
            item(2200232, 559, "Book", 20, "3", 450, 3335551, 404),
            item(2221232, 234, "Pen", 14, "1", 200, 3335251, 403),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_order;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_orders_validate() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let order = generate_order(&mut rng);
            validate_order(&order).unwrap();
            assert_eq!(
                order.payment.amount,
                order.items_total() + order.payment.delivery_cost + order.payment.custom_fee
            );
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = generate_order(&mut rng);
        let b = generate_order(&mut rng);
        assert_ne!(a.order_uid, b.order_uid);
    }

    #[test]
    fn test_sample_order_validates() {
        let order = sample_order();
        validate_order(&order).unwrap();
        assert_eq!(order.items.len(), 2);
    }
}
