//! Human-readable, date-scoped sequence numbers.

use std::time::Duration;

use chrono::Utc;
use store::{KeyValueStore, StoreError};

/// Entity prefixes for generated numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPrefix {
    Order,
    Transaction,
    Shipment,
}

impl EntityPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Order => "ORD",
            EntityPrefix::Transaction => "TXN",
            EntityPrefix::Shipment => "SHP",
        }
    }
}

/// Counter keys expire after one day; the date in the key does the real
/// scoping, the TTL just keeps the store from accumulating dead keys.
const COUNTER_TTL: Duration = Duration::from_secs(86_400);

/// Generates `{prefix}{yymmdd}{seq:04}` numbers from an atomic counter
/// scoped to (prefix, calendar day).
///
/// Uniqueness and monotonicity under concurrent callers come from the
/// store's atomic increment; prefixes never coordinate with each other. The
/// counter is independent of any surrounding transaction, so a rolled-back
/// order burns its number rather than reusing it.
#[derive(Clone)]
pub struct SequenceGenerator<K> {
    kv: K,
}

impl<K: KeyValueStore> SequenceGenerator<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Returns the next number for the given prefix and today's date.
    pub async fn next(&self, prefix: EntityPrefix) -> Result<String, StoreError> {
        let date_key = Utc::now().format("%y%m%d").to_string();
        self.next_for_date(prefix, &date_key).await
    }

    async fn next_for_date(
        &self,
        prefix: EntityPrefix,
        date_key: &str,
    ) -> Result<String, StoreError> {
        let key = format!("seq:{}:{}", prefix.as_str(), date_key);
        let seq = self.kv.incr(&key, COUNTER_TTL).await?;
        Ok(format!("{}{}{:04}", prefix.as_str(), date_key, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryKeyValueStore;

    #[tokio::test]
    async fn numbers_carry_prefix_date_and_sequence() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        let first = generator
            .next_for_date(EntityPrefix::Order, "260807")
            .await
            .unwrap();
        let second = generator
            .next_for_date(EntityPrefix::Order, "260807")
            .await
            .unwrap();
        assert_eq!(first, "ORD2608070001");
        assert_eq!(second, "ORD2608070002");
    }

    #[tokio::test]
    async fn prefixes_count_independently() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        generator
            .next_for_date(EntityPrefix::Order, "260807")
            .await
            .unwrap();
        let txn = generator
            .next_for_date(EntityPrefix::Transaction, "260807")
            .await
            .unwrap();
        let shp = generator
            .next_for_date(EntityPrefix::Shipment, "260807")
            .await
            .unwrap();
        assert_eq!(txn, "TXN2608070001");
        assert_eq!(shp, "SHP2608070001");
    }

    #[tokio::test]
    async fn days_count_independently() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        generator
            .next_for_date(EntityPrefix::Order, "260806")
            .await
            .unwrap();
        let next_day = generator
            .next_for_date(EntityPrefix::Order, "260807")
            .await
            .unwrap();
        assert_eq!(next_day, "ORD2608070001");
    }

    #[tokio::test]
    async fn sequence_grows_past_four_digits_without_wrapping() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        let mut last = String::new();
        for _ in 0..3 {
            last = generator
                .next_for_date(EntityPrefix::Order, "260807")
                .await
                .unwrap();
        }
        assert_eq!(last, "ORD2608070003");
    }

    #[tokio::test]
    async fn concurrent_callers_get_unique_numbers() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        let mut handles = Vec::new();
        for _ in 0..25 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                generator
                    .next_for_date(EntityPrefix::Order, "260807")
                    .await
                    .unwrap()
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        let count = numbers.len();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), count);
    }

    #[tokio::test]
    async fn today_number_uses_current_date() {
        let generator = SequenceGenerator::new(InMemoryKeyValueStore::new());
        let number = generator.next(EntityPrefix::Order).await.unwrap();
        let expected_prefix = format!("ORD{}", Utc::now().format("%y%m%d"));
        assert!(number.starts_with(&expected_prefix));
        assert!(number.ends_with("0001"));
    }
}
