//! Synthetic product records sent as payloads of write requests.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Range of generated category identifiers.
pub const CATEGORY_IDS: RangeInclusive<u32> = 1..=50;
/// Range of generated product weights.
pub const WEIGHTS: RangeInclusive<u32> = 100..=5000;
/// Range of generated auxiliary identifiers.
pub const OTHER_IDS: RangeInclusive<u32> = 1..=1000;

/// A product record as accepted by `POST /products/{id}/details`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Identifier of the product, also used in the request path.
    pub product_id: u64,
    /// Stock keeping unit, derived from the identifier.
    pub sku: String,
    /// Name of the manufacturer.
    pub manufacturer: String,
    /// Category of the product.
    pub category_id: u32,
    /// Weight of the product.
    pub weight: u32,
    /// Unrelated identifier carried along to pad the payload.
    pub some_other_id: u32,
}

impl Product {
    /// Creates the baseline record for `id` that users write before reading it back.
    ///
    /// The identifier, SKU and manufacturer follow from `id`, all other fields are random.
    pub fn seed<R: Rng>(id: u64, rng: &mut R) -> Self {
        Self {
            product_id: id,
            sku: format!("SKU-{id:04}"),
            manufacturer: format!("Manufacturer-{id}"),
            category_id: rng.random_range(CATEGORY_IDS),
            weight: rng.random_range(WEIGHTS),
            some_other_id: rng.random_range(OTHER_IDS),
        }
    }

    /// Creates a fully randomized record with an identifier drawn from `ids`.
    pub fn random<R: Rng>(ids: RangeInclusive<u64>, rng: &mut R) -> Self {
        let id = rng.random_range(ids);
        let suffix: u32 = rng.random_range(1000..=9999);
        let manufacturer: u32 = rng.random_range(1..=100);

        Self {
            product_id: id,
            sku: format!("SKU-{id:04}-{suffix}"),
            manufacturer: format!("Manufacturer-{manufacturer}"),
            category_id: rng.random_range(CATEGORY_IDS),
            weight: rng.random_range(WEIGHTS),
            some_other_id: rng.random_range(OTHER_IDS),
        }
    }

    /// Creates the constant record used by write-only users.
    pub fn bulk(id: u64) -> Self {
        Self {
            product_id: id,
            sku: format!("SKU-WRITE-{id}"),
            manufacturer: "Load Test Corp".to_owned(),
            category_id: 1,
            weight: 500,
            some_other_id: 1,
        }
    }
}
