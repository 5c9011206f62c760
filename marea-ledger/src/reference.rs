//! Reference-data collaborator
//!
//! Vessels, products, prices, species, zones, quota movements and baits are
//! maintained elsewhere. The ledger only reads them through
//! [`ReferenceData`].

use crate::{
    error::{Error, Result},
    types::{QuotaCategory, QuotaMovement, QuotaTreatment},
};
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Read-only lookups the ledger depends on
pub trait ReferenceData: Send + Sync + 'static {
    /// Vessel is registered
    fn vessel_exists(&self, vessel_id: &str) -> bool;

    /// Gear type of a vessel
    fn vessel_gear(&self, vessel_id: &str) -> Option<String>;

    /// Active unit price (USD/kg) for a product caught with a gear type
    fn active_price(&self, product_id: &str, gear_id: &str) -> Option<Decimal>;

    /// Processed-to-round weight conversion factor of a product
    fn conversion_factor(&self, product_id: &str) -> Option<Decimal>;

    /// Product is registered
    fn product_exists(&self, product_id: &str) -> bool;

    /// Species is registered
    fn species_exists(&self, species_id: &str) -> bool;

    /// Zone is registered
    fn zone_exists(&self, zone_id: &str) -> bool;

    /// Quota movement definition
    fn quota_movement(&self, movement_id: &str) -> Option<QuotaMovement>;

    /// Bait pieces per kilo
    fn bait_pieces_per_kg(&self, bait_id: &str) -> Option<Decimal>;
}

/// Concurrent in-memory reference data
#[derive(Debug, Default)]
pub struct InMemoryReferenceData {
    vessels: DashMap<String, String>,
    products: DashSet<String>,
    factors: DashMap<String, Decimal>,
    prices: DashMap<(String, String), Decimal>,
    species: DashSet<String>,
    zones: DashSet<String>,
    movements: DashMap<String, QuotaMovement>,
    baits: DashMap<String, Decimal>,
}

impl InMemoryReferenceData {
    /// Empty reference data
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vessel with its gear type
    pub fn with_vessel(self, vessel_id: &str, gear_id: &str) -> Self {
        self.vessels.insert(vessel_id.to_string(), gear_id.to_string());
        self
    }

    /// Register a product without a conversion factor
    pub fn with_product(self, product_id: &str) -> Self {
        self.products.insert(product_id.to_string());
        self
    }

    /// Set a product's conversion factor, registering the product
    pub fn with_conversion_factor(self, product_id: &str, factor: Decimal) -> Self {
        self.products.insert(product_id.to_string());
        self.factors.insert(product_id.to_string(), factor);
        self
    }

    /// Set the active price of a (product, gear) pair
    pub fn with_price(self, product_id: &str, gear_id: &str, unit_price: Decimal) -> Self {
        self.set_price(product_id, gear_id, unit_price);
        self
    }

    /// Register a species
    pub fn with_species(self, species_id: &str) -> Self {
        self.species.insert(species_id.to_string());
        self
    }

    /// Register a zone
    pub fn with_zone(self, zone_id: &str) -> Self {
        self.zones.insert(zone_id.to_string());
        self
    }

    /// Register a quota movement
    pub fn with_movement(
        self,
        movement_id: &str,
        treatment: QuotaTreatment,
        category: QuotaCategory,
    ) -> Self {
        self.movements.insert(
            movement_id.to_string(),
            QuotaMovement {
                treatment,
                category,
            },
        );
        self
    }

    /// Register a bait
    pub fn with_bait(self, bait_id: &str, pieces_per_kg: Decimal) -> Self {
        self.baits.insert(bait_id.to_string(), pieces_per_kg);
        self
    }

    /// Replace the active price of a (product, gear) pair
    pub fn set_price(&self, product_id: &str, gear_id: &str, unit_price: Decimal) {
        self.prices
            .insert((product_id.to_string(), gear_id.to_string()), unit_price);
    }

    /// Load from a TOML seed file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a TOML seed document
    pub fn from_toml(content: &str) -> Result<Self> {
        let seed: ReferenceSeed = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse reference data: {}", e)))?;

        let mut data = Self::new();
        for vessel in seed.vessels {
            data = data.with_vessel(&vessel.id, &vessel.gear);
        }
        for product in seed.products {
            data = match product.conversion_factor {
                Some(factor) => data.with_conversion_factor(&product.id, factor),
                None => data.with_product(&product.id),
            };
        }
        for price in seed.prices {
            data = data.with_price(&price.product, &price.gear, price.unit_price);
        }
        for species in seed.species {
            data = data.with_species(&species);
        }
        for zone in seed.zones {
            data = data.with_zone(&zone);
        }
        for movement in seed.movements {
            data = data.with_movement(&movement.id, movement.treatment, movement.category);
        }
        for bait in seed.baits {
            data = data.with_bait(&bait.id, bait.pieces_per_kg);
        }

        tracing::info!(
            vessels = data.vessels.len(),
            products = data.products.len(),
            prices = data.prices.len(),
            movements = data.movements.len(),
            "Loaded reference data"
        );

        Ok(data)
    }
}

impl ReferenceData for InMemoryReferenceData {
    fn vessel_exists(&self, vessel_id: &str) -> bool {
        self.vessels.contains_key(vessel_id)
    }

    fn vessel_gear(&self, vessel_id: &str) -> Option<String> {
        self.vessels.get(vessel_id).map(|gear| gear.value().clone())
    }

    fn active_price(&self, product_id: &str, gear_id: &str) -> Option<Decimal> {
        self.prices
            .get(&(product_id.to_string(), gear_id.to_string()))
            .map(|price| *price.value())
    }

    fn conversion_factor(&self, product_id: &str) -> Option<Decimal> {
        self.factors.get(product_id).map(|factor| *factor.value())
    }

    fn product_exists(&self, product_id: &str) -> bool {
        self.products.contains(product_id)
    }

    fn species_exists(&self, species_id: &str) -> bool {
        self.species.contains(species_id)
    }

    fn zone_exists(&self, zone_id: &str) -> bool {
        self.zones.contains(zone_id)
    }

    fn quota_movement(&self, movement_id: &str) -> Option<QuotaMovement> {
        self.movements.get(movement_id).map(|movement| *movement.value())
    }

    fn bait_pieces_per_kg(&self, bait_id: &str) -> Option<Decimal> {
        self.baits.get(bait_id).map(|pieces| *pieces.value())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReferenceSeed {
    species: Vec<String>,
    zones: Vec<String>,
    vessels: Vec<VesselSeed>,
    products: Vec<ProductSeed>,
    prices: Vec<PriceSeed>,
    movements: Vec<MovementSeed>,
    baits: Vec<BaitSeed>,
}

#[derive(Debug, Deserialize)]
struct VesselSeed {
    id: String,
    gear: String,
}

#[derive(Debug, Deserialize)]
struct ProductSeed {
    id: String,
    conversion_factor: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PriceSeed {
    product: String,
    gear: String,
    unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct MovementSeed {
    id: String,
    treatment: QuotaTreatment,
    category: QuotaCategory,
}

#[derive(Debug, Deserialize)]
struct BaitSeed {
    id: String,
    pieces_per_kg: Decimal,
}
