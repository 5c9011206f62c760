//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for weights, tonnage and prices)
//! - Compile-time entity identity (no runtime introspection)

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// A persisted entity with a stable string identity.
///
/// Every stored kind names its column family and the identity field used in
/// audit details. Storage is generic over this trait.
pub trait Entity: Serialize + DeserializeOwned {
    /// Column family holding this kind
    const COLUMN: &'static str;

    /// Entity type reported to the audit collaborator
    const ENTITY_TYPE: &'static str;

    /// Name of the identity field, for human-readable audit details
    const ID_FIELD: &'static str;

    /// Identity of this entity
    fn id(&self) -> &str;
}

/// An entity carrying a generic active/inactive flag.
pub trait Activatable {
    /// Set the flag
    fn set_active(&mut self, active: bool);
}

// ---------------------------------------------------------------------------
// Trips
// ---------------------------------------------------------------------------

/// Operational state of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TripState {
    /// Created, not yet sailing
    Inactive = 1,
    /// At sea; production may be reported
    InProgress = 2,
    /// Back in port, catch being unloaded and certified
    InDischarge = 3,
    /// Certified (terminal)
    Certified = 4,
}

impl TripState {
    /// Whether `next` is the single legal successor of this state
    pub fn can_transition_to(&self, next: TripState) -> bool {
        matches!(
            (self, next),
            (TripState::Inactive, TripState::InProgress)
                | (TripState::InProgress, TripState::InDischarge)
                | (TripState::InDischarge, TripState::Certified)
        )
    }

    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripState::Certified)
    }
}

impl fmt::Display for TripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TripState::Inactive => "Inactive",
            TripState::InProgress => "InProgress",
            TripState::InDischarge => "InDischarge",
            TripState::Certified => "Certified",
        };
        f.write_str(label)
    }
}

/// One fishing voyage of a vessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    /// Derived id, `M-{vessel}-{year}{number:00}`
    pub trip_id: String,

    /// Vessel (cost center) id
    pub vessel_id: String,

    /// Trip number, unique per vessel and start year
    pub trip_number: u32,

    /// Departure date
    pub start_date: NaiveDate,

    /// Return date, set by finalize
    pub end_date: Option<NaiveDate>,

    /// Target-species objective id
    pub objective_id: String,

    /// Fishing zone id
    pub zone_id: String,

    /// Lifecycle state
    pub state: TripState,

    /// Generic active flag
    pub active: bool,
}

impl Entity for Trip {
    const COLUMN: &'static str = "trips";
    const ENTITY_TYPE: &'static str = "trip";
    const ID_FIELD: &'static str = "trip_id";

    fn id(&self) -> &str {
        &self.trip_id
    }
}

impl Activatable for Trip {
    fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

// ---------------------------------------------------------------------------
// Quota ledger
// ---------------------------------------------------------------------------

/// How a quota movement affects the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaTreatment {
    /// Allocation or purchase; positive entry
    Increase,
    /// Transfer to third parties; negative entry
    Decrease,
    /// Zone-to-zone transfer; paired entries
    ZoneChange,
}

/// Whether a movement may be applied more than once per species and year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaCategory {
    /// At most one allocation per species and year
    Unique,
    /// Any number of entries
    Repeatable,
}

/// Configured quota movement definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaMovement {
    /// Ledger treatment
    pub treatment: QuotaTreatment,
    /// Annual category
    pub category: QuotaCategory,
}

/// Sequencing partition of the quota ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuotaPartition {
    /// Movement id
    pub movement_id: String,
    /// Species id
    pub species_id: String,
    /// Zone id
    pub zone_id: String,
    /// Quota year
    pub year: i32,
}

impl QuotaPartition {
    /// Create a partition key
    pub fn new(
        movement_id: impl Into<String>,
        species_id: impl Into<String>,
        zone_id: impl Into<String>,
        year: i32,
    ) -> Self {
        Self {
            movement_id: movement_id.into(),
            species_id: species_id.into(),
            zone_id: zone_id.into(),
            year,
        }
    }
}

impl fmt::Display for QuotaPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.movement_id, self.species_id, self.zone_id, self.year
        )
    }
}

/// Immutable quota ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEntry {
    /// Derived id, `{movement}-{species}-{zone}-{year}-{sequence:000}`
    pub control_id: String,
    /// Movement id
    pub movement_id: String,
    /// Species id
    pub species_id: String,
    /// Quota year
    pub year: i32,
    /// Month of the movement (1-12)
    pub month: u32,
    /// Signed tonnage
    pub tons: Decimal,
    /// Zone id
    pub zone_id: String,
    /// Position within the partition, starting at 1
    pub sequence: u32,
    /// Free text
    pub comment: String,
}

impl QuotaEntry {
    /// Partition this entry belongs to
    pub fn partition(&self) -> QuotaPartition {
        QuotaPartition::new(
            self.movement_id.clone(),
            self.species_id.clone(),
            self.zone_id.clone(),
            self.year,
        )
    }
}

impl Entity for QuotaEntry {
    const COLUMN: &'static str = "quota";
    const ENTITY_TYPE: &'static str = "quota_entry";
    const ID_FIELD: &'static str = "control_id";

    fn id(&self) -> &str {
        &self.control_id
    }
}

// ---------------------------------------------------------------------------
// Production records
// ---------------------------------------------------------------------------

/// Lifecycle status of a versioned record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Current version
    #[serde(rename = "A")]
    Active,
    /// Replaced by a later version, retained for history
    #[serde(rename = "M")]
    Superseded,
}

/// Port certification flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Certification {
    /// Not yet certified
    #[serde(rename = "N")]
    Pending,
    /// Certified at trip close-out
    #[serde(rename = "S")]
    Certified,
}

/// Kind of production record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// Catch line reported at sea
    Reported,
    /// Balancing entry written at discharge
    Discharge,
    /// Port-certified weight for a product
    FinalCertification,
}

/// Base key of a reported production line
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductionKey {
    /// Operation id
    pub operation_id: String,
    /// Product id
    pub product_id: String,
    /// Haul number (>= 1 for reported lines)
    pub haul: u32,
}

impl ProductionKey {
    /// Create a base key
    pub fn new(operation_id: impl Into<String>, product_id: impl Into<String>, haul: u32) -> Self {
        Self {
            operation_id: operation_id.into(),
            product_id: product_id.into(),
            haul,
        }
    }
}

impl fmt::Display for ProductionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:02}", self.operation_id, self.product_id, self.haul)
    }
}

/// One production record (reported line, discharge or final certification)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRecord {
    /// Derived id
    pub production_id: String,
    /// Record kind
    pub kind: RecordKind,
    /// Version within the base key (99 for sentinel kinds)
    pub version: u32,
    /// Operation id
    pub operation_id: String,
    /// Production date
    pub date: NaiveDate,
    /// Vessel id
    pub vessel_id: String,
    /// Trip id
    pub trip_id: String,
    /// Product id
    pub product_id: String,
    /// Haul number (99 for sentinel kinds)
    pub haul: u32,
    /// Kilos (negative on discharge records)
    pub kilos: Decimal,
    /// Boxes (negative on discharge records)
    pub boxes: i64,
    /// Kilos per box
    pub average_weight: Decimal,
    /// Round-weight equivalent
    pub biomass: Decimal,
    /// Unit price (USD/kg)
    pub unit_price: Decimal,
    /// kilos x price
    pub total_value: Decimal,
    /// Value per biomass kilo
    pub unit_bio_value: Decimal,
    /// Pushed to the downstream ERP
    pub synchronized: bool,
    /// Certification flag
    pub certification: Certification,
    /// Lifecycle status
    pub status: RecordStatus,
    /// Port certification date
    pub certification_date: Option<NaiveDate>,
    /// Port certification number
    pub certification_number: Option<String>,
    /// Share of the trip's reported production
    pub production_share: Option<Decimal>,
    /// Certified kilos attributed to this record
    pub certified_kilos: Option<Decimal>,
}

impl ProductionRecord {
    /// Base key of this record
    pub fn key(&self) -> ProductionKey {
        ProductionKey::new(self.operation_id.clone(), self.product_id.clone(), self.haul)
    }

    /// Active and not yet certified
    pub fn is_outstanding(&self) -> bool {
        self.status == RecordStatus::Active && self.certification == Certification::Pending
    }
}

impl Entity for ProductionRecord {
    const COLUMN: &'static str = "production";
    const ENTITY_TYPE: &'static str = "production_record";
    const ID_FIELD: &'static str = "production_id";

    fn id(&self) -> &str {
        &self.production_id
    }
}

/// Current-version index entry for a versioned base key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHead {
    /// Highest version issued
    pub latest_version: u32,
    /// Id of the `Active` version, if any
    pub active_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Daily operations
// ---------------------------------------------------------------------------

/// Hour breakdown of one vessel day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBreakdown {
    /// Fishing
    pub fishing: Decimal,
    /// Steaming to or between grounds
    pub transit: Decimal,
    /// Hove-to (weather)
    pub hove_to: Decimal,
    /// Mechanical breakdown
    pub breakdown: Decimal,
    /// Accident
    pub accident: Decimal,
    /// Crew matters
    pub crew: Decimal,
}

impl HourBreakdown {
    /// Sum of all categories; a validation error when it overflows
    pub fn total(&self) -> crate::Result<Decimal> {
        crate::amount::sum(
            [
                self.fishing,
                self.transit,
                self.hove_to,
                self.breakdown,
                self.accident,
                self.crew,
            ],
            "total hours",
        )
    }
}

/// Daily operation report of a vessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOperation {
    /// Derived id, `OP-{vessel}-{yyyyMMdd}-V{version:00}`
    pub operation_id: String,
    /// Version within (vessel, date)
    pub version: u32,
    /// Vessel id
    pub vessel_id: String,
    /// Report date
    pub date: NaiveDate,
    /// Trip id
    pub trip_id: String,
    /// Operativity classification (`OP` = fishing day)
    pub operativity_id: String,
    /// Nautical miles sailed
    pub nautical_miles: Decimal,
    /// Wind force (Beaufort)
    pub wind_force: u32,
    /// Noon latitude
    pub latitude: Decimal,
    /// Noon longitude
    pub longitude: Decimal,
    /// Hauls performed
    pub hauls: u32,
    /// Fuel consumption
    pub fuel_consumption: Decimal,
    /// Bait id
    pub bait_id: Option<String>,
    /// Bait consumption (kg)
    pub bait_consumption: Decimal,
    /// Bait pieces, derived from consumption
    pub bait_pieces: u64,
    /// Hooks set
    pub hooks: u32,
    /// Hours per category
    pub hours: HourBreakdown,
    /// Total hours of the day
    pub total_hours: Decimal,
    /// Pushed to the downstream ERP
    pub synchronized: bool,
    /// Lifecycle status
    pub status: RecordStatus,
}

impl Entity for DailyOperation {
    const COLUMN: &'static str = "operations";
    const ENTITY_TYPE: &'static str = "daily_operation";
    const ID_FIELD: &'static str = "operation_id";

    fn id(&self) -> &str {
        &self.operation_id
    }
}
