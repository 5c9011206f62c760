//! Trip (marea) lifecycle
//!
//! `Inactive -> InProgress -> InDischarge -> Certified`. No other transition
//! exists. The `active_trip` index holds the one trip per vessel that is
//! `InProgress`; it is written and released in the same batch as the trip.

use crate::{
    error::{ensure_present, Error, Result},
    ids,
    reference::ReferenceData,
    storage::{keys, Txn},
    types::{Trip, TripState},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Request to create a trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrip {
    /// Vessel id
    pub vessel_id: String,
    /// Target-species objective id
    pub objective_id: String,
    /// Fishing zone id
    pub zone_id: String,
    /// Trip number within the start year
    pub trip_number: u32,
    /// Departure date
    pub start_date: NaiveDate,
}

/// Create a trip in `Inactive`
pub fn create(txn: &mut Txn<'_>, reference: &dyn ReferenceData, request: &NewTrip) -> Result<Trip> {
    ensure_present("vessel_id", &request.vessel_id)?;
    ensure_present("objective_id", &request.objective_id)?;
    ensure_present("zone_id", &request.zone_id)?;
    if request.trip_number == 0 {
        return Err(Error::validation("trip_number must be >= 1"));
    }

    if !reference.vessel_exists(&request.vessel_id) {
        return Err(Error::not_found(format!("vessel {}", request.vessel_id)));
    }
    if !reference.zone_exists(&request.zone_id) {
        return Err(Error::not_found(format!("zone {}", request.zone_id)));
    }

    let trip_id = ids::trip_id(&request.vessel_id, request.start_date, request.trip_number);
    if txn.contains::<Trip>(&trip_id)? {
        return Err(Error::validation(format!(
            "Trip number {} already used for vessel {} in {}",
            request.trip_number,
            request.vessel_id,
            request.start_date.year()
        )));
    }

    let trip = Trip {
        trip_id,
        vessel_id: request.vessel_id.clone(),
        trip_number: request.trip_number,
        start_date: request.start_date,
        end_date: None,
        objective_id: request.objective_id.clone(),
        zone_id: request.zone_id.clone(),
        state: TripState::Inactive,
        active: false,
    };

    let detail = format!("Created trip {} for vessel {}", trip.trip_id, trip.vessel_id);
    txn.insert(&trip, detail)?;

    Ok(trip)
}

/// Start fishing: `Inactive -> InProgress`
pub fn activate(txn: &mut Txn<'_>, trip_id: &str) -> Result<Trip> {
    let mut trip: Trip = txn.require(trip_id)?;
    ensure_transition(&trip, TripState::InProgress, "activated")?;

    let index_key = keys::active_trip(&trip.vessel_id);
    if let Some(other) = txn.index_get::<String>(&index_key)? {
        return Err(Error::validation(format!(
            "Vessel {} already has trip {} in progress",
            trip.vessel_id, other
        )));
    }

    trip.state = TripState::InProgress;
    let detail = format!("Activated trip {}", trip.trip_id);
    txn.transition(&mut trip, true, detail)?;
    txn.index_put(index_key, &trip.trip_id)?;

    Ok(trip)
}

/// Return to port: `InProgress -> InDischarge`
pub fn finalize(
    txn: &mut Txn<'_>,
    trip_id: &str,
    end_date: NaiveDate,
    today: NaiveDate,
) -> Result<Trip> {
    let mut trip: Trip = txn.require(trip_id)?;
    ensure_transition(&trip, TripState::InDischarge, "finalized")?;

    if end_date <= trip.start_date {
        return Err(Error::validation(format!(
            "End date {} must be after start date {}",
            end_date, trip.start_date
        )));
    }
    if end_date > today {
        return Err(Error::validation(format!(
            "End date {} is in the future",
            end_date
        )));
    }

    trip.state = TripState::InDischarge;
    trip.end_date = Some(end_date);
    let detail = format!("Finalized trip {} on {}", trip.trip_id, end_date);
    txn.transition(&mut trip, true, detail)?;
    txn.index_remove(keys::active_trip(&trip.vessel_id));

    Ok(trip)
}

/// Terminal transition `InDischarge -> Certified`, clearing the active flag.
///
/// Callers check the production preconditions.
pub(crate) fn certify(txn: &mut Txn<'_>, mut trip: Trip) -> Result<Trip> {
    ensure_transition(&trip, TripState::Certified, "certified")?;

    trip.state = TripState::Certified;
    let detail = format!("Certified trip {}", trip.trip_id);
    txn.transition(&mut trip, false, detail)?;

    Ok(trip)
}

/// Load a trip that must be `InProgress` and belong to `vessel_id`
pub(crate) fn require_in_progress(
    txn: &Txn<'_>,
    trip_id: &str,
    vessel_id: &str,
) -> Result<Trip> {
    let trip: Trip = txn.require(trip_id)?;
    require_state(&trip, TripState::InProgress, "used for reporting")?;
    if trip.vessel_id != vessel_id {
        return Err(Error::validation(format!(
            "Trip {} belongs to vessel {}, not {}",
            trip.trip_id, trip.vessel_id, vessel_id
        )));
    }
    Ok(trip)
}

/// Reject any move other than to the single successor of the trip's state
fn ensure_transition(trip: &Trip, next: TripState, action: &str) -> Result<()> {
    if trip.state.is_terminal() {
        return Err(Error::validation(format!(
            "Trip {} is {} and can no longer be {}",
            trip.trip_id, trip.state, action
        )));
    }
    if !trip.state.can_transition_to(next) {
        return Err(Error::validation(format!(
            "Trip {} is {} and cannot be {}",
            trip.trip_id, trip.state, action
        )));
    }
    Ok(())
}

pub(crate) fn require_state(trip: &Trip, expected: TripState, action: &str) -> Result<()> {
    if trip.state != expected {
        return Err(Error::validation(format!(
            "Trip {} is {} and cannot be {}",
            trip.trip_id, trip.state, action
        )));
    }
    Ok(())
}
