//! Availability change classification.

use std::fmt;

use crate::models::observation::Observation;
use crate::models::product;

/// What an observation means relative to the stored product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// First sighting of a product that is already available.
    Created,
    BecameAvailable,
    BecameUnavailable,
    /// Price or currency moved, availability did not.
    Updated,
    NoOp,
}

impl Change {
    /// True when an "available" announcement must go out.
    pub fn opens_thread(self) -> bool {
        matches!(self, Change::Created | Change::BecameAvailable)
    }

    pub fn closes_thread(self) -> bool {
        matches!(self, Change::BecameUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::BecameAvailable => "became_available",
            Change::BecameUnavailable => "became_unavailable",
            Change::Updated => "updated",
            Change::NoOp => "noop",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an observation.
///
/// A new product only notifies when it is observed available; a new product
/// that was never seen available stays silent.
pub fn classify(
    was_new: bool,
    stored_available: bool,
    observed_available: bool,
    price_changed: bool,
) -> Change {
    if was_new {
        return if observed_available {
            Change::Created
        } else {
            Change::NoOp
        };
    }

    match (stored_available, observed_available) {
        (false, true) => Change::BecameAvailable,
        (true, false) => Change::BecameUnavailable,
        _ if price_changed => Change::Updated,
        _ => Change::NoOp,
    }
}

/// Classifies `observation` against the stored record returned by the upsert.
pub fn detect(was_new: bool, stored: &product::Model, observation: &Observation) -> Change {
    let price_changed = stored.price != observation.price
        || stored.price_currency != observation.price_currency;
    classify(was_new, stored.available, observation.available, price_changed)
}
