use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    contract::Error,
    models::{FlightKey, StatusCode, entries_serde},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub key: FlightKey,
    pub status: StatusCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(with = "entries_serde")]
    flights: BTreeMap<FlightKey, Flight>,
}

impl Registry {
    /// Stores a new flight with [`StatusCode::Unknown`]. Authorization of the
    /// airline is the caller's job.
    pub fn register(&mut self, key: FlightKey) -> Result<(), Error> {
        if self.flights.contains_key(&key) {
            return Err(Error::FlightAlreadyRegistered { flight: key });
        }
        self.flights.insert(
            key.clone(),
            Flight {
                key,
                status: StatusCode::Unknown,
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// True if any airline offers `code` departing at `departure`.
    pub fn is_registered(&self, code: &str, departure: u64) -> bool {
        self.flights
            .keys()
            .any(|key| key.code == code && key.departure == departure)
    }

    pub fn ensure_exists(&self, key: &FlightKey) -> Result<&Flight, Error> {
        self.flights.get(key).ok_or_else(|| Error::FlightNotFound {
            flight: key.clone(),
        })
    }

    pub(crate) fn set_status(&mut self, key: &FlightKey, status: StatusCode) -> Result<(), Error> {
        let flight = self.flights.get_mut(key).ok_or_else(|| Error::FlightNotFound {
            flight: key.clone(),
        })?;
        flight.status = status;
        Ok(())
    }
}
