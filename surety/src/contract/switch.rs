use serde::{Deserialize, Serialize};

use crate::{contract::Error, models::Principal};

/// Process-wide gate checked by every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalSwitch {
    admin: Principal,
    operational: bool,
}

impl OperationalSwitch {
    pub fn new(admin: Principal) -> Self {
        Self {
            admin,
            operational: true,
        }
    }

    pub fn admin(&self) -> &Principal {
        &self.admin
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    pub fn ensure_operational(&self) -> Result<(), Error> {
        if self.operational {
            Ok(())
        } else {
            Err(Error::NotOperational)
        }
    }

    pub fn ensure_admin(&self, caller: &Principal) -> Result<(), Error> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(Error::unauthorized(caller))
        }
    }

    /// Returns whether the flag actually changed.
    pub fn set(&mut self, caller: &Principal, operational: bool) -> Result<bool, Error> {
        self.ensure_admin(caller)?;
        let changed = self.operational != operational;
        self.operational = operational;
        Ok(changed)
    }
}
