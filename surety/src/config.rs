use std::path::Path;

use serde::{Deserialize, Serialize};

#[cfg(feature = "rest")]
use crate::actors::rest;
use crate::{
    Error,
    actors::ledger,
    contract::{Contract, Rules},
    models::Principal,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Operator of the contract and its first airline.
    pub admin: Principal,
    #[serde(default)]
    pub rules: Rules,
    /// Reporters allowed to answer status requests from the start.
    #[serde(default)]
    pub reporters: Vec<Principal>,
    #[serde(default)]
    pub ledger: ledger::Config,
    #[cfg(feature = "rest")]
    #[serde(default)]
    pub rest: rest::Config,
}

impl Config {
    pub fn new(admin: impl Into<Principal>) -> Self {
        Self {
            admin: admin.into(),
            rules: Rules::default(),
            reporters: vec![],
            ledger: Default::default(),
            #[cfg(feature = "rest")]
            rest: Default::default(),
        }
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to read {path:?}: {e}")))?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse {path:?}: {e}")))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.admin.as_str().is_empty() {
            return Err(Error::InvalidConfig("admin must not be empty".to_string()));
        }
        self.rules.validate().map_err(Error::InvalidConfig)
    }

    /// The contract as it stands before any transaction.
    pub(crate) fn genesis(&self) -> Contract {
        Contract::new(self.admin.clone(), self.rules.clone())
            .with_reporters(self.reporters.iter().cloned())
    }
}
