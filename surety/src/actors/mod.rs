pub mod ledger;
#[cfg(feature = "rest")]
pub mod rest;
