pub mod analytics;
pub mod audit;
pub mod bootstrap;
pub mod filters;
pub mod ledger;
pub mod orders;
pub mod payments;
