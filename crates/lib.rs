pub mod domain;
pub mod observability;
pub mod payments;
