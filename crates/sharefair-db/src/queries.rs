//! Database query functions organized by domain.

pub mod harvests;
pub mod ledger;
pub mod meta;
pub mod values;
