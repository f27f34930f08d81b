//! Terminal front end for the declarative engine
//!
//! 1. Display - render plans with field-level changes
//! 2. Executing - progress bar, confirmation prompt, and the final report

pub mod differ;
pub mod executor;

pub use differ::display_plan;
pub use executor::print_report;
