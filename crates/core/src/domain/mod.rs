pub mod booking;
pub mod estimate;
pub mod quote;
pub mod rule;
