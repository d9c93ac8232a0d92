pub mod calendar;
pub mod opportunity;
pub mod salesperson;
pub mod source;
