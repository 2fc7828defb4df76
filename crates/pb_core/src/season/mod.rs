pub mod context;
pub mod driver;
pub mod playoffs;
pub mod progress;
pub mod schedule;
pub mod standings;
