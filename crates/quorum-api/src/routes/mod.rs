pub mod confirmations;
pub mod health;
pub mod meetings;
pub mod polls;
pub mod subscribers;
pub mod tasks;
