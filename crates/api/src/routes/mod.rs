pub mod health;
pub mod inventory;
pub mod metrics;
pub mod notifications;
pub mod orders;
