//! Core value types shared across the crate.

mod cooldown;
mod record;
mod symbol;

pub use cooldown::{Cooldown, CooldownStatus};
pub use record::{AlertEvent, AlertRecord, Direction};
pub use symbol::Symbol;
