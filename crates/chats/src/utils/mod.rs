//! Internal utilities.

pub mod clock;
pub mod ids;
pub mod locks;
pub mod permissions;
pub mod validation;

pub use clock::{Clock, SystemClock};
pub use locks::{EngineLocks, KeyedLocks, WriteTransaction};
pub use permissions::PermissionChecker;
pub use validation::Validator;
