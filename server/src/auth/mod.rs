pub mod extract;
pub mod password;
pub mod permissions;
pub mod session;

pub use extract::{BuyerSession, StaffSession};
pub use permissions::{permissions_for, Permissions, Section};
pub use session::{Provider, SessionClaims, SessionKeys};
