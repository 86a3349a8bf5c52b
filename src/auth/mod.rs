pub mod accounts;
pub mod session;

pub use session::Identity;
