pub mod request;
pub mod session;

pub use session::SessionTimings;
