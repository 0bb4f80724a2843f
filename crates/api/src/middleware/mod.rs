pub mod rate_limit;
pub mod request_log;

pub use rate_limit::{client_identity, rate_limit, AuthenticatedUser};
pub use request_log::log_requests;
