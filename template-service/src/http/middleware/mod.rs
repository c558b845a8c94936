//! Request middleware, outermost first: metrics, access log, CSRF

pub mod access_log;
pub mod csrf;
pub mod metrics;

pub use access_log::{access_log, REQUEST_ID_HEADER};
pub use csrf::{csrf, CsrfToken};
pub use metrics::track_metrics;
