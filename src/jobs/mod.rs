//! Background work started alongside the HTTP server.

pub mod payment_cleanup;
