//! Request middleware. Only access logging is needed; CORS and the body
//! limit come from `tower-http` and axum layers in the router.

pub mod audit;
