pub mod auth;

pub use auth::{admin_auth_middleware, guest_auth_middleware, AdminClaims, GuestClaims, ADMIN_ROLE, GUEST_ROLE};
