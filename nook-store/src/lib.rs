pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod unit_repo;
pub mod payment_log_repo;
pub mod site_config;
pub mod memory;
pub mod redis_repo;
pub mod gateway;

pub use database::DbClient;
pub use redis_repo::{NoopRateLimiter, RateLimiter, RedisClient};
pub use gateway::HttpPaymentGateway;
