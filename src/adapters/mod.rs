//! Storage adapters implementing the ports in `crate::ports`.

pub mod memory;
pub mod postgres_cart_repository;
pub mod postgres_order_repository;

pub use memory::{InMemoryCartRepository, InMemoryOrderRepository};
pub use postgres_cart_repository::PostgresCartRepository;
pub use postgres_order_repository::PostgresOrderRepository;
