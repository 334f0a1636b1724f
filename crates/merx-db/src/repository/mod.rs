//! # Repository Module
//!
//! Database repository implementations for Merx.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Service (OrderLifecycle)                                               │
//! │       │                                                                 │
//! │       │  orders.load_aggregate(&mut tx, id)                             │
//! │       ▼                                                                 │
//! │  OrderRepository                                                        │
//! │  ├── read methods take &self (pool)                                     │
//! │  └── write methods take &mut SqliteConnection: the caller's             │
//! │      transaction owns atomicity, the repository owns the SQL            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • SQL is isolated in one place per entity                              │
//! │  • Cross-entity atomicity stays a service concern                       │
//! │  • Easy to exercise against an in-memory database                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`order::OrderRepository`] - Orders, lines, metric line selection
//! - [`stock::StockRepository`] - Stock entry rows and the atomic decrement
//! - [`product::ProductRepository`] - Catalog lookups and the usage probe
//! - [`warehouse::WarehouseRepository`] - Warehouse directory
//! - [`customer::CustomerRepository`] - Buyers
//! - [`staff::StaffRepository`] - Actor resolution
//! - [`rates::ExchangeRateRepository`] - Append-only rate snapshots

pub mod customer;
pub mod order;
pub mod product;
pub mod rates;
pub mod staff;
pub mod stock;
pub mod warehouse;
