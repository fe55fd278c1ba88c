//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! catalog (shops, products) and the notification thread store.

pub mod catalog;
pub mod thread;

pub use catalog::CatalogRepository;
pub use thread::ThreadRepository;
