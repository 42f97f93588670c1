//! §6.1 `Repository` collaborator contract, plus an in-memory reference
//! implementation used by tests, `task-engine`'s integration tests, and
//! `task-cli`'s demo run. Production drivers (a real database) are out of
//! scope per spec.md's Non-goals; they would live in a sibling crate that
//! depends on this one only for the trait.

pub mod memory;
pub mod repository;
pub mod transaction;

pub use memory::InMemoryRepository;
pub use repository::Repository;
pub use transaction::Transaction;
