//! # Message Storage
//!
//! Storage presets and the persistence seam consumed by channels.

pub mod settings;
pub mod store;

pub use settings::{MessageStorageMode, StorageOverrides, StorageSettings};
pub use store::{MemoryMessageStore, MessageStore, StoreError};
