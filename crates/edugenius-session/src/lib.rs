//! # EduGenius Session
//!
//! Keeps the signed-in user alive across restarts by mirroring the session
//! fields between a short-lived store and a durable one.
//!
//! - [`SessionMirror::save`] copies short-lived → durable while signed in.
//! - [`SessionMirror::restore`] copies durable → short-lived when the
//!   short-lived store starts out empty.
//!
//! Values are stored as plain strings. There is no encryption, expiry or
//! conflict resolution.

pub mod mirror;
pub mod store;

pub use mirror::{SessionField, SessionMirror, SessionUser, UserRole};
pub use store::{FileStore, KeyValueStore, MemoryStore};
