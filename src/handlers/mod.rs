//! Request handlers.
//!
//! Handlers take the shared [`crate::AppState`] plus already-extracted
//! request parts and return typed results; routing and response shaping
//! live in [`crate::server`].

pub mod file;
pub mod health;
