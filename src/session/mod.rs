//! Access core: session state, profile resolution, role gate and route guard.
//!
//! Data flows provider -> [`store::SessionStore`] -> resolver ->
//! [`gate::derive_roles`] -> [`guard::RouteGuard`] -> screen.

pub mod gate;
pub mod guard;
pub mod registry;
pub mod state;
pub mod store;

#[cfg(test)]
pub mod testing;
