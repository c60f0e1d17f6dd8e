pub mod client;
pub mod extract;

pub use client::{AuthenticatedClient, LoginSession, PortalClient};
