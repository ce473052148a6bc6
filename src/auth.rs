//! Auth-domain identifiers, authorization requests, profiles, and token models.

pub mod id;
pub mod profile;
pub mod request;
pub mod token;

pub use id::*;
pub use profile::*;
pub use request::*;
pub use token::{record::*, secret::*};
