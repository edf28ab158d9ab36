// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

#![allow(clippy::needless_return)]

pub mod errors;
pub mod datetime;
pub mod timestamps;
pub mod geo;
pub mod frame;
pub mod retry;
pub mod alert;
pub mod fs;
pub mod cache;
pub mod store;

pub use errors::{RadarCommonError, Result};
pub use frame::RadarFrame;
