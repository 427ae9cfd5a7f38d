//! Rhai photon runtime
//!
//! Photons written as [Rhai](https://rhai.rs) scripts. A script's top level
//! is evaluated once per import; its final value declares the units it
//! provides, either as one object map or as an array of them:
//!
//! ```rhai
//! fn init() { #{ ticks: 0 } }
//! fn finalize(state) { true }
//!
//! #{
//!     type_name: "Clock",
//!     photon: #{ name: "clock", author: "ops", version: "1.0.0" },
//!     capabilities: ["timer"],
//!     init: Fn("init"),
//!     finalize: Fn("finalize"),
//! }
//! ```
//!
//! - `type_name` (required): the unit's type name
//! - `photon`: metadata map (or `true`); grants the photon capability
//! - `capabilities`: extra capability names
//! - `init`: builds the instance state; a throw leaves the handle partial
//! - `finalize`: receives the state, returns whether shutdown was clean
//!
//! `import` statements resolve against the script's directory, then the
//! loader's search path.

mod declaration;
mod engine;
mod photon;
mod resolver;

pub use engine::RhaiEngineConfig;
pub use photon::{RhaiObject, RhaiPhoton};
pub use resolver::RhaiResolver;
