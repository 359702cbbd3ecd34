//! netplan-rs library
//!
//! A network configuration compiler: reads a declarative, layered YAML
//! description of a host's network, merges and validates it into a typed
//! state, and emits native configuration for one of several renderer
//! back-ends (systemd-networkd, NetworkManager, OpenVSwitch, SR-IOV).
//!
//! # Pipeline
//!
//! ```text
//! source files -> Parser -> (+ null overlays) -> State::import -> State
//!                                                  |
//!               {networkd, NM, OVS, SR-IOV} renderers -> files under rootdir
//! ```
//!
//! ```no_run
//! use netplan_rs::{Parser, State};
//!
//! # fn main() -> Result<(), netplan_rs::NetplanError> {
//! let mut parser = Parser::new();
//! parser.load_yaml_hierarchy("/")?;
//! let state = State::import(parser)?;
//! state.generate("/")?;
//! # Ok(())
//! # }
//! ```
//!
//! The inverse direction turns a NetworkManager keyfile back into netplan
//! YAML; see [`import_keyfile`].

pub mod emit;
pub mod import;
pub mod keyfile;
pub mod names;
pub mod parser;
pub mod render;
pub mod state;
pub mod types;
pub mod util;
pub mod validator;

mod error;

pub use error::NetplanError;
pub use import::import_keyfile;
pub use names::{Backend, DefType};
pub use parser::{Parser, ParserFlags};
pub use state::State;
pub use types::NetDef;
