pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use config::RuntimeConfig;
pub use error::ScriptError;
pub use types::*;
pub use value::*;
