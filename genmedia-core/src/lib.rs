//! # genmedia core
//!
//! Shared types for the genmedia MCP server: the error taxonomy, the response
//! envelope every upstream call is normalised into, the transport seam, the
//! static model catalog, the image reference cache and the cost tracker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                genmedia-core                │
//! ├─────────────────────────────────────────────┤
//! │  Catalog         │  Transport seam          │
//! │  - Descriptors   │  - RequestOptions        │
//! │  - Aliases       │  - ResponseEnvelope      │
//! │  - Validation    │  - Credits               │
//! ├─────────────────────────────────────────────┤
//! │  ImageCache      │  CostTracker             │
//! │  - TTL + FIFO    │  - Running averages      │
//! │  - Tokens        │  - JSON persistence      │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod envelope;
pub mod error;
pub mod redact;
pub mod transport;
pub mod validation;

pub use cache::{CachedImage, ImageCache};
pub use catalog::{
    Catalog, Dimensions, FieldError, ModelCategory, ModelDescriptor, OutputType, ParamSpec,
    ParamType,
};
pub use config::{RawSettings, Settings};
pub use cost::{CostStats, CostTracker};
pub use envelope::{Credits, EnvelopeError, Method, RequestOptions, ResponseEnvelope, ResponseKind};
pub use error::{map_to_safe_error, ErrorKind, MediaError, MediaResult, SafeError};
pub use transport::{image_endpoint, MediaTransport};
pub use validation::{ValidationError, Validator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
