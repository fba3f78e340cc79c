#![forbid(unsafe_code)]

//! # consult-coder
//!
//! Assigns categorical codes from a fixed taxonomy (a "codeframe") to
//! free-text consultation responses, using an LLM call as the classification
//! engine.
//!
//! The model is treated as an untrusted, non-deterministic black box: the
//! prompt embeds the full codeframe and demands a rigid JSON reply, and the
//! interpreter repairs and validates whatever comes back. Codes the model
//! invents are dropped; parse and transport failures surface as a normally
//! shaped [`CodingResult`] with a populated `error` field, so callers have a
//! single code path for success and failure alike.

pub mod cache;
pub mod codeframe;
pub mod coder;
pub mod gateway;
pub mod interpret;
pub mod normalize;
pub mod prompts;

pub use cache::SessionCache;
pub use codeframe::{Codeframe, ConfigError};
pub use coder::{BatchItem, CoderConfig, CodingRequest, ConsultationCoder};
pub use gateway::{ChatGateway, GatewayConfig, ProviderGateway};
pub use interpret::{interpret, CodingResult};
pub use normalize::{clean, split_statements};
