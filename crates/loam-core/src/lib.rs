//! Loam Core
//!
//! The local fine-tuning backend. Bundles a tiny byte-level causal LM with
//! named weight modules, LoRA adapter attachment and training, artifact
//! persistence, and the reload-and-generate loader. The backend-agnostic
//! contracts live in `loam-tuning`; this crate implements them.

pub mod adapter;
pub mod device;
pub mod hub;
pub mod loader;
pub mod merge;
pub mod model;
pub mod runner;
pub mod tensor;
pub mod tokenizer;

pub use adapter::{attach_adapter, AdapterConfig, LoraAdapter, ModelHandle};
pub use device::{Device, DeviceKind, Precision};
pub use loader::GenerationHandle;
pub use merge::merge_adapter;
pub use model::{BaseModel, ModelRegistry};
pub use runner::FineTuneJobRunner;
pub use tokenizer::ByteTokenizer;
