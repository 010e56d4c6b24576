//! Generic encoding and type-tagged decoding of expression graphs, events and meshes.
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod float;
pub mod protocol;
pub mod record;

pub use decoder::{Decoder, RecordShape};
pub use encoder::Encoder;
pub use error::SerialiseError;
pub use protocol::{Arity, AttributeRecord, Snapshot};
pub use record::release;

// Record field names shared by the encoder and decoder.
pub const TYPE_KEY: &str = "type";
pub const ID_KEY: &str = "id";
pub const CHILDREN_KEY: &str = "children";
pub const EXPRESSION_KEY: &str = "expression";
pub const SUB_MESHES_KEY: &str = "sub_meshes";
pub const INITIAL_CONDITION_KEY: &str = "initial_condition";
