//! Model persistence in a compact binary and a plain-text form.
//!
//! Both forms store the outcome and predicate labels, the active outcomes
//! and weight of every predicate, the correction constant and the
//! correction weight. The prior is not persisted; loaded models evaluate
//! with the uniform prior.

pub mod binary;
pub mod text;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::MaxentModel;

/// Serialization form of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFormat {
    /// Little-endian chunked layout with CQDB label tables
    #[default]
    Binary,
    /// Line-oriented plain text
    Text,
}

/// Serialize a model to bytes
pub fn to_bytes(model: &MaxentModel, format: ModelFormat) -> Result<Vec<u8>> {
    match format {
        ModelFormat::Binary => binary::to_bytes(model),
        ModelFormat::Text => text::to_string(model).map(String::into_bytes),
    }
}

/// Load a model from bytes, detecting the form from its leading bytes
pub fn from_bytes(buf: &[u8]) -> Result<MaxentModel> {
    match detect(buf) {
        Some(ModelFormat::Binary) => binary::from_bytes(buf),
        Some(ModelFormat::Text) => text::read(buf),
        None => Err(Error::invalid_model("unrecognized model format")),
    }
}

/// Detect the serialization form of a buffer
pub fn detect(buf: &[u8]) -> Option<ModelFormat> {
    if buf.starts_with(binary::MAGIC) {
        Some(ModelFormat::Binary)
    } else if buf.starts_with(text::MAGIC.as_bytes()) {
        Some(ModelFormat::Text)
    } else {
        None
    }
}

/// Write a model to a file
pub fn save<P: AsRef<Path>>(model: &MaxentModel, path: P, format: ModelFormat) -> Result<()> {
    let path = path.as_ref();
    debug!("saving {:?} model to {}", format, path.display());
    let mut file = BufWriter::new(fs::File::create(path)?);
    match format {
        ModelFormat::Binary => file.write_all(&binary::to_bytes(model)?)?,
        ModelFormat::Text => text::write(model, &mut file)?,
    }
    file.flush()?;
    Ok(())
}

/// Read a model from a file in either form
pub fn load<P: AsRef<Path>>(path: P) -> Result<MaxentModel> {
    let path = path.as_ref();
    let buf = fs::read(path)?;
    debug!("loading model from {} ({} bytes)", path.display(), buf.len());
    from_bytes(&buf)
}

impl MaxentModel {
    /// Write the model to a file
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ModelFormat) -> Result<()> {
        save(self, path, format)
    }

    /// Read a model from a file in either form
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load(path)
    }
}
