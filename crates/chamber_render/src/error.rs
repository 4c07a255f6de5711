use chamber_core::resource::ResourceError;

use crate::shader::ShaderStage;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("graphics initialization failed: {0}")]
    Initialization(String),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("image decode failed: {0}")]
    ImageDecode(String),
    #[error("{stage} shader compile failed:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("shader link failed:\n{log}")]
    ShaderLink { log: String },
    #[error("uniform not found: {name}")]
    UniformNotFound { name: String },
    /// A begin/draw/end call arrived in the wrong renderer state.
    #[error("sprite renderer: `{op}` called while {state}")]
    OutOfOrder {
        op: &'static str,
        state: &'static str,
    },
}
