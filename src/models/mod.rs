use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

/// Suffix appended by `encrypt` and stripped again by `decrypt`.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";
pub const DECRYPTED_SUFFIX: &str = ".decrypted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    /// Keyword passed as the first positional argument to the external tool.
    pub fn keyword(self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
        }
    }

    /// Suffix of the derived output path inside the storage area.
    pub fn output_suffix(self) -> &'static str {
        match self {
            Operation::Encrypt => ENCRYPTED_SUFFIX,
            Operation::Decrypt => DECRYPTED_SUFFIX,
        }
    }

    /// Filename presented to the client for a transformed upload.
    ///
    /// Encrypting appends `.encrypted`. Decrypting strips one trailing
    /// `.encrypted` and leaves any other name untouched.
    pub fn delivery_name(self, original: &str) -> String {
        match self {
            Operation::Encrypt => format!("{}{}", original, ENCRYPTED_SUFFIX),
            Operation::Decrypt => original
                .strip_suffix(ENCRYPTED_SUFFIX)
                .unwrap_or(original)
                .to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// An upload materialized inside the storage area.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    /// Caller supplied, untrusted.
    pub original_name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub operation: Operation,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    Success { output_path: PathBuf },
    /// The output path may be missing or partially written.
    Failure { message: String },
    TimedOut { after: Duration },
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Multipart form accepted by `/encrypt` and `/decrypt`.
#[derive(ToSchema)]
pub struct TransformUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
