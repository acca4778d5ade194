use std::fmt;

use serde::{Deserialize, Serialize};

/// Language names understood by the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageName {
    #[default]
    English,
    Hindi,
    Telugu,
}

impl LanguageName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Telugu => "Telugu",
        }
    }
}

impl fmt::Display for LanguageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disease label and confidence (0-100) returned by the predict endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub disease_label: String,
    pub confidence_percent: f64,
}

impl Diagnosis {
    pub fn new(disease_label: impl Into<String>, confidence_percent: f64) -> Self {
        Self {
            disease_label: disease_label.into(),
            confidence_percent,
        }
    }
}

/// A user-chosen image, forwarded to the service as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            bytes,
        }
    }

    pub fn mime_or_default(&self) -> &str {
        self.mime_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
