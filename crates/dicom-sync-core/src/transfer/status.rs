use std::fmt;

/// Status code returned by the remote node for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0x0000);
    /// Reported locally when no accepted presentation context fits a record.
    pub const SOP_CLASS_NOT_SUPPORTED: StatusCode = StatusCode(SOP_CLASS_NOT_SUPPORTED);
    /// Reported locally when a record cannot be encoded for sending.
    pub const CANNOT_UNDERSTAND: StatusCode = StatusCode(0xC000);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn classify(self) -> StatusCategory {
        classify(self)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    MissingOrInvalidTag,
    UnsupportedSyntaxOrResources,
    AbortedByRemote,
    Generic(StatusCode),
}

impl StatusCategory {
    pub fn message(&self) -> String {
        match self {
            StatusCategory::MissingOrInvalidTag => {
                "Data error: a required attribute is missing or invalid.".to_string()
            }
            StatusCategory::UnsupportedSyntaxOrResources => {
                "Unsupported: transfer syntax not accepted or the remote is out of resources."
                    .to_string()
            }
            StatusCategory::AbortedByRemote => {
                "Aborted: the operation was interrupted by the remote node.".to_string()
            }
            StatusCategory::Generic(code) => format!("Operation failed (status {})", code),
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

const INVALID_ATTRIBUTE_VALUE: u16 = 0x0106;
const ATTRIBUTE_VALUE_OUT_OF_RANGE: u16 = 0x0116;
const MISSING_ATTRIBUTE: u16 = 0x0120;
const SOP_CLASS_NOT_SUPPORTED: u16 = 0x0122;
const PROCESSING_FAILURE: u16 = 0x0110;
const CANCEL: u16 = 0xFE00;

/// Maps a status code to its failure category. Rules are evaluated in order;
/// the first match wins.
pub fn classify(code: StatusCode) -> StatusCategory {
    match code.0 {
        INVALID_ATTRIBUTE_VALUE | ATTRIBUTE_VALUE_OUT_OF_RANGE | MISSING_ATTRIBUTE => {
            StatusCategory::MissingOrInvalidTag
        }
        SOP_CLASS_NOT_SUPPORTED | 0xC000..=0xCFFF => StatusCategory::UnsupportedSyntaxOrResources,
        CANCEL | PROCESSING_FAILURE => StatusCategory::AbortedByRemote,
        _ => StatusCategory::Generic(code),
    }
}
