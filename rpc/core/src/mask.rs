use crate::protowire::WhereIsOneResult;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("unknown field in mask: {0}")]
    UnknownField(String),
}

/// Comma-list field mask over the result fields. An absent or empty mask
/// selects every field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMask {
    pub swhid: bool,
    pub anchor: bool,
    pub origin: bool,
}

impl FieldMask {
    pub const ALL: FieldMask = FieldMask { swhid: true, anchor: true, origin: true };

    pub fn parse(mask: Option<&str>) -> Result<FieldMask, MaskError> {
        let Some(mask) = mask else {
            return Ok(Self::ALL);
        };
        if mask.trim().is_empty() {
            return Ok(Self::ALL);
        }
        let mut parsed = FieldMask { swhid: false, anchor: false, origin: false };
        for field in mask.split(',').map(str::trim) {
            match field {
                "swhid" => parsed.swhid = true,
                "anchor" => parsed.anchor = true,
                "origin" => parsed.origin = true,
                other => return Err(MaskError::UnknownField(other.to_string())),
            }
        }
        Ok(parsed)
    }

    /// Clears the suppressed fields of a wire result.
    pub fn apply(&self, mut result: WhereIsOneResult) -> WhereIsOneResult {
        if !self.swhid {
            result.swhid = String::new();
        }
        if !self.anchor {
            result.anchor = None;
        }
        if !self.origin {
            result.origin = None;
        }
        result
    }
}
