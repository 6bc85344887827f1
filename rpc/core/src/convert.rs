use crate::protowire::WhereIsOneResult;
use provenance_query::ProvenanceResult;

impl From<&ProvenanceResult> for WhereIsOneResult {
    fn from(result: &ProvenanceResult) -> Self {
        WhereIsOneResult {
            swhid: result.swhid.to_string(),
            anchor: result.anchor.map(|anchor| anchor.to_string()),
            origin: result.origin.clone(),
        }
    }
}

/// A result echoing an input that could not be resolved (unknown or
/// malformed identifier): both provenance fields stay empty.
pub fn empty_result(swhid: impl Into<String>) -> WhereIsOneResult {
    WhereIsOneResult { swhid: swhid.into(), anchor: None, origin: None }
}
