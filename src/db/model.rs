use crate::model::Platform;

/// Projection used by the daily selection algorithm. Only the columns the
/// diversity pass needs; full records are resolved by id afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    pub score: f64,
    pub platform: Platform,
    pub author_name: Option<String>,
}
