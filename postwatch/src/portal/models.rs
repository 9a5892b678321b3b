use serde::{Deserialize, Serialize};

/// A job posting as listed by the portal search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    #[serde(rename = "GuidString")]
    pub guid: String,
    #[serde(rename = "Titpost", default)]
    pub title: String,
}

impl Posting {
    pub fn new(guid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            title: title.into(),
        }
    }
}

/// Body of `GET /Postes/Rechercher`.
#[derive(Debug, Deserialize)]
pub(crate) struct PostingList {
    #[serde(rename = "ListePostesAffichees", default)]
    pub postings: Vec<Posting>,
}
