//! Paper entity and record normalizer
//!
//! Raw OpenAlex work records are loosely typed JSON. [`Paper::from_record`]
//! either builds a complete paper or rejects the record with a reason; it
//! never hands out a partially filled paper.

use super::identifier::{PaperId, DOI_PREFIX};
use crate::errors::RecordRejection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum abstract length kept on a paper, in characters
pub const MAX_ABSTRACT_CHARS: usize = 500;

/// Maximum number of topic labels kept on a paper
pub const MAX_TOPICS: usize = 5;

const TRUNCATION_MARKER: &str = "...";
const UNKNOWN: &str = "Unknown";
const UNKNOWN_AUTHOR: &str = "Unknown Author";
const UNKNOWN_VENUE: &str = "Unknown Venue";
const UNTITLED: &str = "Untitled";

/// Normalized research paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub title: String,
    /// Display names in authorship order
    pub authors: Vec<String>,
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// DOI without the URL prefix
    pub doi: Option<String>,
    /// Source-side citation count
    pub citations: u64,
    pub venue: Option<String>,
    pub topics: Vec<String>,
    #[serde(rename = "type")]
    pub work_type: String,
    pub language: String,
    pub is_open_access: bool,
    pub openalex_url: String,
    pub pdf_url: Option<String>,
    pub publication_date: Option<String>,
    pub referenced_works_count: usize,
    pub related_works_count: usize,
    /// Outgoing references in source order
    #[serde(skip_serializing, default)]
    pub referenced_works: Vec<PaperId>,
}

impl Paper {
    /// Normalize a raw work record
    pub fn from_record(record: &Value) -> Result<Self, RecordRejection> {
        let obj = record.as_object().ok_or(RecordRejection::NotAnObject)?;

        let raw_id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or(RecordRejection::MissingId)?;
        let id = PaperId::parse(raw_id).map_err(|_| RecordRejection::MissingId)?;

        let title = match obj.get("title") {
            None | Some(Value::Null) => UNTITLED.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(RecordRejection::InvalidField { field: "title" }),
        };

        let authors = match obj.get("authorships") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(list)) => list.iter().filter_map(author_name).collect(),
            Some(_) => return Err(RecordRejection::InvalidField { field: "authorships" }),
        };

        let publication_date = string_field(obj, "publication_date");
        let year = obj
            .get("publication_year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok())
            .or_else(|| year_from_date(publication_date.as_deref()));

        let abstract_text = match obj.get("abstract") {
            Some(Value::String(s)) => truncate_abstract(s),
            _ => obj
                .get("abstract_inverted_index")
                .and_then(Value::as_object)
                .map(|index| truncate_abstract(&rebuild_inverted_abstract(index)))
                .unwrap_or_default(),
        };

        let doi = obj
            .get("doi")
            .and_then(Value::as_str)
            .map(|d| d.replace("https://doi.org/", ""));

        let citations = match obj.get("cited_by_count") {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0),
            _ => 0,
        };

        let venue = obj
            .get("primary_location")
            .and_then(Value::as_object)
            .and_then(|loc| loc.get("source"))
            .and_then(Value::as_object)
            .map(|source| {
                source
                    .get("display_name")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_VENUE)
                    .to_string()
            });

        let topics = obj
            .get("concepts")
            .and_then(Value::as_array)
            .map(|concepts| {
                concepts
                    .iter()
                    .take(MAX_TOPICS)
                    .filter_map(|c| c.get("display_name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let open_access = obj.get("open_access").and_then(Value::as_object);
        let is_open_access = open_access
            .and_then(|oa| oa.get("is_oa"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let pdf_url = open_access
            .and_then(|oa| oa.get("oa_url"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let (referenced_works_count, referenced_works) = match obj.get("referenced_works") {
            Some(Value::Array(list)) => (list.len(), reference_ids(list)),
            _ => (0, Vec::new()),
        };
        let related_works_count = obj
            .get("related_works")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        Ok(Self {
            openalex_url: id.to_string(),
            id,
            title,
            authors,
            year,
            abstract_text,
            doi,
            citations,
            venue,
            topics,
            work_type: string_field(obj, "type").unwrap_or_else(|| UNKNOWN.to_string()),
            language: string_field(obj, "language").unwrap_or_else(|| UNKNOWN.to_string()),
            is_open_access,
            pdf_url,
            publication_date,
            referenced_works_count,
            related_works_count,
            referenced_works,
        })
    }

    pub fn has_authors(&self) -> bool {
        !self.authors.is_empty()
    }

    /// The DOI as a canonical id, when the record carries one
    pub fn doi_id(&self) -> Option<PaperId> {
        self.doi
            .as_deref()
            .filter(|doi| doi.starts_with(DOI_PREFIX))
            .and_then(|doi| PaperId::parse(doi).ok())
    }
}

fn reference_ids(list: &[Value]) -> Vec<PaperId> {
    list.iter()
        .filter_map(Value::as_str)
        .filter_map(|s| PaperId::parse(s).ok())
        .collect()
}

fn author_name(authorship: &Value) -> Option<String> {
    let name = authorship.get("author")?.get("display_name")?.as_str()?.trim();
    if name.is_empty() || name == UNKNOWN_AUTHOR {
        return None;
    }
    Some(name.to_string())
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn year_from_date(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

fn truncate_abstract(text: &str) -> String {
    if text.chars().count() > MAX_ABSTRACT_CHARS {
        let mut cut: String = text.chars().take(MAX_ABSTRACT_CHARS).collect();
        cut.push_str(TRUNCATION_MARKER);
        cut
    } else {
        text.to_string()
    }
}

/// OpenAlex ships abstracts as `word -> [positions]`
fn rebuild_inverted_abstract(index: &Map<String, Value>) -> String {
    let mut words: Vec<(u64, &str)> = index
        .iter()
        .filter_map(|(word, positions)| positions.as_array().map(|p| (word, p)))
        .flat_map(|(word, positions)| {
            positions
                .iter()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    words.sort_by_key(|(pos, _)| *pos);
    words
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> Value {
        json!({
            "id": "https://openalex.org/W2741809807",
            "title": "The state of OA",
            "authorships": [
                {"author": {"display_name": "Heather Piwowar"}},
                {"author": {"display_name": "Unknown Author"}},
                {"author": {"display_name": "  "}},
                {"author": {"display_name": "Jason Priem"}}
            ],
            "publication_year": 2018,
            "publication_date": "2018-02-13",
            "abstract": "Short abstract",
            "doi": "https://doi.org/10.7717/peerj.4375",
            "cited_by_count": 812,
            "primary_location": {"source": {"display_name": "PeerJ"}},
            "type": "article",
            "language": "en",
            "open_access": {"is_oa": true, "oa_url": "https://peerj.com/articles/4375.pdf"},
            "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2", 17],
            "related_works": ["https://openalex.org/W9"],
            "concepts": [
                {"display_name": "A"}, {"display_name": "B"}, {"display_name": "C"},
                {"display_name": "D"}, {"display_name": "E"}, {"display_name": "F"}
            ]
        })
    }

    #[test]
    fn test_full_record() {
        let paper = Paper::from_record(&full_record()).unwrap();
        assert_eq!(paper.id.as_str(), "https://openalex.org/W2741809807");
        assert_eq!(paper.authors, vec!["Heather Piwowar", "Jason Priem"]);
        assert_eq!(paper.year, Some(2018));
        assert_eq!(paper.doi.as_deref(), Some("10.7717/peerj.4375"));
        assert_eq!(paper.doi_id().unwrap().as_str(), "https://doi.org/10.7717/peerj.4375");
        assert_eq!(paper.citations, 812);
        assert_eq!(paper.venue.as_deref(), Some("PeerJ"));
        assert_eq!(paper.topics, vec!["A", "B", "C", "D", "E"]);
        assert!(paper.is_open_access);
        assert_eq!(paper.referenced_works_count, 3);
        assert_eq!(paper.referenced_works.len(), 2);
        assert_eq!(paper.related_works_count, 1);
        assert_eq!(paper.openalex_url, "https://openalex.org/W2741809807");
    }

    #[test]
    fn test_defaults_for_sparse_record() {
        let paper = Paper::from_record(&json!({
            "id": "W5",
            "publication_date": "2011-07-01",
            "cited_by_count": "lots",
            "primary_location": {"source": {}}
        }))
        .unwrap();
        assert_eq!(paper.id.as_str(), "https://openalex.org/W5");
        assert_eq!(paper.title, "Untitled");
        assert!(paper.authors.is_empty());
        assert!(!paper.has_authors());
        assert_eq!(paper.year, Some(2011));
        assert_eq!(paper.citations, 0);
        assert_eq!(paper.venue.as_deref(), Some("Unknown Venue"));
        assert_eq!(paper.work_type, "Unknown");
        assert_eq!(paper.language, "Unknown");
        assert_eq!(paper.abstract_text, "");
        assert!(paper.doi_id().is_none());
    }

    #[test]
    fn test_float_citations_truncate() {
        let paper = Paper::from_record(&json!({"id": "W1", "cited_by_count": 12.9})).unwrap();
        assert_eq!(paper.citations, 12);
        let paper = Paper::from_record(&json!({"id": "W1", "cited_by_count": -4})).unwrap();
        assert_eq!(paper.citations, 0);
    }

    #[test]
    fn test_abstract_truncation() {
        let long = "x".repeat(MAX_ABSTRACT_CHARS + 20);
        let paper = Paper::from_record(&json!({"id": "W1", "abstract": long})).unwrap();
        assert_eq!(paper.abstract_text.chars().count(), MAX_ABSTRACT_CHARS + 3);
        assert!(paper.abstract_text.ends_with("..."));

        let exact = "y".repeat(MAX_ABSTRACT_CHARS);
        let paper = Paper::from_record(&json!({"id": "W1", "abstract": exact.clone()})).unwrap();
        assert_eq!(paper.abstract_text, exact);
    }

    #[test]
    fn test_inverted_abstract() {
        let paper = Paper::from_record(&json!({
            "id": "W1",
            "abstract_inverted_index": {"graphs": [1], "Citation": [0], "grow": [2]}
        }))
        .unwrap();
        assert_eq!(paper.abstract_text, "Citation graphs grow");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(Paper::from_record(&json!([1, 2])), Err(RecordRejection::NotAnObject));
        assert_eq!(Paper::from_record(&json!({"title": "x"})), Err(RecordRejection::MissingId));
        assert_eq!(Paper::from_record(&json!({"id": 7})), Err(RecordRejection::MissingId));
        assert_eq!(
            Paper::from_record(&json!({"id": "W1", "title": ["x"]})),
            Err(RecordRejection::InvalidField { field: "title" })
        );
        assert_eq!(
            Paper::from_record(&json!({"id": "W1", "authorships": "nobody"})),
            Err(RecordRejection::InvalidField { field: "authorships" })
        );
    }

    #[test]
    fn test_serialized_shape() {
        let paper = Paper::from_record(&full_record()).unwrap();
        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["type"], "article");
        assert_eq!(value["abstract"], "Short abstract");
        assert!(value.get("referenced_works").is_none());
    }
}
