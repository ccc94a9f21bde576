//! Confluence Cloud v2 API payloads.
//!
//! Only fields that are actually used are declared; serde ignores the rest.

use serde::{Deserialize, Serialize};

/// Space from `GET /wiki/api/v2/spaces`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub homepage_id: Option<String>,
}

/// Page, folder or other content node.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Paged list response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsResponse<T> {
    pub results: Vec<T>,
}

/// Body of `POST /wiki/api/v2/pages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest<'a> {
    pub space_id: &'a str,
    pub status: &'static str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<&'a str>,
    pub body: StorageBody<'a>,
}

/// Page body in storage representation.
#[derive(Debug, Clone, Serialize)]
pub struct StorageBody<'a> {
    pub representation: &'static str,
    pub value: &'a str,
}

/// Body of `POST /wiki/api/v2/pages/{id}/properties`.
#[derive(Debug, Clone, Serialize)]
pub struct ContentProperty<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_page_request_shape() {
        let request = CreatePageRequest {
            space_id: "65537",
            status: "current",
            title: "Wiki (Legacy)",
            parent_id: None,
            body: StorageBody {
                representation: "storage",
                value: "<p>x</p>",
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "spaceId": "65537",
                "status": "current",
                "title": "Wiki (Legacy)",
                "body": {"representation": "storage", "value": "<p>x</p>"}
            })
        );
    }

    #[test]
    fn test_space_parses_homepage() {
        let space: Space = serde_json::from_str(
            r#"{"id": "65537", "key": "DOCS", "name": "Docs", "homepageId": "98305"}"#,
        )
        .unwrap();
        assert_eq!(space.homepage_id.as_deref(), Some("98305"));
    }
}
