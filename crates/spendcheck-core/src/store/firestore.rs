//! Firestore REST v1 client
//!
//! # Configuration
//!
//! - `FIREBASE_PROJECT_ID` (or `project_id` from the service-account key)
//! - `GOOGLE_APPLICATION_CREDENTIALS`: service-account key for OAuth
//! - `FIRESTORE_EMULATOR_HOST`: `host:port` of a local emulator (no OAuth)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    fields_from_firestore, fields_to_firestore, generate_document_id, merge_field_paths,
    split_document_path, validate_collection_path, Document, DocumentStore, Fields, Query,
};
use crate::error::{Error, Result};
use crate::google_auth::{project_id_from_env, ServiceAccountKey, TokenSource};

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";
const PAGE_SIZE: usize = 300;

#[derive(Clone)]
pub struct FirestoreStore {
    http_client: Client,
    /// `{host}/v1/projects/{project}/databases/(default)/documents`
    documents_url: Url,
    project_id: String,
    token: TokenSource,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(host: &str, project_id: &str, token: TokenSource) -> Result<Self> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let documents_url = Url::parse(&format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            host.trim_end_matches('/'),
            project_id
        ))
        .map_err(|e| Error::InvalidData(format!("Invalid Firestore host {}: {}", host, e)))?;
        Ok(Self {
            http_client,
            documents_url,
            project_id: project_id.to_string(),
            token,
        })
    }

    /// Build from environment; the emulator takes precedence over credentials
    pub fn from_env() -> Result<Self> {
        let key = ServiceAccountKey::from_env()?;
        let project_id = project_id_from_env(key.as_ref())
            .ok_or(Error::NotConfigured("FIREBASE_PROJECT_ID"))?;

        if let Ok(emulator) = std::env::var("FIRESTORE_EMULATOR_HOST") {
            if !emulator.trim().is_empty() {
                let host = format!("http://{}", emulator.trim());
                return Self::new(&host, &project_id, TokenSource::Static("owner".into()));
            }
        }

        let key = key.ok_or(Error::NotConfigured("GOOGLE_APPLICATION_CREDENTIALS"))?;
        Self::new(FIRESTORE_HOST, &project_id, TokenSource::service_account(key))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Each path segment is percent-encoded on its own
    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidData("Firestore host has no path".into()))?
            .extend(path.split('/'));
        Ok(url)
    }

    /// Parent document URL and collection id of a collection path
    fn parent_url<'a>(&self, collection: &'a str) -> Result<(Url, &'a str)> {
        match collection.rsplit_once('/') {
            Some((parent, id)) => Ok((self.url(parent)?, id)),
            None => Ok((self.documents_url.clone(), collection)),
        }
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.token.token().await?))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::provider(
            "Firestore",
            format!("request failed {}: {}", status, body),
        ))
    }

    fn into_document(raw: RawDocument) -> Result<Document> {
        let id = raw
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let fields = match raw.fields {
            Some(fields) => fields_from_firestore(&fields)?,
            None => Fields::new(),
        };
        Ok(Document { id, fields })
    }
}

/// Build the `runQuery` body for a collection id
pub(crate) fn structured_query(collection_id: &str, query: &Query) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": collection_id }]
    });

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": f.field },
                    "op": f.op.as_firestore(),
                    "value": f.value.to_firestore(),
                }
            })
        })
        .collect();

    match filters.len() {
        0 => {}
        1 => structured["where"] = filters[0].clone(),
        _ => {
            structured["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": filters }
            })
        }
    }

    if let Some((field, direction)) = &query.order_by {
        structured["orderBy"] = json!([{
            "field": { "fieldPath": field },
            "direction": direction.as_firestore(),
        }]);
    }

    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }

    json!({ "structuredQuery": structured })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        split_document_path(path)?;
        let response = self
            .http_client
            .get(self.url(path)?)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawDocument = Self::check(response).await?.json().await?;
        Self::into_document(raw).map(Some)
    }

    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<()> {
        split_document_path(path)?;
        let mut request = self
            .http_client
            .patch(self.url(path)?)
            .header("Authorization", self.bearer().await?);

        if merge {
            let mask: Vec<(&str, String)> = merge_field_paths(&fields)
                .into_iter()
                .map(|p| ("updateMask.fieldPaths", p))
                .collect();
            request = request.query(&mask);
        }

        let body = json!({ "fields": fields_to_firestore(&fields) });
        let response = request.json(&body).send().await?;
        Self::check(response).await?;
        debug!(path = %path, merge, "Firestore document written");
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        validate_collection_path(collection)?;
        let id = generate_document_id();
        let url = self.url(collection)?;

        let response = self
            .http_client
            .post(url)
            .query(&[("documentId", id.as_str())])
            .header("Authorization", self.bearer().await?)
            .json(&json!({ "fields": fields_to_firestore(&fields) }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(id)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        split_document_path(path)?;
        let response = self
            .http_client
            .delete(self.url(path)?)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        validate_collection_path(collection)?;
        let (parent, collection_id) = self.parent_url(collection)?;

        let response = self
            .http_client
            .post(format!("{}:runQuery", parent))
            .header("Authorization", self.bearer().await?)
            .json(&structured_query(collection_id, query))
            .send()
            .await?;

        let items: Vec<RunQueryItem> = Self::check(response).await?.json().await?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(Self::into_document)
            .collect()
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<String>> {
        validate_collection_path(collection)?;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("pageSize", PAGE_SIZE.to_string()),
                ("showMissing", "true".to_string()),
                ("mask.fieldPaths", "__name__".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .http_client
                .get(self.url(collection)?)
                .query(&params)
                .header("Authorization", self.bearer().await?)
                .send()
                .await?;
            let page: ListDocumentsResponse = Self::check(response).await?.json().await?;

            ids.extend(
                page.documents
                    .iter()
                    .filter_map(|d| d.name.rsplit('/').next().map(str::to_string)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, FieldValue, FilterOp};

    #[test]
    fn test_single_filter_uses_field_filter() {
        let query = Query::new().filter("category", FilterOp::Eq, "Food");
        let body = structured_query("transactions", &query);
        assert_eq!(
            body["structuredQuery"]["from"][0]["collectionId"],
            "transactions"
        );
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["op"],
            "EQUAL"
        );
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["value"]["stringValue"],
            "Food"
        );
    }

    #[test]
    fn test_multiple_filters_use_composite_and() {
        let query = Query::new()
            .filter("amount", FilterOp::Gte, FieldValue::Double(1.0))
            .filter("amount", FilterOp::Lt, FieldValue::Double(9.0))
            .order_by("date", Direction::Descending)
            .limit(5);
        let body = structured_query("transactions", &query);
        let q = &body["structuredQuery"];
        assert_eq!(q["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            q["where"]["compositeFilter"]["filters"]
                .as_array()
                .map(Vec::len),
            Some(2)
        );
        assert_eq!(q["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(q["limit"], 5);
    }

    #[test]
    fn test_document_name_to_id() {
        let raw = RawDocument {
            name: "projects/p/databases/(default)/documents/users/u1/budgets/2025-03".into(),
            fields: Some(json!({"month": {"stringValue": "2025-03"}})),
        };
        let doc = FirestoreStore::into_document(raw).unwrap();
        assert_eq!(doc.id, "2025-03");
        assert_eq!(doc.get_str("month"), Some("2025-03"));
    }

    #[test]
    fn test_documents_url() {
        let store =
            FirestoreStore::new("http://localhost:8080/", "demo", TokenSource::Static("t".into()))
                .unwrap();
        assert_eq!(
            store.url("users/u1").unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/users/u1"
        );
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let store =
            FirestoreStore::new("http://localhost:8080", "demo", TokenSource::Static("t".into()))
                .unwrap();
        let url = store.url("users/a b%2Fc/transactions/x?y").unwrap();
        assert!(url
            .as_str()
            .ends_with("/documents/users/a%20b%252Fc/transactions/x%3Fy"));

        let (parent, id) = store.parent_url("users/u1/transactions").unwrap();
        assert!(parent.as_str().ends_with("/documents/users/u1"));
        assert_eq!(id, "transactions");
    }
}
