//! The type-resolution query.

use serde_json::json;
use vetrina_types::{RouteQueryData, RouteResponse};

use super::{
    client::{FetchError, GraphqlClient},
    operation::Operation,
};
use crate::domain::route::RouteKey;

pub const RESOLVE_URL: &str = r#"
query resolveUrl($url: String!) {
    route(url: $url) {
        relative_url
        redirect_code
        type
        ... on CmsPage {
            identifier
        }
        ... on ProductInterface {
            uid
        }
        ... on CategoryInterface {
            uid
        }
    }
}
"#;

pub fn resolve_url_operation(pathname: &RouteKey) -> Operation {
    Operation::from_document(RESOLVE_URL, json!({ "url": pathname.as_str() }))
}

/// Ask the backend what lives at `pathname`. `Ok(None)` means the backend
/// knows no route there.
pub async fn fetch_route(
    client: &GraphqlClient,
    pathname: &RouteKey,
) -> Result<Option<RouteResponse>, FetchError> {
    let data = client.query(resolve_url_operation(pathname)).await?;
    let envelope: RouteQueryData =
        serde_json::from_value(data).map_err(|err| FetchError::Shape(err.to_string()))?;
    Ok(envelope.route)
}
