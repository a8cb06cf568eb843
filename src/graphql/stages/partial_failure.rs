use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};
use vetrina_types::{GraphqlResponse, PathSegment};

use crate::graphql::pipeline::{GraphqlReply, GraphqlRequest, Next, PipelineError, Stage};

const METRIC_SUPPRESSED: &str = "vetrina_graphql_benign_errors_total";

/// Stock-availability messages that accompany otherwise usable data.
pub const BENIGN_MESSAGES: &[&str] = &[
    "Some of the products are out of stock.",
    "There are no source items with the in stock status",
];

pub fn is_benign(message: &str) -> bool {
    BENIGN_MESSAGES.contains(&message)
}

/// Drop list entries that only failed for stock reasons.
///
/// For every benign error whose path ends in a list index, the entry is
/// nulled in place; afterwards every touched list has its null entries
/// removed. Benign errors always leave the error list, even when they point
/// at no list entry, and an error list left empty is cleared. Returns the
/// number of suppressed errors.
pub fn normalize(response: &mut GraphqlResponse) -> usize {
    let Some(errors) = response.errors.take() else {
        return 0;
    };
    let Some(data) = response.data.as_mut() else {
        response.errors = Some(errors);
        return 0;
    };

    let mut remaining = Vec::with_capacity(errors.len());
    let mut touched: Vec<Vec<PathSegment>> = Vec::new();
    let mut suppressed = 0;

    for error in errors {
        if !is_benign(&error.message) {
            remaining.push(error);
            continue;
        }
        suppressed += 1;

        let target = error
            .path
            .as_deref()
            .and_then(|path| match path.split_last() {
                Some((PathSegment::Index(index), parent)) => Some((parent, *index)),
                _ => None,
            });
        if let Some((parent, index)) = target
            && null_entry(data, parent, index)
            && !touched.iter().any(|seen| seen.as_slice() == parent)
        {
            touched.push(parent.to_vec());
        }
    }

    for parent in &touched {
        if let Some(Value::Array(items)) = lookup_mut(data, parent) {
            items.retain(|item| !item.is_null());
        }
    }

    response.errors = (!remaining.is_empty()).then_some(remaining);
    suppressed
}

fn lookup_mut<'a>(mut value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    for segment in path {
        value = match segment {
            PathSegment::Key(key) => value.get_mut(key.as_str())?,
            PathSegment::Index(index) => value.get_mut(*index)?,
        };
    }
    Some(value)
}

fn null_entry(data: &mut Value, parent: &[PathSegment], index: usize) -> bool {
    match lookup_mut(data, parent) {
        Some(Value::Array(items)) if index < items.len() => {
            items[index] = Value::Null;
            true
        }
        _ => false,
    }
}

/// Applies [`normalize`] to every reply that carries both data and errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialFailureStage;

#[async_trait]
impl Stage for PartialFailureStage {
    fn name(&self) -> &'static str {
        "partial_failure"
    }

    async fn call(
        &self,
        request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        let label = request.operation.label().to_string();
        let mut reply = next.run(request).await?;

        if reply.response.data.is_none() || !reply.response.has_errors() {
            return Ok(reply);
        }

        let suppressed = normalize(&mut reply.response);
        if suppressed > 0 {
            counter!(METRIC_SUPPRESSED).increment(suppressed as u64);
            debug!(
                target = "vetrina::graphql",
                operation = %label,
                suppressed,
                "suppressed stock errors"
            );
        }
        if let Some(errors) = &reply.response.errors {
            for error in errors {
                warn!(
                    target = "vetrina::graphql",
                    operation = %label,
                    message = %error.message,
                    "graphql error"
                );
            }
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vetrina_types::GraphqlError;

    use super::*;

    fn items_path(index: usize) -> Vec<PathSegment> {
        vec!["cart".into(), "items".into(), index.into()]
    }

    #[test]
    fn benign_entries_are_removed_and_errors_cleared() {
        let mut response = GraphqlResponse {
            data: Some(json!({"cart": {"items": [{"sku": "A"}, null, {"sku": "B"}]}})),
            errors: Some(vec![
                GraphqlError::new("Some of the products are out of stock.").with_path(items_path(1)),
            ]),
        };

        assert_eq!(normalize(&mut response), 1);
        assert_eq!(
            response.data,
            Some(json!({"cart": {"items": [{"sku": "A"}, {"sku": "B"}]}}))
        );
        assert!(response.errors.is_none());
    }

    #[test]
    fn other_errors_pass_through() {
        let mut response = GraphqlResponse {
            data: Some(json!({"cart": {"items": [{"sku": "A"}, {"sku": "B"}, {"sku": "C"}]}})),
            errors: Some(vec![
                GraphqlError::new("There are no source items with the in stock status")
                    .with_path(items_path(0)),
                GraphqlError::new("Cart is locked").with_path(items_path(2)),
            ]),
        };

        assert_eq!(normalize(&mut response), 1);
        assert_eq!(
            response.data,
            Some(json!({"cart": {"items": [{"sku": "B"}, {"sku": "C"}]}}))
        );
        let errors = response.errors.expect("errors kept");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Cart is locked");
    }

    #[test]
    fn benign_message_without_list_path_is_dropped() {
        let mut response = GraphqlResponse {
            data: Some(json!({"cart": {"id": "c1", "items": [{"sku": "A"}]}})),
            errors: Some(vec![
                GraphqlError::new("Some of the products are out of stock.")
                    .with_path(vec!["cart".into(), "items".into()]),
                GraphqlError::new("There are no source items with the in stock status"),
            ]),
        };
        assert_eq!(normalize(&mut response), 2);
        assert!(response.errors.is_none());
        assert_eq!(
            response.data,
            Some(json!({"cart": {"id": "c1", "items": [{"sku": "A"}]}}))
        );
    }
}
