#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use vetrina::{
    graphql::{GraphqlReply, GraphqlRequest, PipelineError, Transport},
    route::ViewRegistry,
};
use vetrina_types::GraphqlResponse;

type Responder = dyn Fn(&GraphqlRequest, usize) -> Result<GraphqlReply, PipelineError> + Send + Sync;

/// Transport answering from a closure and remembering every request.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<GraphqlRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&GraphqlRequest, usize) -> Result<GraphqlReply, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers `resolveUrl` for the listed pathnames; anything else resolves
    /// to `route: null`.
    pub fn routes(routes: Vec<(&'static str, Value)>) -> Arc<Self> {
        Self::new(move |request, _| {
            let url = request.operation.variables["url"].as_str().unwrap_or_default();
            let route = routes
                .iter()
                .find(|(path, _)| *path == url)
                .map(|(_, route)| route.clone())
                .unwrap_or(Value::Null);
            Ok(data(json!({ "route": route })))
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<GraphqlRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn as_transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::clone(self) as Arc<dyn Transport>
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: GraphqlRequest) -> Result<GraphqlReply, PipelineError> {
        let attempt = {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(request.clone());
            requests.len()
        };
        (self.responder)(&request, attempt)
    }
}

pub fn data(value: Value) -> GraphqlReply {
    GraphqlReply::new(GraphqlResponse::from_data(value))
}

pub fn views() -> Arc<ViewRegistry> {
    Arc::new(ViewRegistry::from_entries([
        ("PRODUCT", "product"),
        ("CATEGORY", "category"),
        ("CMS_PAGE", "cms-page"),
    ]))
}

pub fn cms_route(identifier: &str) -> Value {
    json!({
        "type": "CMS_PAGE",
        "identifier": identifier,
        "relative_url": identifier,
        "redirect_code": 0
    })
}

pub fn category_route(uid: &str, relative_url: &str) -> Value {
    json!({
        "type": "CATEGORY",
        "uid": uid,
        "relative_url": relative_url,
        "redirect_code": 0
    })
}

pub fn redirect_route(code: u16, relative_url: &str) -> Value {
    json!({
        "type": "CATEGORY",
        "relative_url": relative_url,
        "redirect_code": code
    })
}
