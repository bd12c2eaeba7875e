//! 测试用的脚本化传输层：按方法和 URL 片段匹配，依次返回预设响应，最后一个响应重复使用

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::analysis::config::AnalysisClientConfig;
use crate::analysis::events::{FlowEvent, FlowObserver};
use crate::analysis::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub type Reply = Result<HttpResponse, TransportError>;

pub const BASE_URL: &str = "https://api.test/prod";

pub fn test_config() -> AnalysisClientConfig {
    AnalysisClientConfig {
        poll_interval_secs: 10,
        max_poll_attempts: 30,
        ..AnalysisClientConfig::with_base_url(BASE_URL)
    }
}

pub fn text(status: u16, body: &str) -> Reply {
    Ok(HttpResponse::new(status, body))
}

pub fn json(status: u16, body: Value) -> Reply {
    Ok(HttpResponse::new(status, body.to_string()))
}

pub fn network_error(message: &str) -> Reply {
    Err(TransportError(message.to_string()))
}

struct Route {
    method: Method,
    url_fragment: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, url_fragment: &str, replies: Vec<Reply>) -> Self {
        self.routes.lock().unwrap().push(Route {
            method,
            url_fragment: url_fragment.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, url_fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.contains(url_fragment))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && request.url.contains(&r.url_fragment));
        match route {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| network_error("no scripted reply")),
            None => network_error(&format!("no route for {} {}", request.method, request.url)),
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<FlowEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl FlowObserver for RecordingObserver {
    fn on_event(&self, event: &FlowEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
