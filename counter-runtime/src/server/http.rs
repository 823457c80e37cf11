use {
    std::{convert::Infallible, pin::Pin, sync::Arc},
    tracing::{error, warn},
    tokio::sync::oneshot,
    hyper::{Response, body::Bytes, StatusCode, header::{self, HeaderValue}},
    http_body_util::Full,
    rayon::{ThreadPool, ThreadPoolBuilder, ThreadPoolBuildError},
    counter_common::{HttpRequest, HttpResponse, ErrorBody},
    crate::runtime::counter::VisitorCounter,
};

const ERROR_ROUTE_NOT_FOUND: &str = "Route not found.";
const ERROR_INTERNAL: &str = "Internal server error.";

/// Routes requests to the visitor counter. The handler performs blocking store calls,
/// so it runs on a dedicated worker pool rather than on the async runtime.
pub struct Engine {
    counter: VisitorCounter,
    route: String,
    cors_allow_origin: Option<HeaderValue>,
    thread_pool: ThreadPool,
}

impl Engine {
    pub fn new(counter: VisitorCounter, route: impl Into<String>, workers: Option<usize>) -> Result<Self, ThreadPoolBuildError> {
        let mut thread_pool = ThreadPoolBuilder::new().thread_name(|index| format!("counter-worker-{index}"));
        if let Some(workers) = workers {
            thread_pool = thread_pool.num_threads(workers);
        }

        Ok(Self {
            counter,
            route: route.into(),
            cors_allow_origin: None,
            thread_pool: thread_pool.build()?,
        })
    }

    pub fn with_cors_allow_origin(mut self, origin: Option<&str>) -> Self {
        self.cors_allow_origin = origin.and_then(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!("ignoring invalid cors origin {origin:?}: {err:?}");
                None
            }
        });
        self
    }

    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let response = if request.url.path() == self.route {
            self.counter.handle(request)
        } else {
            response_route_not_found()
        };

        match &self.cors_allow_origin {
            Some(origin) => response.with_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone()),
            None => response,
        }
    }
}

#[derive(Clone)]
pub struct HttpHandler {
    engine: Arc<Engine>,
}

impl HttpHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
        }
    }
}

impl hyper::service::Service<hyper::Request<hyper::body::Incoming>> for HttpHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<hyper::body::Incoming>) -> Self::Future {
        // counter api does not read request body, so it is left unconsumed
        let request = HttpRequest {
            method: req.method().clone(),
            url: req.uri().clone(),
            headers: req.headers().clone(),
        };

        let (tx, rx) = oneshot::channel();
        let engine = self.engine.clone();
        self.engine.thread_pool.spawn(move || {
            let response = engine.handle(&request);
            if tx.send(response).is_err() {
                warn!("client went away before visitor counter response was ready");
            }
        });

        Box::pin(async move {
            let response = match rx.await {
                Ok(v) => v,
                Err(err) => {
                    error!("worker dropped visitor counter request: {err:?}");
                    response_internal_error()
                }
            };
            Ok(into_hyper_response(response))
        })
    }
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut hyper_response = Response::new(Full::new(Bytes::from(response.body)));
    *hyper_response.status_mut() = response.status;
    *hyper_response.headers_mut() = response.headers;
    hyper_response
}

fn response_route_not_found() -> HttpResponse {
    HttpResponse::new()
        .with_status(StatusCode::NOT_FOUND)
        .with_json(&ErrorBody::new(ERROR_ROUTE_NOT_FOUND))
}

fn response_internal_error() -> HttpResponse {
    HttpResponse::new()
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .with_json(&ErrorBody::new(ERROR_INTERNAL))
}
