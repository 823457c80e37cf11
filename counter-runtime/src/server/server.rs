use {
    std::{net::SocketAddr, sync::Arc},
    tokio::net::TcpListener,
    hyper::server::conn::http1,
    hyper_util::rt::{TokioIo, TokioTimer},
    tracing::{info, error},
    thiserror::Error,
    crate::{
        runtime::counter::VisitorCounter,
        server::{
            config::ServerConfig,
            http::{Engine, HttpHandler},
        },
    },
};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to build worker pool: {0:?}")]
    WorkerPool(rayon::ThreadPoolBuildError),

    #[error("failed to bind tcp listener: {0:?}")]
    Bind(std::io::Error),
}

pub struct CounterServer {
    listener: TcpListener,
    http_handler: HttpHandler,
}

impl CounterServer {
    pub async fn bind(config: &ServerConfig, counter: VisitorCounter) -> Result<Self, ServerError> {
        let engine = Engine::new(counter, config.route.clone(), config.workers)
            .map_err(ServerError::WorkerPool)?
            .with_cors_allow_origin(config.cors_allow_origin.as_deref());

        let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;

        Ok(Self {
            listener,
            http_handler: HttpHandler::new(Arc::new(engine)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Bind)
    }

    /// Serves connections until `shutdown` resolves, then waits for in-flight connections to finish.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) {
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();
        tokio::pin!(shutdown);

        match self.local_addr() {
            Ok(addr) => info!("started http server on {addr:?}"),
            Err(err) => error!("started http server on unknown address: {err:?}"),
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down http server...");
                    break;
                },
                connection = self.listener.accept() => {
                    let (tcp, _) = match connection {
                        Ok(v) => v,
                        Err(err) => {
                            error!("failed to accept http connection: {err:?}");
                            continue;
                        }
                    };
                    let io = TokioIo::new(tcp);

                    let conn = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(io, self.http_handler.clone());
                    let fut = graceful.watch(conn);
                    tokio::task::spawn(async move {
                        if let Err(err) = fut.await {
                            if err.is_timeout() || err.is_incomplete_message() {
                                // caused by client
                            } else {
                                error!("error while handling http request: {err:?}");
                            }
                        }
                    });
                }
            }
        }

        drop(self.listener);
        graceful.shutdown().await;
        info!("stopped http server.");
    }
}
