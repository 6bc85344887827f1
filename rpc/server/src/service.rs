use provenance_core::task::service::{AsyncService, AsyncServiceError, AsyncServiceFuture};
use provenance_core::{debug, info, warn};
use provenance_grpc_core::convert::empty_result;
use provenance_grpc_core::mask::FieldMask;
use provenance_grpc_core::protowire::provenance_service_server::{ProvenanceService, ProvenanceServiceServer};
use provenance_grpc_core::protowire::{WhereAreOneRequest, WhereIsOneRequest, WhereIsOneResult};
use provenance_model::errors::SwhidError;
use provenance_model::Swhid;
use provenance_query::{ProvenanceQuery, QueryError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use triggered::{trigger, Listener, Trigger};

const GRPC_SERVICE: &str = "grpc-service";

fn status_of(err: QueryError) -> Status {
    match err {
        QueryError::Input(e) => Status::invalid_argument(e.to_string()),
        QueryError::DeadlineExceeded => Status::deadline_exceeded("query deadline exceeded"),
        QueryError::Cancelled => Status::cancelled("query cancelled"),
        QueryError::Corruption(msg) => Status::internal(msg),
        QueryError::Unavailable(msg) => Status::unavailable(msg),
    }
}

/// The tonic-facing handler; a thin facade over the query engine.
pub struct ProvenanceGrpcHandler {
    engine: Arc<ProvenanceQuery>,
}

impl ProvenanceGrpcHandler {
    pub fn new(engine: Arc<ProvenanceQuery>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl ProvenanceService for ProvenanceGrpcHandler {
    async fn where_is_one(&self, request: Request<WhereIsOneRequest>) -> Result<Response<WhereIsOneResult>, Status> {
        let request = request.into_inner();
        let mask = FieldMask::parse(request.mask.as_deref()).map_err(|e| Status::invalid_argument(e.to_string()))?;
        let swhid: Swhid =
            request.swhid.parse().map_err(|e: SwhidError| Status::invalid_argument(e.to_string()))?;
        let result = self.engine.where_is_one(swhid).await.map_err(status_of)?;
        Ok(Response::new(mask.apply(WhereIsOneResult::from(&result))))
    }

    type WhereAreOneStream = ReceiverStream<Result<WhereIsOneResult, Status>>;

    async fn where_are_one(&self, request: Request<WhereAreOneRequest>) -> Result<Response<Self::WhereAreOneStream>, Status> {
        let request = request.into_inner();
        let mask = FieldMask::parse(request.mask.as_deref()).map_err(|e| Status::invalid_argument(e.to_string()))?;

        // Element failures never fail the stream: malformed identifiers and
        // per-element query errors are echoed with empty provenance fields.
        let mut valid = Vec::new();
        let mut malformed = Vec::new();
        for raw in request.swhid {
            match raw.parse::<Swhid>() {
                Ok(swhid) => valid.push(swhid),
                Err(err) => {
                    debug!("stream element rejected: {raw}: {err}");
                    malformed.push(raw);
                }
            }
        }

        let (tx, rx) = mpsc::channel(64);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            for raw in malformed {
                if tx.send(Ok(mask.apply(empty_result(raw)))).await.is_err() {
                    return;
                }
            }
            let mut results = engine.where_are_one(valid);
            while let Some((swhid, result)) = results.recv().await {
                let wire = match result {
                    Ok(result) => WhereIsOneResult::from(&result),
                    Err(err) => {
                        warn!("stream element {swhid} failed: {err}");
                        empty_result(swhid.to_string())
                    }
                };
                if tx.send(Ok(mask.apply(wire))).await.is_err() {
                    // consumer hung up; cancel the rest by dropping the engine stream
                    return;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Async service wrapper running the tonic server with graceful shutdown.
pub struct GrpcService {
    bind: SocketAddr,
    engine: Arc<ProvenanceQuery>,
    shutdown_trigger: Trigger,
    shutdown_listener: Listener,
}

impl GrpcService {
    pub fn new(bind: SocketAddr, engine: Arc<ProvenanceQuery>) -> Self {
        let (shutdown_trigger, shutdown_listener) = trigger();
        Self { bind, engine, shutdown_trigger, shutdown_listener }
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind
    }
}

impl AsyncService for GrpcService {
    fn ident(self: Arc<Self>) -> &'static str {
        GRPC_SERVICE
    }

    fn start(self: Arc<Self>) -> AsyncServiceFuture {
        let bind = self.bind;
        let engine = self.engine.clone();
        let shutdown = self.shutdown_listener.clone();
        Box::pin(async move {
            info!("grpc server listening on {}", bind);
            tonic::transport::Server::builder()
                .add_service(ProvenanceServiceServer::new(ProvenanceGrpcHandler::new(engine)))
                .serve_with_shutdown(bind, shutdown)
                .await
                .map_err(|e| AsyncServiceError::Service(GRPC_SERVICE, e.to_string()))?;
            info!("grpc server stopped");
            Ok(())
        })
    }

    fn signal_exit(self: Arc<Self>) {
        self.shutdown_trigger.trigger();
    }

    fn stop(self: Arc<Self>) -> AsyncServiceFuture {
        self.shutdown_trigger.trigger();
        Box::pin(async move { Ok(()) })
    }
}
