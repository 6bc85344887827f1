use crate::service::GrpcService;
use provenance_core::task::service::AsyncService;
use provenance_database::prelude::LocalTableStore;
use provenance_graph::fixtures::GraphBuilder;
use provenance_graph::{DynGraph, MemoryGraph};
use provenance_grpc_core::protowire::provenance_service_client::ProvenanceServiceClient;
use provenance_grpc_core::protowire::{WhereAreOneRequest, WhereIsOneRequest};
use provenance_index::IndexBuilder;
use provenance_model::Swhid;
use provenance_query::{ProvenanceQuery, QueryConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;
use tonic::Code;

struct Fixture {
    content: Swhid,
    old_revision: Swhid,
    _tmp: tempfile::TempDir,
    engine: Arc<ProvenanceQuery>,
}

fn fixture() -> Fixture {
    let mut builder = GraphBuilder::new();
    let c = builder.content();
    let lib = builder.directory(&[(b"a.c", c)]);
    let root = builder.directory(&[(b"lib", lib)]);
    let r1 = builder.revision(root, Some(10), &[]);
    let r2 = builder.revision(root, Some(20), &[r1]);
    let snap = builder.snapshot(&[r2]);
    builder.origin("https://example.org/library.git", &[snap]);

    let tmp = tempfile::tempdir().unwrap();
    let graph: DynGraph = Arc::new(MemoryGraph::from_snapshot(builder.build()).unwrap());
    let store = Arc::new(LocalTableStore::new(tmp.path()));
    let index = IndexBuilder::new(graph.clone(), store.clone(), 2).unwrap();
    index.earliest_timestamps().unwrap();
    index.directory_max_leaf_timestamps().unwrap();
    index.directory_frontier().unwrap();
    index.relations().unwrap();

    let engine =
        ProvenanceQuery::new(graph.clone(), store.as_ref(), QueryConfig { lookup_threads: 2, ..Default::default() }).unwrap();
    let content = graph.swhid(c).unwrap();
    let old_revision = graph.swhid(r1).unwrap();
    Fixture { content, old_revision, _tmp: tmp, engine }
}

fn free_address() -> SocketAddr {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = socket.local_addr().unwrap();
    drop(socket);
    address
}

async fn connect(address: SocketAddr) -> ProvenanceServiceClient<Channel> {
    let url = format!("http://{address}");
    for _ in 0..50 {
        if let Ok(client) = ProvenanceServiceClient::connect(url.clone()).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("grpc server at {address} never became reachable");
}

#[tokio::test]
async fn test_server_client() {
    provenance_core::log::try_init_logger("info, provenance_grpc_server=trace");

    let fixture = fixture();
    let address = free_address();
    let service = Arc::new(GrpcService::new(address, fixture.engine.clone()));
    let server = tokio::spawn(service.clone().start());

    let mut client = connect(address).await;

    // Point query resolves the oldest anchor and its origin
    let response = client
        .where_is_one(WhereIsOneRequest { mask: None, swhid: fixture.content.to_string() })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.swhid, fixture.content.to_string());
    assert_eq!(response.anchor, Some(fixture.old_revision.to_string()));
    assert_eq!(response.origin.as_deref(), Some("https://example.org/library.git"));

    // Field mask suppresses the origin
    let response = client
        .where_is_one(WhereIsOneRequest { mask: Some("swhid,anchor".to_string()), swhid: fixture.content.to_string() })
        .await
        .unwrap()
        .into_inner();
    assert!(response.anchor.is_some());
    assert!(response.origin.is_none());

    // Malformed input is INVALID_ARGUMENT for the unary call
    let status = client
        .where_is_one(WhereIsOneRequest { mask: None, swhid: "not-a-swhid".to_string() })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    // The stream isolates malformed and unknown elements
    let unknown = "swh:1:cnt:ffffffffffffffffffffffffffffffffffffffff";
    let request = WhereAreOneRequest {
        mask: None,
        swhid: vec![fixture.content.to_string(), "not-a-swhid".to_string(), unknown.to_string()],
    };
    let mut stream = client.where_are_one(request).await.unwrap().into_inner();
    let mut results = Vec::new();
    while let Some(item) = stream.message().await.unwrap() {
        results.push(item);
    }
    assert_eq!(results.len(), 3);
    let resolved = results.iter().filter(|r| r.anchor.is_some()).count();
    assert_eq!(resolved, 1);

    service.signal_exit();
    let _ = server.await.unwrap();
}
