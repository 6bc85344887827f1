use crate::args::{Args, Subcommand};
use crate::monitor::QueryMonitor;
use provenance_core::signals::Signals;
use provenance_core::task::runtime::AsyncRuntime;
use provenance_core::task::tick::TickService;
use provenance_core::{error, info};
use provenance_database::prelude::{LocalTableStore, StoreError};
use provenance_graph::fixtures::demo_snapshot;
use provenance_graph::{DynGraph, GraphError, MemoryGraph};
use provenance_grpc_server::service::GrpcService;
use provenance_index::{IndexBuilder, IndexError};
use provenance_query::{ProvenanceQuery, QueryConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub const EXIT_OK: i32 = 0;
pub const EXIT_ARGS: i32 = 1;
pub const EXIT_STORAGE: i32 = 2;
pub const EXIT_INCOMPLETE: i32 = 3;
pub const EXIT_INTERNAL: i32 = 64;

const GRAPH_SNAPSHOT_FILE: &str = "graph.bin";

pub fn run(args: Args) -> i32 {
    match &args.command {
        Subcommand::IndexEarliestTimestamps
        | Subcommand::IndexDirectoryMaxLeafTimestamps
        | Subcommand::IndexDirectoryFrontier
        | Subcommand::IndexRelations => run_index_stage(&args),
        Subcommand::GrpcServe { bind } => run_grpc_serve(&args, *bind),
        Subcommand::GenTestDatabase { out } => run_gen_test_database(&args, out.clone()),
    }
}

fn open_graph(args: &Args) -> Result<DynGraph, i32> {
    let Some(path) = &args.graph else {
        error!("--graph (or SWH_PROVENANCE_GRAPH_PATH) is required");
        return Err(EXIT_ARGS);
    };
    match MemoryGraph::open(path) {
        Ok(graph) => Ok(Arc::new(graph)),
        Err(err) => {
            error!("cannot open graph snapshot {}: {err}", path.display());
            Err(graph_error_code(&err))
        }
    }
}

fn open_store(args: &Args) -> Result<Arc<LocalTableStore>, i32> {
    let Some(url) = &args.database else {
        error!("--database (or SWH_PROVENANCE_DB_URL) is required");
        return Err(EXIT_ARGS);
    };
    match LocalTableStore::from_url(url) {
        Ok(store) => Ok(Arc::new(store)),
        Err(err) => {
            error!("cannot open table store {url}: {err}");
            Err(EXIT_ARGS)
        }
    }
}

fn graph_error_code(err: &GraphError) -> i32 {
    match err {
        GraphError::Io { .. } => EXIT_STORAGE,
        GraphError::Decode { .. } | GraphError::InvalidNode(_) => EXIT_INCOMPLETE,
    }
}

fn index_error_code(err: &IndexError) -> i32 {
    match err {
        IndexError::Store(StoreError::Corruption { .. }) => EXIT_INTERNAL,
        IndexError::Store(_) | IndexError::Io { .. } => EXIT_STORAGE,
        IndexError::Graph(err) => graph_error_code(err),
        IndexError::IncompleteInput(_) => EXIT_INCOMPLETE,
        IndexError::InvariantViolation(_) => EXIT_INTERNAL,
    }
}

fn run_index_stage(args: &Args) -> i32 {
    let graph = match open_graph(args) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let store = match open_store(args) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let builder = match IndexBuilder::new(graph, store, args.workers) {
        Ok(builder) => builder,
        Err(err) => {
            error!("cannot initialize the index builder: {err}");
            return index_error_code(&err);
        }
    };
    let result = match &args.command {
        Subcommand::IndexEarliestTimestamps => builder.earliest_timestamps(),
        Subcommand::IndexDirectoryMaxLeafTimestamps => builder.directory_max_leaf_timestamps(),
        Subcommand::IndexDirectoryFrontier => builder.directory_frontier(),
        Subcommand::IndexRelations => builder.relations(),
        _ => unreachable!("not an index stage"),
    };
    match result {
        Ok(()) => {
            info!("stage finished");
            EXIT_OK
        }
        Err(err) => {
            error!("stage failed: {err}");
            index_error_code(&err)
        }
    }
}

fn run_grpc_serve(args: &Args, bind: SocketAddr) -> i32 {
    let graph = match open_graph(args) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let store = match open_store(args) {
        Ok(store) => store,
        Err(code) => return code,
    };
    let config = QueryConfig { lookup_threads: args.workers, ..Default::default() };
    let engine = match ProvenanceQuery::new(graph, store.as_ref(), config) {
        Ok(engine) => engine,
        Err(err) => {
            error!("cannot open the table set: {err}");
            return match err {
                StoreError::TableNotFound(_) | StoreError::TableIncomplete(_) => EXIT_INCOMPLETE,
                StoreError::Corruption { .. } | StoreError::Sidecar { .. } => EXIT_INTERNAL,
                _ => EXIT_STORAGE,
            };
        }
    };

    let runtime = Arc::new(AsyncRuntime::default());
    let signals = Arc::new(Signals::new(runtime.clone()));
    signals.init();

    let tick_service = Arc::new(TickService::new());
    runtime.register(tick_service.clone());
    runtime.register(Arc::new(QueryMonitor::new(tick_service, engine.counters())));
    runtime.register(Arc::new(GrpcService::new(bind, engine)));

    runtime.run();
    info!("provenanced is finished");
    EXIT_OK
}

fn run_gen_test_database(args: &Args, out: PathBuf) -> i32 {
    if let Err(err) = std::fs::create_dir_all(&out) {
        error!("cannot create {}: {err}", out.display());
        return EXIT_STORAGE;
    }
    let snapshot = demo_snapshot();
    let graph_path = out.join(GRAPH_SNAPSHOT_FILE);
    if let Err(err) = snapshot.save(&graph_path) {
        error!("cannot write {}: {err}", graph_path.display());
        return EXIT_STORAGE;
    }
    let graph: DynGraph = match MemoryGraph::from_snapshot(snapshot) {
        Ok(graph) => Arc::new(graph),
        Err(err) => {
            error!("generated snapshot is invalid: {err}");
            return EXIT_INTERNAL;
        }
    };
    let store = Arc::new(LocalTableStore::new(&out));
    let builder = match IndexBuilder::new(graph, store, args.workers) {
        Ok(builder) => builder,
        Err(err) => {
            error!("cannot initialize the index builder: {err}");
            return index_error_code(&err);
        }
    };
    let stages = [
        IndexBuilder::earliest_timestamps as fn(&IndexBuilder) -> Result<(), IndexError>,
        IndexBuilder::directory_max_leaf_timestamps,
        IndexBuilder::directory_frontier,
        IndexBuilder::relations,
    ];
    for stage in stages {
        if let Err(err) = stage(&builder) {
            error!("fixture build failed: {err}");
            return index_error_code(&err);
        }
    }
    info!("test database written to {} (graph snapshot: {})", out.display(), graph_path.display());
    EXIT_OK
}
