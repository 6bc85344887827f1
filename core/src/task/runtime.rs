use crate::signals::Shutdown;
use crate::task::service::AsyncService;
use crate::{info, trace, warn};
use futures_util::future::select_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Hosts the daemon's async services on a dedicated tokio runtime.
///
/// Services are started together; the first one to return (the gRPC server
/// closing, or a fatal service error) initiates exit of the rest. Ctrl-C
/// reaches the same path through the [`Shutdown`] impl.
pub struct AsyncRuntime {
    threads: usize,
    services: Mutex<Vec<Arc<dyn AsyncService>>>,
    exiting: AtomicBool,
}

impl Default for AsyncRuntime {
    fn default() -> Self {
        Self::new(std::cmp::max(num_cpus::get() / 2, 2))
    }
}

impl AsyncRuntime {
    pub fn new(threads: usize) -> Self {
        Self { threads, services: Mutex::new(Vec::new()), exiting: AtomicBool::new(false) }
    }

    pub fn register<T>(&self, service: Arc<T>)
    where
        T: AsyncService + 'static,
    {
        self.services.lock().unwrap().push(service);
    }

    /// Runs the registered services to completion, blocking the calling
    /// thread until every service has stopped.
    pub fn run(self: &Arc<Self>) {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.threads)
            .enable_all()
            .build()
            .expect("the service runtime is buildable")
            .block_on(self.run_services())
    }

    async fn run_services(self: &Arc<Self>) {
        let services: Vec<Arc<dyn AsyncService>> = self.services.lock().unwrap().clone();
        if services.is_empty() {
            return;
        }
        trace!("starting {} services", services.len());
        let handles: Vec<_> = services.iter().map(|service| tokio::spawn(service.clone().start())).collect();

        // whichever service finishes first takes the process down with it
        let (first, _index, remaining) = select_all(handles).await;
        match &first {
            Ok(Err(err)) => warn!("a service terminated abnormally: {err}"),
            Err(err) => warn!("a service task could not be joined: {err}"),
            Ok(Ok(())) => {}
        }
        self.signal_exit();
        for handle in remaining {
            match handle.await {
                Ok(Err(err)) => warn!("a service terminated abnormally during exit: {err}"),
                Err(err) => warn!("a service task could not be joined: {err}"),
                Ok(Ok(())) => {}
            }
        }

        for service in services {
            let ident = service.clone().ident();
            match service.stop().await {
                Ok(()) => info!("[{ident}] stopped"),
                Err(err) => warn!("[{ident}] did not stop cleanly: {err}"),
            }
        }
        trace!("all services stopped");
    }

    /// Asks every service to exit; idempotent, so the signal handler and the
    /// normal exit path can race freely.
    pub fn signal_exit(&self) {
        if self.exiting.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!("signaling exit to all services");
        for service in self.services.lock().unwrap().iter() {
            service.clone().signal_exit();
        }
    }
}

impl Shutdown for AsyncRuntime {
    fn shutdown(self: &Arc<Self>) {
        self.signal_exit();
    }
}
