use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait Shutdown {
    fn shutdown(self: &Arc<Self>);
}

pub struct Signals<T: Shutdown + Send + Sync + 'static> {
    target: Arc<T>,
    iterations: AtomicU64,
}

impl<T: Shutdown + Send + Sync + 'static> Signals<T> {
    pub fn new(target: Arc<T>) -> Signals<T> {
        Signals { target, iterations: AtomicU64::new(0) }
    }

    pub fn init(self: &Arc<Signals<T>>) {
        let signals = self.clone();
        ctrlc::set_handler(move || {
            let v = signals.iterations.load(Ordering::SeqCst);
            if v > 1 {
                println!("^SIGNAL - halting");
                std::process::exit(1);
            }
            signals.iterations.store(v + 1, Ordering::SeqCst);

            println!("^SIGNAL - shutting down... (CTRL+C again to halt)");
            signals.target.shutdown();
        })
        .expect("Error setting signal handler");
    }
}
