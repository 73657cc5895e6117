// SPDX-License-Identifier: MIT

use crate::config::Config;
use crate::error::AppError;
use crate::handlers::register_routes;
use crate::http::handle_client;
use crate::router::Router;
use crate::upload::UploadHandler;
use log::{debug, error, info, trace, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Simple native thread pool implementation
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
    /// Pool with `size` workers; a size of zero is raised to one.
    pub fn new(size: usize) -> ThreadPool {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();

        ThreadPool {
            workers,
            sender: Some(sender),
        }
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(ref sender) = self.sender
            && sender.send(Box::new(f)).is_err()
        {
            warn!("Failed to send job to thread pool");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take()
                && thread.join().is_err()
            {
                warn!("Worker thread {} panicked", worker.id);
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Worker {
        let thread = thread::Builder::new()
            .name(format!("formdrop-worker-{id}"))
            .spawn(move || {
                loop {
                    let message = match receiver.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };
                    match message {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn worker {id}: {e}");
                None
            }
        };

        Worker { id, thread }
    }
}

/// Run the server until the process is terminated.
pub fn run_server_with_config(config: Config) -> Result<(), AppError> {
    run_server(config, None, None)
}

/// Bind, serve and block.
///
/// `shutdown_rx` stops the accept loop when a message arrives; `addr_tx`
/// receives the bound address once the listener is up, which lets tests bind
/// port 0.
pub fn run_server(
    config: Config,
    shutdown_rx: Option<mpsc::Receiver<()>>,
    addr_tx: Option<mpsc::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    debug!(
        "Starting server with configuration: verbose={}, detailed_logging={}",
        config.verbose, config.detailed_logging
    );

    let upload = Arc::new(UploadHandler::new(&config)?);
    trace!("Storage directory ready: {:?}", config.storage_dir);

    let bind_address = format!("{}:{}", config.listen, config.port);
    debug!("Binding server to address: {bind_address}");
    let listener = TcpListener::bind(&bind_address)?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    debug!("Server bound successfully to: {local_addr}");

    if let Some(tx) = addr_tx
        && tx.send(local_addr).is_err()
    {
        return Err(AppError::InternalServerError(
            "Failed to send server address to caller".to_string(),
        ));
    }

    let mut router = Router::new();
    register_routes(&mut router, upload, Arc::new(config.index_file.clone()));
    let router = Arc::new(router);

    info!(
        "Server listening on {} (storage: '{}', index: '{}')",
        local_addr,
        config.storage_dir.display(),
        config.index_file.display()
    );

    debug!("Creating thread pool with {} threads", config.threads);
    let pool = ThreadPool::new(config.threads);
    let max_body_size = config.max_body_size;

    loop {
        if let Some(ref rx) = shutdown_rx
            && rx.try_recv().is_ok()
        {
            info!("Shutdown signal received. Shutting down gracefully.");
            break;
        }

        match listener.accept() {
            Ok((stream, peer_addr)) => {
                trace!("Accepted connection from: {peer_addr}");
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("Failed to set stream to blocking mode: {e}");
                    continue;
                }

                let router = Arc::clone(&router);
                pool.execute(move || {
                    if let Err(e) = handle_connection(stream, peer_addr, &router, max_body_size) {
                        warn!("Client handling error: {e}");
                    }
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!("Error accepting connection: {e}");
            }
        }
    }

    info!("Server shut down gracefully.");
    Ok(())
}

/// Runs one connection, turning a handler panic into an error
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: &Router,
    max_body_size: u64,
) -> Result<(), AppError> {
    let start = Instant::now();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        handle_client(stream, router, max_body_size);
    }));

    let elapsed = start.elapsed();
    if elapsed > Duration::from_millis(1000) {
        warn!("Slow request from {}: {}ms", peer_addr, elapsed.as_millis());
    } else {
        trace!("Request from {} took {}ms", peer_addr, elapsed.as_millis());
    }

    result.map_err(|_| {
        error!("Client {peer_addr} handler panicked");
        AppError::InternalServerError("Client handler panicked".to_string())
    })
}
