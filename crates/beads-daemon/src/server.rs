//! Socket server: read pool, single writer thread, per-request deadlines.

use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::DaemonContext;
use crate::handlers::{handle_request, is_write_op};
use crate::protocol::{Request, Response, RpcErrorInfo, read_frame, write_frame};
use crate::Result;

/// Default per-request deadline when the client does not send one.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Bounded retry for retryable storage errors inside the writer.
const WRITE_RETRIES: u32 = 3;

/// A write waiting its turn on the single writer thread.
struct WriteJob {
    request: Request,
    reply: mpsc::Sender<Response>,
}

/// The daemon's accept loop plus its writer thread.
pub struct Server {
    ctx: Arc<DaemonContext>,
    shutdown: Arc<AtomicBool>,
    read_pool: Arc<Semaphore>,
}

impl Server {
    pub fn new(ctx: Arc<DaemonContext>, shutdown: Arc<AtomicBool>) -> Self {
        let pool_size = ctx.config.daemon.read_pool_size.max(1);
        Self {
            ctx,
            shutdown,
            read_pool: Arc::new(Semaphore::new(pool_size)),
        }
    }

    /// Runs the accept loop until the shutdown flag is set.
    ///
    /// Reads run on the connection threads, bounded by the read pool;
    /// writes funnel through one writer thread so transaction boundaries
    /// align with logical mutations and slow clients cannot interleave
    /// partial state.
    pub fn serve(&self, listener: UnixListener) -> Result<()> {
        listener.set_nonblocking(true)?;

        // The single write-serialization point.
        let (write_tx, write_rx) = mpsc::channel::<WriteJob>();
        let writer_ctx = self.ctx.clone();
        let writer = std::thread::spawn(move || {
            for job in write_rx {
                let response = execute_write(&writer_ctx, &job.request);
                let _ = job.reply.send(response);
            }
        });

        info!("daemon listening");
        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let ctx = self.ctx.clone();
                    let shutdown = self.shutdown.clone();
                    let write_tx = write_tx.clone();
                    let read_pool = self.read_pool.clone();
                    std::thread::spawn(move || {
                        if let Err(e) =
                            serve_connection(&ctx, stream, &shutdown, &write_tx, &read_pool)
                        {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        drop(write_tx);
        let _ = writer.join();
        info!("daemon stopped");
        Ok(())
    }
}

/// Handles one client connection: a sequence of length-prefixed requests,
/// one response per request, pipelining allowed.
fn serve_connection(
    ctx: &Arc<DaemonContext>,
    stream: UnixStream,
    shutdown: &Arc<AtomicBool>,
    write_tx: &mpsc::Sender<WriteJob>,
    read_pool: &Arc<Semaphore>,
) -> Result<()> {
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    while let Some(request) = read_frame::<_, Request>(&mut reader)? {
        let deadline = request
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEADLINE);

        let response = if request.op == "daemon.stop" {
            shutdown.store(true, Ordering::SeqCst);
            Response::success(serde_json::json!({"stopping": true}))
        } else if is_write_op(&request.op) {
            // Queue on the writer and wait, bounded by the deadline.
            let (reply_tx, reply_rx) = mpsc::channel();
            let queued = write_tx.send(WriteJob {
                request: request.clone(),
                reply: reply_tx,
            });
            match queued {
                Ok(()) => match reply_rx.recv_timeout(deadline) {
                    Ok(response) => response,
                    Err(_) => Response::failure(RpcErrorInfo::new(
                        "timeout",
                        format!("write did not complete within {}ms", deadline.as_millis()),
                    )),
                },
                Err(_) => Response::failure(RpcErrorInfo::new(
                    "unavailable",
                    "daemon is shutting down",
                )),
            }
        } else {
            let _permit = read_pool.acquire();
            handle_request(ctx, &request)
        };

        write_frame(&mut writer, &response)?;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(())
}

/// Executes one write with bounded backoff on retryable errors.
fn execute_write(ctx: &DaemonContext, request: &Request) -> Response {
    let mut delay = Duration::from_millis(50);
    for attempt in 0..=WRITE_RETRIES {
        let response = handle_request(ctx, request);
        let retryable = response
            .error
            .as_ref()
            .is_some_and(|e| e.kind == "locked");
        if !retryable || attempt == WRITE_RETRIES {
            return response;
        }
        debug!(op = %request.op, attempt, "retrying locked write");
        std::thread::sleep(delay);
        delay *= 2;
    }
    unreachable!("loop always returns");
}

/// A counting semaphore bounding concurrent read execution.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn acquire(self: &Arc<Self>) -> SemaphorePermit {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
        SemaphorePermit {
            semaphore: self.clone(),
        }
    }
}

pub(crate) struct SemaphorePermit {
    semaphore: Arc<Semaphore>,
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        let mut permits = self.semaphore.permits.lock().unwrap();
        *permits += 1;
        self.semaphore.available.notify_one();
    }
}
