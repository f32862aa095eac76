//! Application lifecycle management and graceful shutdown.
//!
//! Every helpdesk binary is an `Application`: a set of event consumers and,
//! for the ticket service, an HTTP server.
//!
//! # Graceful Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. HTTP server stops accepting new connections
//! 2. Shutdown signal broadcast to all consumers
//! 3. Each consumer finishes its current delivery (bounded by the shutdown
//!    timeout)
//! 4. Clean exit
//!
//! # Example
//!
//! ```rust,ignore
//! let mut app = Application::new(Duration::from_secs(10));
//! let consumer = EventConsumer::builder()
//!     .shutdown(app.subscribe_shutdown())
//!     // ...
//!     .build()?;
//!
//! app.with_consumer(consumer).with_http(listener, router).run().await?;
//! ```

use crate::runtime::EventConsumer;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Running application with all background tasks.
pub struct Application {
    /// HTTP listener and router, if this service serves HTTP
    http: Option<(TcpListener, axum::Router)>,

    /// Event consumers
    consumers: Vec<EventConsumer>,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,

    /// How long each background task gets to stop
    shutdown_timeout: Duration,
}

impl Application {
    /// Create an application with no HTTP server and no consumers.
    #[must_use]
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            http: None,
            consumers: Vec::new(),
            shutdown_tx,
            shutdown_timeout,
        }
    }

    /// Receiver to hand to a consumer built for this application.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Serve `router` on `listener` until shutdown.
    #[must_use]
    pub fn with_http(mut self, listener: TcpListener, router: axum::Router) -> Self {
        self.http = Some((listener, router));
        self
    }

    /// Add a consumer.
    #[must_use]
    pub fn with_consumer(mut self, consumer: EventConsumer) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` resolves, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails. Consumers are still told to
    /// stop in that case.
    pub async fn run_until(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!(consumer_count = self.consumers.len(), "Starting event consumers");
        let consumer_handles: Vec<_> = self
            .consumers
            .into_iter()
            .map(|consumer| {
                let name = consumer.name().to_string();
                (name, consumer.spawn())
            })
            .collect();

        let served = match self.http {
            Some((listener, router)) => {
                info!(address = ?listener.local_addr().ok(), "HTTP server listening for requests");
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(signal)
                    .await;
                info!("HTTP server stopped, initiating graceful shutdown...");
                result
            },
            None => {
                signal.await;
                info!("Initiating graceful shutdown...");
                Ok(())
            },
        };

        // Send shutdown signal to all background tasks
        let _ = self.shutdown_tx.send(());
        Self::await_shutdown(consumer_handles, self.shutdown_timeout).await;

        served?;
        info!("Graceful shutdown complete");
        Ok(())
    }

    async fn await_shutdown(
        consumer_handles: Vec<(String, tokio::task::JoinHandle<()>)>,
        timeout: Duration,
    ) {
        for (name, handle) in consumer_handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(consumer = %name, "Consumer stopped gracefully"),
                Ok(Err(e)) => warn!(consumer = %name, error = %e, "Consumer task failed"),
                Err(_) => warn!(consumer = %name, "Consumer shutdown timed out"),
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// A signal handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
