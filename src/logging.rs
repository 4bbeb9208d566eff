use crate::bus::{absorb, BusClient, LogRecord};
use crate::error::{EdgewatchError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer, Registry};

/// Logging switches collected from the command line
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub verbose: bool,
    pub quiet: bool,
    /// json, pretty or compact
    pub format: Option<String>,
    /// Directory for a daily rolling log file
    pub file_dir: Option<PathBuf>,
}

impl LogOptions {
    fn filter(&self) -> &'static str {
        if self.debug {
            "edgewatch=debug"
        } else if self.quiet {
            "edgewatch=error"
        } else if self.verbose {
            "info"
        } else {
            "edgewatch=info"
        }
    }
}

/// Keeps the file writer flushing and hands out the bus log receiver
pub struct LoggingHandle {
    _file_guard: Option<WorkerGuard>,
    shipper: Option<LogShipper>,
}

impl LoggingHandle {
    /// Take the receiver that feeds log records to the bus
    pub fn take_shipper(&mut self) -> Option<LogShipper> {
        self.shipper.take()
    }
}

/// Install the global subscriber: console output, optional rolling file, and
/// the bus log layer.
pub fn init_logging(options: &LogOptions) -> Result<LoggingHandle> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.filter()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = match options.format.as_deref() {
        Some("json") => tfmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => tfmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => tfmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(options.debug)
            .with_file(options.debug)
            .with_line_number(options.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            tfmt::layer()
                .with_target(true)
                .with_thread_ids(options.debug)
                .with_file(options.debug)
                .with_line_number(options.debug)
                .boxed()
        }
    };
    layers.push(console);

    let file_guard = match &options.file_dir {
        Some(dir) => {
            let (layer, guard) = file_layer(dir);
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    let (bus_layer, shipper) = BusLogLayer::channel();
    layers.push(bus_layer.boxed());

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| EdgewatchError::system(format!("Failed to install logger: {}", e)))?;

    Ok(LoggingHandle {
        _file_guard: file_guard,
        shipper: Some(shipper),
    })
}

/// Daily rolling file output. Buffered lines reach the file when the guard
/// is dropped.
fn file_layer(dir: &Path) -> (Box<dyn Layer<Registry> + Send + Sync>, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(dir, "edgewatch.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tfmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    (layer, guard)
}

/// Forwards INFO-and-above events to the bus log lists.
///
/// Emitting never blocks: records go through an unbounded channel and are
/// written by the task started with [`LogShipper::spawn`]. Records are dropped
/// once the shipper is gone.
pub struct BusLogLayer {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl BusLogLayer {
    pub fn channel() -> (Self, LogShipper) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, LogShipper { receiver })
    }
}

impl<S: Subscriber> Layer<S> for BusLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::INFO || meta.target().starts_with(module_path!()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord::now(meta.target(), meta.level().to_string(), visitor.finish());
        let _ = self.sender.send(record);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Receiving end of the bus log channel
pub struct LogShipper {
    receiver: mpsc::UnboundedReceiver<LogRecord>,
}

impl LogShipper {
    /// Drain records into the bus until cancelled
    pub fn spawn(mut self, bus: BusClient, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    record = self.receiver.recv() => match record {
                        Some(record) => absorb("log record", bus.push_log(&record).await),
                        None => break,
                    },
                }
            }

            // Flush what was queued before shutdown
            while let Ok(record) = self.receiver.try_recv() {
                absorb("log record", bus.push_log(&record).await);
            }
        })
    }
}
