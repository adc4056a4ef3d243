//! Tracing setup with PII redaction on the output side.
//!
//! Two stages mask PII:
//!
//! - [`redacting_fields`] formats structured fields, writing the mask for
//!   any field the redactor lists (`info!(email = %email, ...)`).
//! - [`RedactingWriter`] buffers each formatted record and masks
//!   `key=value;` pairs inside message text before it reaches the writer.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::field::MakeExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{self, FormatFields};
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::redact::PiiRedactor;

/// `MakeWriter` wrapper that redacts each record produced by `inner`.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    redactor: Arc<PiiRedactor>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, redactor: impl Into<Arc<PiiRedactor>>) -> Self {
        Self {
            inner,
            redactor: redactor.into(),
        }
    }
}

/// Field formatter that writes the mask in place of listed field values.
///
/// Output matches the default formatter: the message first, then
/// space-separated `name=value` pairs.
pub fn redacting_fields(
    redactor: Arc<PiiRedactor>,
) -> impl for<'writer> FormatFields<'writer> + Send + Sync + 'static {
    format::debug_fn(move |writer, field, value| {
        if field.name() == "message" {
            write!(writer, "{:?}", value)
        } else if redactor.masks_field(field.name()) {
            write!(writer, "{}={}", field, redactor.mask())
        } else {
            write!(writer, "{}={:?}", field, value)
        }
    })
    .delimited(" ")
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), self.redactor.clone())
    }
}

/// Buffers one record and writes it redacted on flush or drop.
pub struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<PiiRedactor>,
    buf: Vec<u8>,
}

impl<W: Write> RedactingWriter<W> {
    fn new(inner: W, redactor: Arc<PiiRedactor>) -> Self {
        Self {
            inner,
            redactor,
            buf: Vec::new(),
        }
    }

    fn write_redacted(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let redacted = self.redactor.redact(&String::from_utf8_lossy(&self.buf));
        self.buf.clear();
        self.inner.write_all(redacted.as_bytes())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_redacted()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.write_redacted();
        let _ = self.inner.flush();
    }
}

/// Install the global subscriber: `EnvFilter` plus redacted stderr output.
///
/// `RUST_LOG` directives are honored on top of `session_auth=info`.
pub fn init_tracing() -> Result<()> {
    let redactor = Arc::new(PiiRedactor::pii()?);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("session_auth=info".parse()?)
                .add_directive("user_data=info".parse()?),
        )
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        // escape codes would split `field=` from its boundary
        .with_ansi(false)
        .fmt_fields(redacting_fields(redactor.clone()))
        .with_writer(RedactingMakeWriter::new(io::stderr, redactor))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(())
}
