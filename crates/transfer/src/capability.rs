//! Streaming-capability negotiation for uploads.
//!
//! Not every transport can transmit a request body incrementally; some
//! must materialize the whole payload before the first byte goes out.
//! Before an upload starts, the pipeline hands an instrumented
//! [`ProbeRequest`] to the transport's [`TransportProbe`] and watches how
//! it is inspected: a transport that consults the duplex-transmission flag
//! without eagerly sniffing body content can stream; anything else gets
//! the buffered fallback.

use tracing::warn;

/// Strategy for constructing the upload request body, selected once per
/// upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Pipe the progress-observed stream straight into the request body
    /// with half-duplex semantics (write while awaiting the response).
    Streaming,
    /// Materialize the whole payload in memory before sending. Correct,
    /// but progress completes during buffering rather than transmission.
    Buffered,
}

/// Placeholder body content a sniffing transport would read.
const PROBE_BODY: &[u8] = b"\0";

/// A probe request: a streaming body stand-in plus a duplex-transmission
/// flag, instrumented to record how the transport inspected it.
#[derive(Debug, Default)]
pub struct ProbeRequest {
    duplex_accessed: bool,
    body_sniffed: bool,
}

impl ProbeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consults the duplex-transmission flag, as a transport preparing a
    /// streamed send would. Returns the half-duplex marker.
    pub fn duplex(&mut self) -> &'static str {
        self.duplex_accessed = true;
        "half"
    }

    /// Inspects body content while computing headers. Eager sniffing is
    /// incompatible with a body that only exists as a stream.
    pub fn sniff_body(&mut self) -> &'static [u8] {
        self.body_sniffed = true;
        PROBE_BODY
    }

    pub fn duplex_accessed(&self) -> bool {
        self.duplex_accessed
    }

    pub fn body_sniffed(&self) -> bool {
        self.body_sniffed
    }
}

/// How a transport inspects an outgoing request before sending it.
/// Injectable so tests can simulate transports with other behaviors.
pub trait TransportProbe: Send + Sync {
    fn inspect(&self, request: &mut ProbeRequest);
}

/// The native hyper-backed transport: consults the duplex flag and never
/// sniffs streaming body content.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProbe;

impl TransportProbe for NativeProbe {
    fn inspect(&self, request: &mut ProbeRequest) {
        let _ = request.duplex();
    }
}

/// Runs the capability probe and picks the upload strategy.
///
/// Streaming is selected only when the duplex flag was accessed and no
/// eager body sniffing occurred. The fallback is loud, not silent: it is
/// logged here and the buffered path still transmits correct bytes.
pub fn negotiate_strategy(probe: &dyn TransportProbe) -> UploadStrategy {
    let mut request = ProbeRequest::new();
    probe.inspect(&mut request);

    if request.duplex_accessed() && !request.body_sniffed() {
        UploadStrategy::Streaming
    } else {
        warn!("transport cannot stream request bodies; falling back to buffered upload");
        UploadStrategy::Buffered
    }
}
