//! Server run loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ServerError;
use crate::config::ServerConfig;
use crate::handler;

/// The bytewire HTTP server.
///
/// Owns the configuration and serves the transfer endpoints until
/// cancelled.
pub struct Server {
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the bound address.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the listen socket and serves requests until cancellation.
    ///
    /// Creates the storage directory if it does not exist yet.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        tokio::fs::create_dir_all(&self.config.storage_dir).await?;

        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        info!(
            %local_addr,
            storage = %self.config.storage_dir.display(),
            rate = self.config.throttle_bytes_per_sec,
            "bytewire server listening"
        );

        let router = handler::router(Arc::clone(&self.config));
        axum::serve(listener, router)
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned())
            .await?;

        info!("server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use bytewire_protocol::TransferReceipt;
    use bytewire_transfer::{ProbeRequest, TransferClient, TransportProbe};
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct TestServer {
        server: Arc<Server>,
        storage: tempfile::TempDir,
        base_url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    async fn spawn_server(throttle_bytes_per_sec: u64) -> TestServer {
        let storage = tempfile::tempdir().unwrap();
        let server = Server::new(ServerConfig {
            port: 0,
            storage_dir: storage.path().to_path_buf(),
            throttle_bytes_per_sec,
        });
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            server2.run().await.unwrap();
        });

        // Wait for the server to bind.
        let mut addr = None;
        for _ in 0..100 {
            if let Some(a) = server.local_addr().await {
                addr = Some(a);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let addr = addr.expect("server did not bind");

        TestServer {
            server,
            storage,
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            handle,
        }
    }

    impl TestServer {
        async fn stop(self) {
            self.server.shutdown();
            self.handle.await.unwrap();
        }

        fn stored_files(&self) -> Vec<PathBuf> {
            let mut files: Vec<PathBuf> = std::fs::read_dir(self.storage.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            files.sort();
            files
        }
    }

    fn write_payload(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn assert_round_trip(ts: &TestServer, data: &[u8]) {
        let src = tempfile::tempdir().unwrap();
        let path = write_payload(&src, "payload.bin", data);

        let client = TransferClient::new(&ts.base_url);
        let receipt = client.upload(&path, Box::new(|_| {})).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.size, Some(data.len() as u64));
        let stored_name = receipt.filename.unwrap();
        assert!(stored_name.ends_with("-payload.bin"), "{stored_name}");

        let downloaded = client.download(&stored_name, Box::new(|_| {})).await.unwrap();
        assert_eq!(downloaded, data);
    }

    #[tokio::test]
    async fn round_trip_empty_object() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        assert_round_trip(&ts, b"").await;
        ts.stop().await;
    }

    #[tokio::test]
    async fn round_trip_single_byte() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        assert_round_trip(&ts, b"x").await;
        ts.stop().await;
    }

    #[tokio::test]
    async fn round_trip_beyond_one_throttle_window() {
        // 6 000 bytes against a 4 096 B/s ceiling: both directions span
        // more than one throttle window.
        let data: Vec<u8> = (0..6000).map(|i| (i % 251) as u8).collect();
        let ts = spawn_server(4096).await;
        assert_round_trip(&ts, &data).await;
        ts.stop().await;
    }

    #[tokio::test]
    async fn upload_reports_ordered_progress_to_completion() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        let src = tempfile::tempdir().unwrap();
        let data = vec![0xA5u8; 100_000];
        let path = write_payload(&src, "tracked.bin", &data);

        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let client = TransferClient::new(&ts.base_url);
        let receipt = client
            .upload(&path, Box::new(move |p| sink.lock().unwrap().push(p)))
            .await
            .unwrap();
        assert!(receipt.success);

        let events = events.lock().unwrap();
        assert!(!events.is_empty());
        assert!(
            events.windows(2).all(|w| w[0].bytes_transferred <= w[1].bytes_transferred),
            "progress regressed"
        );
        let last = events.last().unwrap();
        assert_eq!(last.bytes_transferred, data.len() as u64);
        assert_eq!(last.percentage(), 100.0);
        drop(events);
        ts.stop().await;
    }

    #[tokio::test]
    async fn download_reports_progress_with_known_total() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        let src = tempfile::tempdir().unwrap();
        let data = vec![0x42u8; 50_000];
        let path = write_payload(&src, "sized.bin", &data);

        let client = TransferClient::new(&ts.base_url);
        let receipt = client.upload(&path, Box::new(|_| {})).await.unwrap();

        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let downloaded = client
            .download(
                &receipt.filename.unwrap(),
                Box::new(move |p| sink.lock().unwrap().push(p)),
            )
            .await
            .unwrap();
        assert_eq!(downloaded.len(), data.len());

        let events = events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.total_bytes, data.len() as u64);
        assert_eq!(last.percentage(), 100.0);
        drop(events);
        ts.stop().await;
    }

    /// Transport that never consults the duplex flag, forcing the
    /// buffered fallback.
    struct InertProbe;

    impl TransportProbe for InertProbe {
        fn inspect(&self, _request: &mut ProbeRequest) {}
    }

    #[tokio::test]
    async fn buffered_fallback_still_delivers_correct_bytes() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        let src = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..10_000).map(|i| (i % 256) as u8).collect();
        let path = write_payload(&src, "fallback.bin", &data);

        let client = TransferClient::with_probe(&ts.base_url, Box::new(InertProbe));
        let receipt = client.upload(&path, Box::new(|_| {})).await.unwrap();
        assert!(receipt.success);

        let downloaded = client
            .download(&receipt.filename.unwrap(), Box::new(|_| {}))
            .await
            .unwrap();
        assert_eq!(downloaded, data);
        ts.stop().await;
    }

    #[tokio::test]
    async fn traversal_file_name_is_stored_as_basename() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/upload", ts.base_url))
            .header("content-type", "application/octet-stream")
            .header("x-file-name", "..%2F..%2Fetc%2Fpasswd")
            .body("root:x:0:0")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let receipt: TransferReceipt = response.json().await.unwrap();
        let stored_name = receipt.filename.unwrap();
        assert!(stored_name.ends_with("-passwd"), "{stored_name}");
        assert!(!stored_name.contains('/') && !stored_name.contains('\\'));

        // The object landed inside the storage dir, nowhere else.
        let files = ts.stored_files();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"root:x:0:0");
        ts.stop().await;
    }

    #[tokio::test]
    async fn missing_file_name_header_uses_default() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/upload", ts.base_url))
            .header("content-type", "application/octet-stream")
            .body("anonymous")
            .send()
            .await
            .unwrap();
        let receipt: TransferReceipt = response.json().await.unwrap();
        assert!(receipt.filename.unwrap().ends_with("-uploaded-file"));
        ts.stop().await;
    }

    #[tokio::test]
    async fn download_of_absent_object_is_exact_404_contract() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;

        let response = reqwest::get(format!("{}/api/download/no-such-file", ts.base_url))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(
            response.text().await.unwrap(),
            r#"{"error":"File not found"}"#
        );
        ts.stop().await;
    }

    #[tokio::test]
    async fn download_traversal_cannot_escape_storage() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;

        // Encoded `../../etc/passwd` resolves to basename `passwd`,
        // which is absent from storage.
        let response = reqwest::get(format!(
            "{}/api/download/..%2F..%2Fetc%2Fpasswd",
            ts.base_url
        ))
        .await
        .unwrap();
        assert_eq!(response.status(), 404);
        ts.stop().await;
    }

    #[tokio::test]
    async fn download_sets_transfer_headers() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        let src = tempfile::tempdir().unwrap();
        let path = write_payload(&src, "headers.bin", b"0123456789");

        let client = TransferClient::new(&ts.base_url);
        let receipt = client.upload(&path, Box::new(|_| {})).await.unwrap();
        let stored_name = receipt.filename.unwrap();

        let response = reqwest::get(format!("{}/api/download/{stored_name}", ts.base_url))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let headers = response.headers();
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/octet-stream"
        );
        assert_eq!(headers.get("content-length").unwrap(), "10");
        assert_eq!(
            headers.get("content-disposition").unwrap(),
            &format!("attachment; filename=\"{stored_name}\"")
        );
        ts.stop().await;
    }

    #[tokio::test]
    async fn concurrent_same_name_uploads_do_not_clobber() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        let src_a = tempfile::tempdir().unwrap();
        let src_b = tempfile::tempdir().unwrap();
        let path_a = write_payload(&src_a, "same.bin", b"contents-of-a");
        let path_b = write_payload(&src_b, "same.bin", b"contents-of-b");

        let client_a = TransferClient::new(&ts.base_url);
        let client_b = TransferClient::new(&ts.base_url);
        let (receipt_a, receipt_b) = tokio::join!(
            client_a.upload(&path_a, Box::new(|_| {})),
            client_b.upload(&path_b, Box::new(|_| {})),
        );
        let name_a = receipt_a.unwrap().filename.unwrap();
        let name_b = receipt_b.unwrap().filename.unwrap();
        assert_ne!(name_a, name_b);

        let bytes_a = client_a.download(&name_a, Box::new(|_| {})).await.unwrap();
        let bytes_b = client_b.download(&name_b, Box::new(|_| {})).await.unwrap();
        assert_eq!(bytes_a, b"contents-of-a");
        assert_eq!(bytes_b, b"contents-of-b");
        ts.stop().await;
    }

    #[tokio::test]
    async fn aborted_upload_leaves_no_partial_file_and_server_recovers() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;

        // A body stream that fails after the first chunk simulates a
        // dropped inbound connection.
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial data")),
            Err(io::Error::other("client went away")),
        ];
        let result = reqwest::Client::new()
            .post(format!("{}/api/upload", ts.base_url))
            .header("content-type", "application/octet-stream")
            .header("x-file-name", "doomed.bin")
            .body(reqwest::Body::wrap_stream(futures_util::stream::iter(
                chunks,
            )))
            .send()
            .await;
        // Either a 500 receipt or a transport error is acceptable here;
        // what matters is the server's storage state afterwards.
        if let Ok(response) = result {
            assert!(!response.status().is_success());
        }

        // The partial file must be cleaned up.
        let mut cleaned = false;
        for _ in 0..100 {
            if ts.stored_files().is_empty() {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cleaned, "partial upload left in storage");

        // And the next operation is unaffected.
        assert_round_trip(&ts, b"healthy again").await;
        ts.stop().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_run_loop() {
        let ts = spawn_server(crate::DEFAULT_BYTES_PER_SEC).await;
        assert!(ts.server.port().await > 0);
        ts.stop().await;
    }
}
