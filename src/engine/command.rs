use super::{
    BuyerEvent, CancelAndRefundRequest, CancelAndRefundResponse, Engine, EventSink,
    GetHistoryRequest, GetHistoryResponse, ListSellersRequest, ListSellersResponse, ResumeRequest,
    SwapRequest,
};
use crate::error::{Error, Result};
use crate::events::EventStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

/// A running engine call and the thread collecting its stderr.
struct Call {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

pub const ENGINE_BINARY: &str = "swap-engine";

/// Runs each engine call as `<binary> <method>`, request JSON on stdin.
///
/// `buy` and `resume` stream one [`BuyerEvent`] per stdout line until the
/// process exits; the other calls print a single response document.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    binary: PathBuf,
}

impl CommandEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn launch<T: Serialize>(&self, method: &str, request: &T) -> Result<Call> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.binary)
            .arg(method)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| Error::engine(method, format!("cannot run {}: {}", self.binary.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::engine(method, format!("failed to send request: {}", e)));
            }
        }
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut output = String::new();
                let _ = pipe.read_to_string(&mut output);
                output
            })
        });
        Ok(Call { child, stderr })
    }

    fn finish(method: &str, call: Call) -> Result<()> {
        let Call { mut child, stderr } = call;
        let status = child.wait()?;
        let stderr = stderr
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        let detail = stderr.lines().last().unwrap_or("no output").trim().to_string();
        Err(Error::engine(method, format!("{} ({})", status, detail)))
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(&self, method: &str, request: &Req) -> Result<Resp> {
        tracing::debug!("Engine call {}", method);
        let mut call = self.launch(method, request)?;
        let mut stdout = String::new();
        if let Some(mut pipe) = call.child.stdout.take() {
            pipe.read_to_string(&mut stdout)?;
        }
        Self::finish(method, call)?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| Error::engine(method, format!("malformed response: {}", e)))
    }

    fn stream<Req: Serialize>(&self, method: &str, request: &Req, sink: &EventSink) -> Result<()> {
        tracing::debug!("Engine call {} for swap {}", method, sink.swap_id());
        let mut call = self.launch(method, request)?;
        let stdout = call
            .child
            .stdout
            .take()
            .ok_or_else(|| Error::engine(method, "stdout not captured"))?;

        for event in EventStream::new(BufReader::new(stdout), BuyerEvent::from_json) {
            let delivered = sink.emit(event);
            if !delivered || !sink.is_running() {
                tracing::info!("Swap {} stopped, ending engine call {}", sink.swap_id(), method);
                let _ = call.child.kill();
                let _ = call.child.wait();
                return Ok(());
            }
        }
        Self::finish(method, call)
    }
}

impl Engine for CommandEngine {
    fn buy(&self, request: &SwapRequest, events: &EventSink) -> Result<()> {
        self.stream("buy", request, events)
    }

    fn resume(&self, request: &ResumeRequest, events: &EventSink) -> Result<()> {
        self.stream("resume", request, events)
    }

    fn cancel_and_refund(&self, request: &CancelAndRefundRequest) -> Result<CancelAndRefundResponse> {
        self.call("cancel_and_refund", request)
    }

    fn list_sellers(&self, request: &ListSellersRequest) -> Result<ListSellersResponse> {
        self.call("list_sellers", request)
    }

    fn get_history(&self, request: &GetHistoryRequest) -> Result<GetHistoryResponse> {
        self.call("get_history", request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(ENGINE_BINARY);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_history_call_reads_response() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(script(
            &dir,
            r#"cat > /dev/null; echo '{"swaps":[{"swapId":"a1","status":"REFUNDED"}]}'"#,
        ));
        let response = engine.get_history(&GetHistoryRequest { testnet: true }).unwrap();
        assert_eq!(response.swaps.len(), 1);
        assert_eq!(response.swaps[0].swap_id, "a1");
    }

    #[test]
    fn test_failed_call_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(script(&dir, "cat > /dev/null; echo boom >&2; exit 3"));
        let err = engine
            .get_history(&GetHistoryRequest { testnet: false })
            .unwrap_err();
        assert!(err.to_string().contains("boom"), "{}", err);
    }

    #[test]
    fn test_buy_streams_events() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(script(
            &dir,
            r#"cat > /dev/null
echo '{"event":"SwapRunning","multiaddr":"/ip4/1.2.3.4/tcp/9939"}'
echo 'plain log line'
echo '{"event":"BtcLocked","txid":"deadbeef"}'"#,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new("a1b2", tx, Arc::new(AtomicBool::new(true)));
        let request = super::super::EngineParams::from_settings(&Default::default())
            .resume("a1b2", "http://127.0.0.1:1/json_rpc", 0);

        engine.resume(&request, &sink).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), BuyerEvent::SwapRunning { .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            BuyerEvent::BtcLocked {
                txid: "deadbeef".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_binary_is_engine_error() {
        let engine = CommandEngine::new("/nonexistent/swap-engine");
        let err = engine
            .get_history(&GetHistoryRequest { testnet: false })
            .unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }
}
